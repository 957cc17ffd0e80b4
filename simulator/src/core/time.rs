//! Time management for the simulation
//!
//! The simulation operates in discrete ticks. The scheduler owns the only
//! `TimeManager`; every other component receives the current tick by value.

use serde::{Deserialize, Serialize};

/// Discrete unit of simulated time.
pub type Tick = u64;

/// Tracks the current tick and the configured tick horizon
///
/// # Example
/// ```
/// use econ_simulator_core_rs::TimeManager;
///
/// let mut time = TimeManager::new(3);
/// assert_eq!(time.current_tick(), 0);
///
/// time.advance_tick();
/// assert_eq!(time.current_tick(), 1);
/// assert_eq!(time.remaining(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeManager {
    /// Ticks elapsed since simulation start (the next tick to execute)
    current_tick: Tick,
    /// Number of ticks the simulation may execute
    max_ticks: Tick,
}

impl TimeManager {
    /// Create a new TimeManager starting at tick 0
    ///
    /// # Panics
    /// Panics if `max_ticks` is zero.
    pub fn new(max_ticks: Tick) -> Self {
        assert!(max_ticks > 0, "max_ticks must be positive");
        Self {
            current_tick: 0,
            max_ticks,
        }
    }

    /// Resume at `current_tick` (used when restoring checkpoints)
    pub fn resume_at(max_ticks: Tick, current_tick: Tick) -> Self {
        let mut time = Self::new(max_ticks);
        time.current_tick = current_tick;
        time
    }

    /// Advance time by one tick
    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
    }

    /// The tick that will execute next
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Configured tick horizon
    pub fn max_ticks(&self) -> Tick {
        self.max_ticks
    }

    /// Ticks left before the horizon is reached
    ///
    /// # Example
    /// ```
    /// use econ_simulator_core_rs::TimeManager;
    ///
    /// let mut time = TimeManager::new(2);
    /// time.advance_tick();
    /// time.advance_tick();
    /// assert_eq!(time.remaining(), 0);
    /// assert!(time.is_exhausted());
    /// ```
    pub fn remaining(&self) -> Tick {
        self.max_ticks.saturating_sub(self.current_tick)
    }

    /// True once every configured tick has executed
    pub fn is_exhausted(&self) -> bool {
        self.current_tick >= self.max_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "max_ticks must be positive")]
    fn test_zero_max_ticks_panics() {
        TimeManager::new(0);
    }

    #[test]
    fn test_resume_keeps_horizon() {
        let time = TimeManager::resume_at(10, 7);
        assert_eq!(time.current_tick(), 7);
        assert_eq!(time.remaining(), 3);
        assert!(!time.is_exhausted());
    }
}
