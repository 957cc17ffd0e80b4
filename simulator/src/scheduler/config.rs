//! Scheduler configuration and agent population factories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::SimulationError;
use crate::core::time::Tick;
use crate::models::agent::Behavior;
use crate::models::world::WorldValue;

/// Default bound on zero-delay cascade rounds within one tick
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 16;

fn default_max_cascade_depth() -> usize {
    DEFAULT_MAX_CASCADE_DEPTH
}

/// Scheduler configuration
///
/// Deserializes from JSON with every field except `max_ticks` and `seed`
/// optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of ticks to run before halting with `MaxTicks`
    pub max_ticks: Tick,

    /// Master seed; each agent's stream is derived from it and the agent id
    pub seed: u64,

    /// Zero-delay rounds allowed per tick before `CascadeOverflow`
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: usize,

    /// Step agents of a round on the rayon pool (needs the `parallel` feature)
    #[serde(default)]
    pub parallel_steps: bool,

    /// World contents before the first tick
    #[serde(default)]
    pub initial_world: BTreeMap<String, WorldValue>,

    /// World keys sampled into `Outputs` after every completed tick
    #[serde(default)]
    pub observed_keys: Vec<String>,
}

impl SimulationConfig {
    pub fn new(max_ticks: Tick, seed: u64) -> Self {
        Self {
            max_ticks,
            seed,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            parallel_steps: false,
            initial_world: BTreeMap::new(),
            observed_keys: Vec::new(),
        }
    }

    pub fn with_world(mut self, key: impl Into<String>, value: impl Into<WorldValue>) -> Self {
        self.initial_world.insert(key.into(), value.into());
        self
    }

    pub fn observing(mut self, key: impl Into<String>) -> Self {
        self.observed_keys.push(key.into());
        self
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        let config: SimulationConfig = serde_json::from_str(json)
            .map_err(|e| SimulationError::InvalidConfig(format!("Malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.max_ticks == 0 {
            return Err(SimulationError::InvalidConfig(
                "max_ticks must be > 0".to_string(),
            ));
        }

        if self.max_cascade_depth == 0 {
            return Err(SimulationError::InvalidConfig(
                "max_cascade_depth must be > 0".to_string(),
            ));
        }

        if self.parallel_steps && !cfg!(feature = "parallel") {
            return Err(SimulationError::InvalidConfig(
                "parallel_steps requires the `parallel` feature".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for key in &self.observed_keys {
            if key.is_empty() {
                return Err(SimulationError::InvalidConfig(
                    "observed key must not be empty".to_string(),
                ));
            }
            if !seen.insert(key) {
                return Err(SimulationError::InvalidConfig(format!(
                    "Duplicate observed key: {}",
                    key
                )));
            }
        }

        Ok(())
    }
}

/// Builds the initial agent population
///
/// Behaviors are registered in the order returned, so the first gets id 1.
/// Any `FnMut(u64) -> Vec<Box<dyn Behavior>>` closure is a factory; it
/// receives the configured seed.
pub trait AgentFactory {
    fn create_agents(&mut self, seed: u64) -> Vec<Box<dyn Behavior>>;
}

impl<F> AgentFactory for F
where
    F: FnMut(u64) -> Vec<Box<dyn Behavior>>,
{
    fn create_agents(&mut self, seed: u64) -> Vec<Box<dyn Behavior>> {
        self(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config = SimulationConfig::from_json(r#"{"max_ticks": 10, "seed": 7}"#).unwrap();

        assert_eq!(config.max_cascade_depth, DEFAULT_MAX_CASCADE_DEPTH);
        assert!(!config.parallel_steps);
        assert!(config.initial_world.is_empty());
    }

    #[test]
    fn test_zero_ticks_rejected() {
        let err = SimulationConfig::new(0, 1).validate().unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_observed_key_rejected() {
        let config = SimulationConfig::new(5, 1).observing("price").observing("price");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_invalid_config() {
        let err = SimulationConfig::from_json("{\"seed\": 1}").unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
    }
}
