//! Crate-wide error type.
//!
//! Recoverable errors abort the current tick only; the scheduler returns to
//! `Idle` at the next tick boundary. `CascadeOverflow` is fatal and leaves
//! the scheduler `Halted`.

use thiserror::Error;

use crate::core::time::Tick;
use crate::models::agent::{AgentError, AgentId};
use crate::scheduler::HaltReason;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error(
        "Stale write to '{key}' in effect buffer of {agent}: delta authored by {author} for tick {stamped_tick}, committing tick {tick}"
    )]
    StaleWrite {
        agent: AgentId,
        author: AgentId,
        key: String,
        stamped_tick: Tick,
        tick: Tick,
    },

    #[error("Zero-delay message cascade exceeded {bound} rounds at tick {tick}")]
    CascadeOverflow { tick: Tick, bound: usize },

    #[error("Agent {agent} failed at tick {tick}: {source}")]
    AgentFailed {
        agent: AgentId,
        tick: Tick,
        source: AgentError,
    },

    #[error("Scheduler is halted ({0})")]
    Halted(HaltReason),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("State validation error: {0}")]
    StateValidation(String),
}

impl SimulationError {
    /// Fatal errors halt the scheduler instead of aborting a single tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimulationError::CascadeOverflow { .. })
    }

    /// Short machine-readable name, used in event records.
    pub fn kind(&self) -> &'static str {
        match self {
            SimulationError::InvalidConfig(_) => "InvalidConfig",
            SimulationError::UnknownAgent(_) => "UnknownAgent",
            SimulationError::StaleWrite { .. } => "StaleWrite",
            SimulationError::CascadeOverflow { .. } => "CascadeOverflow",
            SimulationError::AgentFailed { .. } => "AgentFailed",
            SimulationError::Halted(_) => "Halted",
            SimulationError::Serialization(_) => "Serialization",
            SimulationError::StateValidation(_) => "StateValidation",
        }
    }
}
