//! Economic Simulation Core - Rust Engine
//!
//! Deterministic discrete-event kernel for agent-based economic models.
//!
//! # Architecture
//!
//! - **core**: Time management and the crate error type
//! - **models**: Domain types (agents, messages, world state, events)
//! - **registry**: Live agents keyed by id
//! - **bus**: Message queue with delayed and broadcast delivery
//! - **scheduler**: Tick loop, configuration and checkpoints
//! - **economics**: Walrasian market behaviors built on the scheduler
//! - **scenario**: JSON-described configurations and populations
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Same seed and agents produce the same message trace
//! 2. No message is delivered before its scheduled tick
//! 3. World state changes only when a tick commits
//! 4. FFI boundary is minimal and safe

// Module declarations
pub mod bus;
pub mod core;
pub mod economics;
pub mod models;
pub mod registry;
pub mod rng;
pub mod scenario;
pub mod scheduler;

// Re-exports for convenience
pub use bus::MessageBus;
pub use core::error::SimulationError;
pub use core::time::{Tick, TimeManager};
pub use models::{
    agent::{Agent, AgentError, AgentId, Behavior},
    event::{Event, EventLog},
    message::{DemandSchedule, Envelope, Message, Payload, Quote, Recipient, Transfer},
    output::Outputs,
    world::{Change, WorldDelta, WorldState, WorldValue},
};
pub use registry::AgentRegistry;
pub use rng::RngManager;
pub use scenario::{AgentSpec, Scenario};
pub use scheduler::{
    AgentFactory, Effects, HaltReason, RunSummary, Scheduler, SchedulerState, SimulationConfig,
    StateSnapshot, StepContext, TickReport,
};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

/// Validate a scenario JSON string.
///
/// Returns a JSON string:
/// - On success: `{"valid": true, "agents": <count>, "config_hash": "..."}`
/// - On failure: `{"valid": false, "error": {"type": "...", "message": "..."}}`
#[cfg(feature = "pyo3")]
#[pyfunction]
#[pyo3(name = "validate_scenario")]
fn py_validate_scenario(scenario_json: &str) -> PyResult<String> {
    use serde_json::json;

    let result = match Scenario::from_json(scenario_json)
        .and_then(|s| scheduler::compute_config_hash(&s.config).map(|hash| (s.agents.len(), hash)))
    {
        Ok((agents, hash)) => json!({
            "valid": true,
            "agents": agents,
            "config_hash": hash,
        }),
        Err(e) => json!({
            "valid": false,
            "error": { "type": e.kind(), "message": e.to_string() },
        }),
    };
    Ok(result.to_string())
}

/// Python module definition
#[cfg(feature = "pyo3")]
#[pymodule]
fn econ_simulator_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::simulation::PySimulation>()?;
    m.add_function(wrap_pyfunction!(py_validate_scenario, m)?)?;
    Ok(())
}
