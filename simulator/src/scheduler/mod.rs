//! Discrete-event scheduler
//!
//! Drives the tick loop over the registry, bus and world, plus the
//! configuration and checkpoint types that go with it.

pub mod checkpoint;
pub mod config;
pub mod effects;
pub mod engine;

pub use checkpoint::{compute_config_hash, validate_snapshot, AgentSnapshot, StateSnapshot};
pub use config::{AgentFactory, SimulationConfig, DEFAULT_MAX_CASCADE_DEPTH};
pub use effects::{Effects, StepContext, DEFAULT_DELAY};
pub use engine::{HaltReason, RunSummary, Scheduler, SchedulerState, TickReport};
