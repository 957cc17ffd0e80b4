//! Core kernel primitives: simulated time and the crate-wide error type.

pub mod error;
pub mod time;

pub use error::SimulationError;
pub use time::{Tick, TimeManager};
