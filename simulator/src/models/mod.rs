//! Domain models for the simulation kernel

pub mod agent;
pub mod event;
pub mod message;
pub mod output;
pub mod world;

// Re-exports
pub use agent::{Agent, AgentError, AgentId, Behavior};
pub use event::{Event, EventLog};
pub use message::{DemandSchedule, Envelope, Message, Payload, Quote, Recipient, Transfer};
pub use output::Outputs;
pub use world::{Change, WorldDelta, WorldState, WorldValue};
