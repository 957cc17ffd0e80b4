//! Agent model
//!
//! An agent pairs a stable identity with a polymorphic [`Behavior`] (its step
//! handler and private state), an inbox of delivered messages, and its own
//! deterministic RNG stream. Agents are owned exclusively by the
//! [`AgentRegistry`](crate::registry::AgentRegistry).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::time::Tick;
use crate::models::message::Message;
use crate::models::world::WorldState;
use crate::rng::RngManager;
use crate::scheduler::effects::{Effects, StepContext};

/// Unique, stable agent identifier
///
/// Registry ids start at 1 and are never reused. Id 0 is reserved for the
/// host driving the simulation (messages injected through
/// `Scheduler::post`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(u64);

impl AgentId {
    /// Sender id for messages injected from outside the simulation
    pub const HOST: AgentId = AgentId(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_host(self) -> bool {
        self == Self::HOST
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host() {
            write!(f, "host")
        } else {
            write!(f, "agent#{}", self.0)
        }
    }
}

/// Errors raised by behaviors; any of them fails the current tick
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    #[error("{0}")]
    Failed(String),

    #[error("world key '{0}' is missing")]
    MissingWorldKey(String),

    #[error("unexpected payload '{kind}' from {sender}")]
    UnexpectedPayload { kind: &'static str, sender: AgentId },

    #[error("cannot restore state: {0}")]
    InvalidState(String),
}

/// Step handler and private state of an agent
///
/// `step` is invoked once per tick in ascending id order, and again in any
/// cascade round in which the agent receives zero-delay messages.
pub trait Behavior: Send {
    /// Human-readable name, recorded in the event log
    fn name(&self) -> &str;

    /// Called once when the registry assigns this behavior its id
    fn on_register(&mut self, _id: AgentId) {}

    /// Consume the inbox, read the world, and record effects
    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), AgentError>;

    /// Called when the agent is removed from the registry
    fn on_remove(&mut self) {}

    /// Export private state for checkpoints
    fn save_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Reload private state exported by [`Behavior::save_state`]
    fn load_state(&mut self, _state: serde_json::Value) -> Result<(), AgentError> {
        Ok(())
    }
}

/// A registered agent
pub struct Agent {
    id: AgentId,
    name: String,
    behavior: Box<dyn Behavior>,
    inbox: Vec<Message>,
    rng: RngManager,
    steps: u64,
}

impl Agent {
    pub(crate) fn new(id: AgentId, mut behavior: Box<dyn Behavior>, rng: RngManager) -> Self {
        behavior.on_register(id);
        let name = behavior.name().to_string();
        Self {
            id,
            name,
            behavior,
            inbox: Vec::new(),
            rng,
            steps: 0,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages delivered but not yet consumed by a step
    pub fn inbox(&self) -> &[Message] {
        &self.inbox
    }

    /// Number of completed step invocations (cascade rounds included)
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn rng_state(&self) -> u64 {
        self.rng.get_state()
    }

    pub fn behavior(&self) -> &dyn Behavior {
        self.behavior.as_ref()
    }

    pub(crate) fn deliver(&mut self, message: Message) {
        self.inbox.push(message);
    }

    pub(crate) fn clear_inbox(&mut self) {
        self.inbox.clear();
    }

    /// Run one step: hand the inbox to the behavior and collect its effects
    pub(crate) fn run_step(
        &mut self,
        tick: Tick,
        round: usize,
        world: &WorldState,
    ) -> Result<Effects, AgentError> {
        let inbox = std::mem::take(&mut self.inbox);
        let mut effects = Effects::new(self.id, tick);
        {
            let mut ctx = StepContext::new(
                self.id,
                tick,
                round,
                &inbox,
                world,
                &mut self.rng,
                &mut effects,
            );
            self.behavior.step(&mut ctx)?;
        }
        self.steps += 1;
        Ok(effects)
    }

    pub(crate) fn restore(
        &mut self,
        rng: RngManager,
        inbox: Vec<Message>,
        steps: u64,
        state: Option<serde_json::Value>,
    ) -> Result<(), AgentError> {
        self.rng = rng;
        self.inbox = inbox;
        self.steps = steps;
        match state {
            Some(state) => self.behavior.load_state(state),
            None => Ok(()),
        }
    }

    pub(crate) fn into_behavior(mut self) -> Box<dyn Behavior> {
        self.behavior.on_remove();
        self.behavior
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("inbox", &self.inbox.len())
            .field("steps", &self.steps)
            .finish()
    }
}
