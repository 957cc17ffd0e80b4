//! Event logging for simulation replay and auditing.
//!
//! Every significant state change the scheduler makes is recorded as an
//! [`Event`]. The log doubles as the message trace used to check that two
//! runs with the same seed and agent set behave identically.
//!
//! # Event Types
//!
//! - **Registry**: agent registered / removed
//! - **Messaging**: message sent (sequenced) / delivered to an inbox
//! - **Stepping**: agent stepped, cascade round started
//! - **World**: key written at commit
//! - **Tick**: tick completed / aborted, scheduler halted
//!
//! # Example
//!
//! ```rust
//! use econ_simulator_core_rs::models::event::{Event, EventLog};
//! use econ_simulator_core_rs::AgentId;
//!
//! let mut log = EventLog::new();
//! log.log(Event::AgentRegistered {
//!     tick: 0,
//!     agent: AgentId::new(1),
//!     name: "price-setter".to_string(),
//! });
//!
//! assert_eq!(log.events_of_type("AgentRegistered").len(), 1);
//! ```

use crate::core::time::Tick;
use crate::models::agent::AgentId;
use crate::models::message::Recipient;

/// Simulation event capturing a state change.
///
/// Events are logged in the order they occur within a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AgentRegistered {
        tick: Tick,
        agent: AgentId,
        name: String,
    },

    AgentRemoved {
        tick: Tick,
        agent: AgentId,
    },

    /// Message sequenced onto the bus
    MessageSent {
        tick: Tick,
        seq: u64,
        sender: AgentId,
        recipient: Recipient,
        deliver_at: Tick,
        payload_kind: &'static str,
    },

    /// Message (or broadcast copy) placed in an inbox
    MessageDelivered {
        tick: Tick,
        seq: u64,
        sender: AgentId,
        recipient: AgentId,
    },

    AgentStepped {
        tick: Tick,
        agent: AgentId,
        round: usize,
        received: usize,
    },

    /// Zero-delay messages forced another stepping round
    CascadeRound {
        tick: Tick,
        round: usize,
        agents: usize,
    },

    WorldUpdated {
        tick: Tick,
        author: AgentId,
        key: String,
    },

    TickCompleted {
        tick: Tick,
        delivered: usize,
        steps: usize,
        writes: usize,
        sent: usize,
    },

    TickAborted {
        tick: Tick,
        kind: &'static str,
        error: String,
    },

    Halted {
        tick: Tick,
        reason: String,
    },
}

impl Event {
    /// Get the tick number when this event occurred
    pub fn tick(&self) -> Tick {
        match self {
            Event::AgentRegistered { tick, .. } => *tick,
            Event::AgentRemoved { tick, .. } => *tick,
            Event::MessageSent { tick, .. } => *tick,
            Event::MessageDelivered { tick, .. } => *tick,
            Event::AgentStepped { tick, .. } => *tick,
            Event::CascadeRound { tick, .. } => *tick,
            Event::WorldUpdated { tick, .. } => *tick,
            Event::TickCompleted { tick, .. } => *tick,
            Event::TickAborted { tick, .. } => *tick,
            Event::Halted { tick, .. } => *tick,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::AgentRegistered { .. } => "AgentRegistered",
            Event::AgentRemoved { .. } => "AgentRemoved",
            Event::MessageSent { .. } => "MessageSent",
            Event::MessageDelivered { .. } => "MessageDelivered",
            Event::AgentStepped { .. } => "AgentStepped",
            Event::CascadeRound { .. } => "CascadeRound",
            Event::WorldUpdated { .. } => "WorldUpdated",
            Event::TickCompleted { .. } => "TickCompleted",
            Event::TickAborted { .. } => "TickAborted",
            Event::Halted { .. } => "Halted",
        }
    }

    /// Agent the event is about, if any
    pub fn agent_id(&self) -> Option<AgentId> {
        match self {
            Event::AgentRegistered { agent, .. } => Some(*agent),
            Event::AgentRemoved { agent, .. } => Some(*agent),
            Event::MessageSent { sender, .. } => Some(*sender),
            Event::MessageDelivered { recipient, .. } => Some(*recipient),
            Event::AgentStepped { agent, .. } => Some(*agent),
            Event::WorldUpdated { author, .. } => Some(*author),
            _ => None,
        }
    }

    pub fn is_message_event(&self) -> bool {
        matches!(self, Event::MessageSent { .. } | Event::MessageDelivered { .. })
    }
}

/// Event log for storing and querying simulation events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_at_tick(&self, tick: Tick) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_agent(&self, agent: AgentId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.agent_id() == Some(agent))
            .collect()
    }

    /// Sent and delivered messages, in log order
    pub fn message_trace(&self) -> Vec<&Event> {
        self.events.iter().filter(|e| e.is_message_event()).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
