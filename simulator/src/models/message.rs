//! Messages exchanged between agents.
//!
//! An [`Envelope`] is what a sender hands to the bus: addressing, payload and
//! a delay in ticks. The bus stamps it with a global sequence number and the
//! send tick, producing an immutable [`Message`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::time::Tick;
use crate::models::agent::AgentId;

/// Message destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    /// Point-to-point delivery
    Agent(AgentId),
    /// One copy per live agent, expanded at delivery time
    Broadcast,
}

impl Recipient {
    /// Addressed agent, `None` for broadcasts
    pub fn agent(self) -> Option<AgentId> {
        match self {
            Recipient::Agent(id) => Some(id),
            Recipient::Broadcast => None,
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Agent(id) => write!(f, "{}", id),
            Recipient::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Price quote for one traded property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub property: String,
    pub price: f64,
}

/// Linear excess-demand schedule `z(p) = intercept - slope * p`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSchedule {
    pub property: String,
    pub intercept: f64,
    pub slope: f64,
}

impl DemandSchedule {
    pub fn excess_demand(&self, price: f64) -> f64 {
        self.intercept - self.slope * price
    }
}

/// Transfer of a property at a cleared price
///
/// Positive quantities are delivered to the recipient, negative quantities
/// are taken from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub property: String,
    pub quantity: i64,
    pub price: f64,
}

/// Message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Empty,
    Text(String),
    Number(f64),
    Quote(Quote),
    Demand(DemandSchedule),
    Transfer(Transfer),
    Data(serde_json::Value),
}

impl Payload {
    /// Short variant name for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "Empty",
            Payload::Text(_) => "Text",
            Payload::Number(_) => "Number",
            Payload::Quote(_) => "Quote",
            Payload::Demand(_) => "Demand",
            Payload::Transfer(_) => "Transfer",
            Payload::Data(_) => "Data",
        }
    }
}

/// Unsequenced outgoing message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: AgentId,
    pub recipient: Recipient,
    pub payload: Payload,
    /// Ticks until delivery; zero means later in the same tick
    pub delay: Tick,
}

impl Envelope {
    pub fn new(sender: AgentId, recipient: Recipient, payload: Payload, delay: Tick) -> Self {
        Self {
            sender,
            recipient,
            payload,
            delay,
        }
    }
}

/// Sequenced, immutable message
///
/// # Example
/// ```
/// use econ_simulator_core_rs::models::message::{Envelope, Payload, Recipient};
/// use econ_simulator_core_rs::{AgentId, MessageBus};
///
/// let mut bus = MessageBus::new();
/// let to = AgentId::new(2);
/// bus.send(Envelope::new(AgentId::new(1), Recipient::Agent(to), Payload::Number(1.5), 3), 10);
///
/// let due = bus.drain(13, &[to]);
/// assert_eq!(due[0].deliver_at(), 13);
/// assert_eq!(due[0].sent_at(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    seq: u64,
    sender: AgentId,
    recipient: Recipient,
    payload: Payload,
    sent_at: Tick,
    deliver_at: Tick,
    broadcast_copy: bool,
}

impl Message {
    pub(crate) fn from_envelope(seq: u64, envelope: Envelope, sent_at: Tick) -> Self {
        Self {
            seq,
            sender: envelope.sender,
            recipient: envelope.recipient,
            payload: envelope.payload,
            sent_at,
            deliver_at: sent_at.saturating_add(envelope.delay),
            broadcast_copy: false,
        }
    }

    /// Copy of a broadcast addressed to one live agent
    pub(crate) fn copy_for(&self, agent: AgentId) -> Self {
        Self {
            recipient: Recipient::Agent(agent),
            broadcast_copy: true,
            ..self.clone()
        }
    }

    /// Global send order
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn sender(&self) -> AgentId {
        self.sender
    }

    pub fn recipient(&self) -> Recipient {
        self.recipient
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn sent_at(&self) -> Tick {
        self.sent_at
    }

    /// Earliest tick at which the message may be delivered
    pub fn deliver_at(&self) -> Tick {
        self.deliver_at
    }

    /// True for per-agent copies produced by broadcast expansion
    pub fn is_broadcast_copy(&self) -> bool {
        self.broadcast_copy
    }
}
