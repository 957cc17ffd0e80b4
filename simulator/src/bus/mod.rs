//! Message Bus
//!
//! Point-to-point and broadcast delivery between agents.
//!
//! # Ordering
//!
//! Every message gets a global sequence number when it is sent. `drain`
//! returns due messages ordered by (recipient id, sequence number), so
//! each inbox receives messages in send order and the overall delivery
//! order does not depend on how the queue was filled.
//!
//! # Broadcasts
//!
//! A broadcast is stored once and expanded at drain time into one copy per
//! agent live at that moment. Agents registered after the send still
//! receive it; agents removed before delivery do not.

use std::collections::BTreeMap;

use crate::core::time::Tick;
use crate::models::agent::AgentId;
use crate::models::message::{Envelope, Message, Recipient};

#[derive(Debug, Clone)]
pub struct MessageBus {
    /// Messages keyed by delivery tick, each bucket in send order
    pending: BTreeMap<Tick, Vec<Message>>,
    next_seq: u64,
    len: usize,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_seq: 1,
            len: 0,
        }
    }

    /// Enqueue an envelope sent at `sent_at`; returns its sequence number
    pub fn send(&mut self, envelope: Envelope, sent_at: Tick) -> u64 {
        let message = self.sequence(envelope, sent_at);
        let seq = message.seq();
        self.enqueue(message);
        seq
    }

    /// Stamp an envelope with the next sequence number without queueing it
    pub(crate) fn sequence(&mut self, envelope: Envelope, sent_at: Tick) -> Message {
        let seq = self.next_seq;
        self.next_seq += 1;
        Message::from_envelope(seq, envelope, sent_at)
    }

    pub(crate) fn enqueue(&mut self, message: Message) {
        self.pending
            .entry(message.deliver_at())
            .or_default()
            .push(message);
        self.len += 1;
    }

    /// Put drained messages back; they stay due at their original tick
    pub(crate) fn requeue(&mut self, messages: Vec<Message>) {
        for message in messages {
            self.enqueue(message);
        }
        for bucket in self.pending.values_mut() {
            bucket.sort_by_key(Message::seq);
        }
    }

    /// Remove and return every message due at or before `tick`
    ///
    /// Broadcasts expand to one copy per id in `live` (which must be the
    /// ascending list of live agents). The result is ordered by
    /// (recipient id, sequence number).
    pub fn drain(&mut self, tick: Tick, live: &[AgentId]) -> Vec<Message> {
        let due = self.take_due(tick);
        Self::expand(&due, live)
    }

    /// Remove the messages due at or before `tick` without expanding them
    ///
    /// Broadcasts come back once, as sent, so an aborted tick can return
    /// them to the bus and expand them again against a later population.
    pub(crate) fn take_due(&mut self, tick: Tick) -> Vec<Message> {
        let later = match tick.checked_add(1) {
            Some(next) => self.pending.split_off(&next),
            None => BTreeMap::new(),
        };
        let due: Vec<Message> = std::mem::replace(&mut self.pending, later)
            .into_values()
            .flatten()
            .collect();
        self.len -= due.len();
        due
    }

    /// Per-recipient copies of `due`, ordered by (recipient id, sequence number)
    pub fn expand(due: &[Message], live: &[AgentId]) -> Vec<Message> {
        let mut out = Vec::with_capacity(due.len());
        for message in due {
            match message.recipient() {
                Recipient::Agent(_) => out.push(message.clone()),
                Recipient::Broadcast => {
                    out.extend(live.iter().map(|id| message.copy_for(*id)));
                }
            }
        }
        out.sort_by_key(|m| (m.recipient().agent(), m.seq()));
        out
    }

    /// Earliest tick with a pending message
    pub fn next_delivery_tick(&self) -> Option<Tick> {
        self.pending.keys().next().copied()
    }

    /// Pending messages in (delivery tick, send order) order
    pub fn pending(&self) -> impl Iterator<Item = &Message> {
        self.pending.values().flatten()
    }

    /// Sequence number the next send will receive
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub(crate) fn resume_seq_at(&mut self, next_seq: u64) {
        self.next_seq = self.next_seq.max(next_seq);
    }

    /// Number of queued messages (a broadcast counts once)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
