//! Per-step effect buffers and the context handed to behaviors.
//!
//! A step never mutates shared state. Everything an agent wants to happen
//! (world writes, outgoing messages, retiring, ending the simulation) is
//! recorded in its own [`Effects`] buffer, and the scheduler merges buffers
//! in ascending id order once every agent of the round has stepped.

use crate::core::time::Tick;
use crate::models::agent::AgentId;
use crate::models::message::{Envelope, Message, Payload, Recipient};
use crate::models::world::{Change, WorldDelta, WorldState, WorldValue};
use crate::rng::RngManager;

/// Delay used by `send` and `broadcast`: delivery on the next tick
pub const DEFAULT_DELAY: Tick = 1;

/// Effects proposed by one agent during one step
#[derive(Debug)]
pub struct Effects {
    owner: AgentId,
    tick: Tick,
    outgoing: Vec<Envelope>,
    deltas: Vec<WorldDelta>,
    termination: Option<String>,
    retire: bool,
}

impl Effects {
    pub(crate) fn new(owner: AgentId, tick: Tick) -> Self {
        Self {
            owner,
            tick,
            outgoing: Vec::new(),
            deltas: Vec::new(),
            termination: None,
            retire: false,
        }
    }

    /// Agent this buffer belongs to
    pub fn owner(&self) -> AgentId {
        self.owner
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn outgoing(&self) -> &[Envelope] {
        &self.outgoing
    }

    pub fn deltas(&self) -> &[WorldDelta] {
        &self.deltas
    }

    pub fn termination(&self) -> Option<&str> {
        self.termination.as_deref()
    }

    pub fn retires(&self) -> bool {
        self.retire
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
            && self.deltas.is_empty()
            && self.termination.is_none()
            && !self.retire
    }

    /// Send to one agent, delivered next tick
    pub fn send(&mut self, to: AgentId, payload: Payload) {
        self.send_after(to, DEFAULT_DELAY, payload);
    }

    /// Send to one agent after `delay` ticks; zero delivers within this tick
    pub fn send_after(&mut self, to: AgentId, delay: Tick, payload: Payload) {
        self.outgoing
            .push(Envelope::new(self.owner, Recipient::Agent(to), payload, delay));
    }

    /// Broadcast to every live agent, delivered next tick
    pub fn broadcast(&mut self, payload: Payload) {
        self.broadcast_after(DEFAULT_DELAY, payload);
    }

    pub fn broadcast_after(&mut self, delay: Tick, payload: Payload) {
        self.outgoing
            .push(Envelope::new(self.owner, Recipient::Broadcast, payload, delay));
    }

    /// Stage a world write, applied when the tick commits
    pub fn write(&mut self, key: impl Into<String>, value: impl Into<WorldValue>) {
        self.deltas.push(WorldDelta::new(
            self.owner,
            self.tick,
            key.into(),
            Change::Set(value.into()),
        ));
    }

    /// Stage removal of a world key
    pub fn remove_key(&mut self, key: impl Into<String>) {
        self.deltas
            .push(WorldDelta::new(self.owner, self.tick, key.into(), Change::Remove));
    }

    /// Re-stage a delta exactly as it was stamped
    ///
    /// A delta stamped for another tick or by another agent is rejected
    /// with `StaleWrite` when the tick commits.
    pub fn replay(&mut self, delta: WorldDelta) {
        self.deltas.push(delta);
    }

    /// Ask the scheduler to halt once this tick commits
    pub fn terminate(&mut self, reason: impl Into<String>) {
        self.termination.get_or_insert_with(|| reason.into());
    }

    /// Leave the simulation once this tick commits
    pub fn retire(&mut self) {
        self.retire = true;
    }

    /// Split off zero-delay messages, keeping delayed ones in the buffer
    pub(crate) fn take_immediate(&mut self) -> Vec<Envelope> {
        let (immediate, delayed) = std::mem::take(&mut self.outgoing)
            .into_iter()
            .partition(|e| e.delay == 0);
        self.outgoing = delayed;
        immediate
    }

    pub(crate) fn take_outgoing(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outgoing)
    }
}

/// What a behavior sees during its step
///
/// The inbox and world are borrowed for the whole step, so they can be read
/// while effects are being recorded.
pub struct StepContext<'a> {
    agent: AgentId,
    tick: Tick,
    round: usize,
    inbox: &'a [Message],
    world: &'a WorldState,
    rng: &'a mut RngManager,
    effects: &'a mut Effects,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        agent: AgentId,
        tick: Tick,
        round: usize,
        inbox: &'a [Message],
        world: &'a WorldState,
        rng: &'a mut RngManager,
        effects: &'a mut Effects,
    ) -> Self {
        Self {
            agent,
            tick,
            round,
            inbox,
            world,
            rng,
            effects,
        }
    }

    /// Id of the stepping agent
    pub fn id(&self) -> AgentId {
        self.agent
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// 0 for the regular step, >0 for zero-delay cascade rounds
    pub fn round(&self) -> usize {
        self.round
    }

    /// Messages delivered for this step, ordered by send order
    pub fn inbox(&self) -> &'a [Message] {
        self.inbox
    }

    /// World as committed at the end of the previous tick
    pub fn world(&self) -> &'a WorldState {
        self.world
    }

    /// This agent's private random stream
    pub fn rng(&mut self) -> &mut RngManager {
        self.rng
    }

    pub fn effects(&mut self) -> &mut Effects {
        self.effects
    }

    pub fn send(&mut self, to: AgentId, payload: Payload) {
        self.effects.send(to, payload);
    }

    pub fn send_after(&mut self, to: AgentId, delay: Tick, payload: Payload) {
        self.effects.send_after(to, delay, payload);
    }

    pub fn broadcast(&mut self, payload: Payload) {
        self.effects.broadcast(payload);
    }

    pub fn write(&mut self, key: impl Into<String>, value: impl Into<WorldValue>) {
        self.effects.write(key, value);
    }

    pub fn terminate(&mut self, reason: impl Into<String>) {
        self.effects.terminate(reason);
    }

    pub fn retire(&mut self) {
        self.effects.retire();
    }
}
