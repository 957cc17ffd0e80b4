//! Scheduler - Main Simulation Loop
//!
//! Owns the registry, bus, world and clock, and advances them one tick at a
//! time.
//!
//! # Tick Loop
//!
//! ```text
//! 1. Drain messages due at this tick from the bus
//! 2. Deliver them to inboxes (unknown recipient aborts the tick)
//! 3. Step live agents in ascending id order into per-agent effect buffers;
//!    zero-delay messages trigger cascade rounds for their recipients
//! 4. Commit world deltas as one unit
//! 5. Enqueue delayed messages
//! 6. Apply retirements, advance the clock, sample outputs
//! ```
//!
//! # Aborted Ticks
//!
//! `UnknownAgent`, `StaleWrite` and `AgentFailed` abort the tick: its world
//! deltas and sent messages are discarded, time still advances and the
//! scheduler returns to `Idle`. The messages drained for the tick go back to
//! the bus as they were sent (broadcasts unexpanded) and are delivered on the
//! next tick; only messages for unknown recipients are dropped. Behavior
//! state is not rolled back, so an agent that stepped during the aborted
//! tick sees those messages again. `CascadeOverflow` halts the scheduler.
//!
//! A round steps every agent in it even when one fails, and the first
//! failure in id order is reported, so sequential and parallel stepping
//! leave agents in the same state.
//!
//! The host is not an agent: a reply addressed to `AgentId::HOST` fails the
//! tick with `UnknownAgent(host)` like any other unknown recipient.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bus::MessageBus;
use crate::core::error::SimulationError;
use crate::core::time::{Tick, TimeManager};
use crate::models::agent::{Agent, AgentError, AgentId, Behavior};
use crate::models::event::{Event, EventLog};
use crate::models::message::{Envelope, Message, Payload, Recipient};
use crate::models::output::Outputs;
use crate::models::world::{WorldState, WorldValue};
use crate::registry::AgentRegistry;
use crate::scheduler::config::{AgentFactory, SimulationConfig};
use crate::scheduler::effects::Effects;

// ============================================================================
// State
// ============================================================================

/// Why the scheduler stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// The configured tick horizon was reached
    MaxTicks,
    /// An agent asked to end the simulation
    AgentTerminated { agent: AgentId, reason: String },
    /// Zero-delay messages kept cascading past the configured bound
    CascadeOverflow,
    /// The host called `halt()`
    Cancelled,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::MaxTicks => write!(f, "max ticks reached"),
            HaltReason::AgentTerminated { agent, reason } => {
                write!(f, "terminated by {}: {}", agent, reason)
            }
            HaltReason::CascadeOverflow => write!(f, "cascade overflow"),
            HaltReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    Running,
    Halted(HaltReason),
}

impl SchedulerState {
    pub fn is_halted(&self) -> bool {
        matches!(self, SchedulerState::Halted(_))
    }
}

/// Result of a completed tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Tick number
    pub tick: Tick,

    /// Messages placed in inboxes (broadcast copies counted individually)
    pub delivered: usize,

    /// Step invocations, cascade rounds included
    pub steps: usize,

    /// Cascade rounds after the regular round
    pub cascade_rounds: usize,

    /// World deltas committed
    pub writes: usize,

    /// Messages sequenced onto the bus
    pub sent: usize,

    /// Agents that retired during this tick
    pub retired: Vec<AgentId>,

    /// Set when this tick halted the scheduler
    pub halted: Option<HaltReason>,
}

/// Result of `Scheduler::run`
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Ticks that committed
    pub completed: u64,

    /// Ticks aborted by recoverable errors, in order
    pub aborted: Vec<(Tick, SimulationError)>,

    /// Tick the scheduler stopped at
    pub final_tick: Tick,

    pub halt_reason: HaltReason,
}

type StepOutcome = (AgentId, usize, Result<Effects, AgentError>);

// ============================================================================
// Scheduler
// ============================================================================

/// Discrete-event scheduler
///
/// # Example
///
/// ```rust
/// use econ_simulator_core_rs::scheduler::StepContext;
/// use econ_simulator_core_rs::{AgentError, Behavior, Scheduler, SimulationConfig};
///
/// struct Counter(i64);
///
/// impl Behavior for Counter {
///     fn name(&self) -> &str {
///         "counter"
///     }
///
///     fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
///         self.0 += 1;
///         ctx.write("count", self.0);
///         Ok(())
///     }
/// }
///
/// let config = SimulationConfig::new(5, 42);
/// let mut scheduler = Scheduler::new(config, |_seed: u64| {
///     vec![Box::new(Counter(0)) as Box<dyn Behavior>]
/// })
/// .unwrap();
///
/// let summary = scheduler.run().unwrap();
/// assert_eq!(summary.completed, 5);
/// assert_eq!(scheduler.world().get_i64("count"), Some(5));
/// ```
pub struct Scheduler {
    config: SimulationConfig,
    state: SchedulerState,
    time: TimeManager,
    registry: AgentRegistry,
    bus: MessageBus,
    world: WorldState,
    outputs: Outputs,
    event_log: EventLog,
}

impl Scheduler {
    /// Validate `config` and register the factory's agents in order
    pub fn new(
        config: SimulationConfig,
        mut factory: impl AgentFactory,
    ) -> Result<Self, SimulationError> {
        let mut scheduler = Self::empty(config)?;
        for behavior in factory.create_agents(scheduler.config.seed) {
            scheduler.add_agent(behavior)?;
        }
        info!(
            "scheduler created: {} agents, max_ticks={}, seed={}",
            scheduler.registry.len(),
            scheduler.config.max_ticks,
            scheduler.config.seed
        );
        Ok(scheduler)
    }

    /// Validated scheduler with no agents
    pub(crate) fn empty(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self {
            state: SchedulerState::Idle,
            time: TimeManager::new(config.max_ticks),
            registry: AgentRegistry::new(config.seed),
            bus: MessageBus::new(),
            world: WorldState::with_values(config.initial_world.clone()),
            outputs: Outputs::observing(config.observed_keys.iter().cloned()),
            event_log: EventLog::new(),
            config,
        })
    }

    /// Reassemble a scheduler from restored parts
    pub(crate) fn from_parts(
        config: SimulationConfig,
        state: SchedulerState,
        time: TimeManager,
        registry: AgentRegistry,
        bus: MessageBus,
        world: WorldState,
        outputs: Outputs,
    ) -> Self {
        Self {
            config,
            state,
            time,
            registry,
            bus,
            world,
            outputs,
            event_log: EventLog::new(),
        }
    }

    // ========================================================================
    // Tick Execution
    // ========================================================================

    /// Execute one tick
    ///
    /// Returns `Err(Halted)` without doing anything once halted. A
    /// recoverable error aborts this tick only; the next call runs the
    /// following tick.
    pub fn tick(&mut self) -> Result<TickReport, SimulationError> {
        if let SchedulerState::Halted(reason) = &self.state {
            return Err(SimulationError::Halted(reason.clone()));
        }

        let tick = self.time.current_tick();
        self.state = SchedulerState::Running;

        // STEP 1: DRAIN (held until the tick commits)
        let mut due = self.bus.take_due(tick);
        let outcome = self.execute_tick(tick, &mut due);
        if outcome.is_err() {
            self.return_undelivered(due);
        }

        match outcome {
            Ok((mut report, termination)) => {
                self.time.advance_tick();
                self.outputs.sample(tick, &self.world);
                self.event_log.log(Event::TickCompleted {
                    tick,
                    delivered: report.delivered,
                    steps: report.steps,
                    writes: report.writes,
                    sent: report.sent,
                });
                debug!(
                    "tick {} committed: delivered={} steps={} writes={} sent={}",
                    tick, report.delivered, report.steps, report.writes, report.sent
                );
                self.state = SchedulerState::Idle;

                let halt = match termination {
                    Some((agent, reason)) => Some(HaltReason::AgentTerminated { agent, reason }),
                    None if self.time.is_exhausted() => Some(HaltReason::MaxTicks),
                    None => None,
                };
                if let Some(reason) = halt {
                    self.enter_halt(reason.clone());
                    report.halted = Some(reason);
                }
                Ok(report)
            }
            Err(err) if err.is_fatal() => {
                self.record_abort(tick, &err);
                self.enter_halt(HaltReason::CascadeOverflow);
                Err(err)
            }
            Err(err) => {
                warn!("tick {} aborted: {}", tick, err);
                self.record_abort(tick, &err);
                self.time.advance_tick();
                self.state = SchedulerState::Idle;
                if self.time.is_exhausted() {
                    self.enter_halt(HaltReason::MaxTicks);
                }
                Err(err)
            }
        }
    }

    /// Run until halted
    ///
    /// Aborted ticks are collected in the summary; only fatal errors are
    /// returned as `Err`.
    pub fn run(&mut self) -> Result<RunSummary, SimulationError> {
        if let SchedulerState::Halted(reason) = &self.state {
            return Err(SimulationError::Halted(reason.clone()));
        }

        let mut completed = 0;
        let mut aborted = Vec::new();
        loop {
            if let SchedulerState::Halted(reason) = &self.state {
                return Ok(RunSummary {
                    completed,
                    aborted,
                    final_tick: self.time.current_tick(),
                    halt_reason: reason.clone(),
                });
            }

            let tick = self.time.current_tick();
            match self.tick() {
                Ok(_) => completed += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => aborted.push((tick, err)),
            }
        }
    }

    /// Stop at the current tick boundary
    ///
    /// No effect if already halted.
    pub fn halt(&mut self) {
        if !self.state.is_halted() {
            self.enter_halt(HaltReason::Cancelled);
        }
    }

    /// Run phases 2 to 6 over the messages drained for `tick`
    ///
    /// On error `due` holds the messages to return to the bus: undeliverable
    /// ones have been removed from it.
    fn execute_tick(
        &mut self,
        tick: Tick,
        due: &mut Vec<Message>,
    ) -> Result<(TickReport, Option<(AgentId, String)>), SimulationError> {
        // STEP 2: DELIVER
        let missing = due
            .iter()
            .filter_map(|message| message.recipient().agent())
            .filter(|id| !self.registry.contains(*id))
            .min();
        if let Some(missing) = missing {
            let registry = &self.registry;
            let before = due.len();
            due.retain(|message| {
                message.recipient().agent().map_or(true, |id| registry.contains(id))
            });
            warn!(
                "tick {}: dropping {} undeliverable message(s), first for {}",
                tick,
                before - due.len(),
                missing
            );
            return Err(SimulationError::UnknownAgent(missing));
        }
        let live = self.registry.ids();
        let mut delivered = self.deliver(tick, MessageBus::expand(due, &live))?;

        // STEP 3: STEP AGENTS (with zero-delay cascade rounds)
        let mut buffers: Vec<Effects> = Vec::new();
        let mut active = live;
        let mut round = 0;
        let mut steps = 0;
        let mut sent = 0;
        loop {
            let mut stepped = self.step_round(tick, round, &active)?;
            steps += stepped.len();

            let mut immediate = Vec::new();
            for buffer in stepped.iter_mut() {
                immediate.extend(buffer.take_immediate());
            }
            buffers.extend(stepped);
            if immediate.is_empty() {
                break;
            }

            if round >= self.config.max_cascade_depth {
                return Err(SimulationError::CascadeOverflow {
                    tick,
                    bound: self.config.max_cascade_depth,
                });
            }
            self.check_recipients(&immediate)?;
            for envelope in immediate {
                let message = self.sequence_message(envelope, tick);
                self.bus.enqueue(message);
                sent += 1;
            }

            round += 1;
            let cascade = self.bus.drain(tick, &self.registry.ids());
            active = cascade.iter().filter_map(|m| m.recipient().agent()).collect();
            active.dedup();
            self.event_log.log(Event::CascadeRound {
                tick,
                round,
                agents: active.len(),
            });
            delivered += self.deliver(tick, cascade)?;
        }

        let mut outgoing = Vec::new();
        let mut writes = Vec::new();
        for buffer in buffers.iter_mut() {
            outgoing.extend(buffer.take_outgoing());
            let owner = buffer.owner();
            writes.extend(buffer.deltas().iter().map(|delta| (owner, delta.clone())));
        }
        // Nothing is applied unless every delayed message can be routed
        self.check_recipients(&outgoing)?;

        // STEP 4: COMMIT WORLD DELTAS
        let applied = self.world.commit(tick, &writes)?;
        for (_, delta) in &writes {
            self.event_log.log(Event::WorldUpdated {
                tick,
                author: delta.author(),
                key: delta.key().to_string(),
            });
        }

        // STEP 5: ENQUEUE DELAYED MESSAGES
        for envelope in outgoing {
            let message = self.sequence_message(envelope, tick);
            self.bus.enqueue(message);
            sent += 1;
        }

        // STEP 6: RETIREMENTS
        let mut retired: Vec<AgentId> = Vec::new();
        for buffer in &buffers {
            if buffer.retires() && !retired.contains(&buffer.owner()) {
                retired.push(buffer.owner());
            }
        }
        for id in &retired {
            self.detach(*id, tick)?;
        }

        let termination = buffers
            .iter()
            .find_map(|b| b.termination().map(|reason| (b.owner(), reason.to_string())));

        let report = TickReport {
            tick,
            delivered,
            steps,
            cascade_rounds: round,
            writes: applied,
            sent,
            retired,
            halted: None,
        };
        Ok((report, termination))
    }

    /// Step the agents in `active` (ascending ids) once each
    fn step_round(
        &mut self,
        tick: Tick,
        round: usize,
        active: &[AgentId],
    ) -> Result<Vec<Effects>, SimulationError> {
        let world = &self.world;
        let agents = self
            .registry
            .all_mut()
            .filter(|agent| active.binary_search(&agent.id()).is_ok());

        #[cfg(feature = "parallel")]
        let outcomes = if self.config.parallel_steps {
            step_parallel(agents.collect(), tick, round, world)
        } else {
            step_sequential(agents, tick, round, world)
        };
        #[cfg(not(feature = "parallel"))]
        let outcomes = step_sequential(agents, tick, round, world);

        // every agent in the round has stepped; report the first failure
        let mut effects = Vec::with_capacity(outcomes.len());
        let mut failure = None;
        for (agent, received, result) in outcomes {
            match result {
                Ok(buffer) => {
                    self.event_log.log(Event::AgentStepped {
                        tick,
                        agent,
                        round,
                        received,
                    });
                    effects.push(buffer);
                }
                Err(source) if failure.is_none() => {
                    failure = Some(SimulationError::AgentFailed {
                        agent,
                        tick,
                        source,
                    });
                }
                Err(_) => {}
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(effects),
        }
    }

    /// Give an aborted tick's drained messages back to the bus
    ///
    /// Inboxes filled during the tick are emptied so each message is handed
    /// out once more, on the next tick.
    fn return_undelivered(&mut self, due: Vec<Message>) {
        for agent in self.registry.all_mut() {
            agent.clear_inbox();
        }
        if !due.is_empty() {
            debug!("returning {} drained message(s) to the bus", due.len());
            self.bus.requeue(due);
        }
    }

    fn deliver(&mut self, tick: Tick, messages: Vec<Message>) -> Result<usize, SimulationError> {
        let count = messages.len();
        for message in messages {
            let Recipient::Agent(recipient) = message.recipient() else {
                continue;
            };
            self.event_log.log(Event::MessageDelivered {
                tick,
                seq: message.seq(),
                sender: message.sender(),
                recipient,
            });
            self.registry.get_mut(recipient)?.deliver(message);
        }
        Ok(count)
    }

    fn check_recipients(&self, envelopes: &[Envelope]) -> Result<(), SimulationError> {
        for envelope in envelopes {
            if let Recipient::Agent(id) = envelope.recipient {
                if !self.registry.contains(id) {
                    return Err(SimulationError::UnknownAgent(id));
                }
            }
        }
        Ok(())
    }

    fn sequence_message(&mut self, envelope: Envelope, tick: Tick) -> Message {
        let message = self.bus.sequence(envelope, tick);
        self.event_log.log(Event::MessageSent {
            tick,
            seq: message.seq(),
            sender: message.sender(),
            recipient: message.recipient(),
            deliver_at: message.deliver_at(),
            payload_kind: message.payload().kind(),
        });
        message
    }

    fn record_abort(&mut self, tick: Tick, err: &SimulationError) {
        self.event_log.log(Event::TickAborted {
            tick,
            kind: err.kind(),
            error: err.to_string(),
        });
    }

    fn enter_halt(&mut self, reason: HaltReason) {
        let tick = self.time.current_tick();
        info!("scheduler halted at tick {}: {}", tick, reason);
        self.event_log.log(Event::Halted {
            tick,
            reason: reason.to_string(),
        });
        self.state = SchedulerState::Halted(reason);
    }

    fn detach(&mut self, id: AgentId, tick: Tick) -> Result<Box<dyn Behavior>, SimulationError> {
        let agent = self.registry.remove(id)?;
        self.event_log.log(Event::AgentRemoved { tick, agent: id });
        debug!("{} removed at tick {}", id, tick);
        Ok(agent.into_behavior())
    }

    // ========================================================================
    // Host Operations (between ticks)
    // ========================================================================

    /// Register a behavior under a fresh id
    pub fn add_agent(&mut self, behavior: Box<dyn Behavior>) -> Result<AgentId, SimulationError> {
        let id = self.registry.register(behavior);
        let name = self.registry.get(id)?.name().to_string();
        self.event_log.log(Event::AgentRegistered {
            tick: self.time.current_tick(),
            agent: id,
            name,
        });
        Ok(id)
    }

    /// Remove an agent and hand its behavior back
    ///
    /// Messages still pending for `id` fail with `UnknownAgent` when they
    /// come due.
    pub fn remove_agent(&mut self, id: AgentId) -> Result<Box<dyn Behavior>, SimulationError> {
        let tick = self.time.current_tick();
        self.detach(id, tick)
    }

    /// Write a world value outside any agent step
    pub fn set_world(&mut self, key: impl Into<String>, value: impl Into<WorldValue>) {
        self.world.set(key.into(), value.into());
    }

    pub fn remove_world(&mut self, key: &str) -> Option<WorldValue> {
        self.world.remove(key)
    }

    /// Inject a message from the host, due `delay` ticks after the next tick
    ///
    /// With `delay == 0` it is delivered when the next tick runs. The sender
    /// is `AgentId::HOST`, which cannot be replied to.
    pub fn post(
        &mut self,
        recipient: Recipient,
        payload: Payload,
        delay: Tick,
    ) -> Result<u64, SimulationError> {
        let envelope = Envelope::new(AgentId::HOST, recipient, payload, delay);
        self.check_recipients(std::slice::from_ref(&envelope))?;
        let tick = self.time.current_tick();
        let message = self.sequence_message(envelope, tick);
        let seq = message.seq();
        self.bus.enqueue(message);
        Ok(seq)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state.is_halted()
    }

    /// The tick that will execute next
    pub fn current_tick(&self) -> Tick {
        self.time.current_tick()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn agent(&self, id: AgentId) -> Result<&Agent, SimulationError> {
        self.registry.get(id)
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.registry.ids()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub(crate) fn time(&self) -> &TimeManager {
        &self.time
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("tick", &self.time.current_tick())
            .field("agents", &self.registry.len())
            .field("pending", &self.bus.len())
            .finish()
    }
}

fn step_sequential<'a>(
    agents: impl Iterator<Item = &'a mut Agent>,
    tick: Tick,
    round: usize,
    world: &WorldState,
) -> Vec<StepOutcome> {
    agents
        .map(|agent| {
            let received = agent.inbox().len();
            (agent.id(), received, agent.run_step(tick, round, world))
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn step_parallel(
    agents: Vec<&mut Agent>,
    tick: Tick,
    round: usize,
    world: &WorldState,
) -> Vec<StepOutcome> {
    use rayon::prelude::*;

    agents
        .into_par_iter()
        .map(|agent| {
            let received = agent.inbox().len();
            (agent.id(), received, agent.run_step(tick, round, world))
        })
        .collect()
}
