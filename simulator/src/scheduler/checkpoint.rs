//! Checkpoint - Save/Load Scheduler State
//!
//! A snapshot captures everything needed to continue a simulation from a
//! tick boundary: agent RNG streams, inboxes and behavior state, pending
//! bus messages, the world, and the recorded outputs.
//!
//! # Critical Invariants
//!
//! - **Determinism**: a restored scheduler produces the same subsequent
//!   message trace as the original would have
//! - **Config Matching**: a snapshot only loads with the config it was taken
//!   under (SHA-256 of the canonical JSON)
//! - **No Orphans**: every queued message targets an id that was allocated

use std::collections::{BTreeMap, HashSet};

use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bus::MessageBus;
use crate::core::error::SimulationError;
use crate::core::time::{Tick, TimeManager};
use crate::models::agent::{Agent, AgentId};
use crate::models::message::{Message, Recipient};
use crate::models::output::Outputs;
use crate::models::world::{WorldState, WorldValue};
use crate::registry::AgentRegistry;
use crate::rng::RngManager;
use crate::scheduler::config::{AgentFactory, SimulationConfig};
use crate::scheduler::engine::{Scheduler, SchedulerState};

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete scheduler state at a tick boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Next tick to execute
    pub current_tick: Tick,

    pub state: SchedulerState,

    /// Master seed (CRITICAL for determinism)
    pub seed: u64,

    /// Id the next registration receives
    pub next_agent_id: AgentId,

    /// Sequence number the next message receives
    pub next_seq: u64,

    /// Live agents in ascending id order
    pub agents: Vec<AgentSnapshot>,

    /// Queued messages in (delivery tick, send order) order
    pub pending_messages: Vec<Message>,

    pub world: BTreeMap<String, WorldValue>,

    pub world_version: Tick,

    pub outputs: Outputs,

    /// SHA256 hash of the config (for validation)
    pub config_hash: String,
}

/// Agent state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub rng_state: u64,
    pub steps: u64,
    pub inbox: Vec<Message>,
    /// Private behavior state from `Behavior::save_state`
    pub state: Option<serde_json::Value>,
}

impl From<&Agent> for AgentSnapshot {
    fn from(agent: &Agent) -> Self {
        AgentSnapshot {
            id: agent.id(),
            name: agent.name().to_string(),
            rng_state: agent.rng_state(),
            steps: agent.steps(),
            inbox: agent.inbox().to_vec(),
            state: agent.behavior().save_state(),
        }
    }
}

impl StateSnapshot {
    pub fn to_json(&self) -> Result<String, SimulationError> {
        serde_json::to_string(self).map_err(|e| {
            SimulationError::Serialization(format!("Snapshot serialization failed: {}", e))
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json)
            .map_err(|e| SimulationError::Serialization(format!("Snapshot parse failed: {}", e)))
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// SHA-256 of `config` serialized as JSON with recursively sorted keys
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation
// ============================================================================

/// Check the internal consistency of a snapshot
pub fn validate_snapshot(snapshot: &StateSnapshot) -> Result<(), SimulationError> {
    let invalid = |msg: String| Err(SimulationError::StateValidation(msg));

    if snapshot.state == SchedulerState::Running {
        return invalid("snapshot taken mid-tick".to_string());
    }

    // 1. Agent ids: ascending, unique, allocated
    let mut previous: Option<AgentId> = None;
    for agent in &snapshot.agents {
        if agent.id.is_host() || agent.id >= snapshot.next_agent_id {
            return invalid(format!("{} was never allocated", agent.id));
        }
        if previous.map_or(false, |p| p >= agent.id) {
            return invalid(format!("agent ids not strictly ascending at {}", agent.id));
        }
        previous = Some(agent.id);
    }

    // 2. Inbox integrity
    let mut seen = HashSet::new();
    for agent in &snapshot.agents {
        for message in &agent.inbox {
            if message.recipient() != Recipient::Agent(agent.id) {
                return invalid(format!(
                    "message {} in inbox of {} is addressed to {}",
                    message.seq(),
                    agent.id,
                    message.recipient()
                ));
            }
            if message.seq() >= snapshot.next_seq {
                return invalid(format!("message {} is ahead of the sequence", message.seq()));
            }
            seen.insert((message.seq(), agent.id));
        }
    }

    // 3. Pending queue integrity
    for message in &snapshot.pending_messages {
        if message.seq() >= snapshot.next_seq {
            return invalid(format!("message {} is ahead of the sequence", message.seq()));
        }
        if let Recipient::Agent(id) = message.recipient() {
            if id.is_host() || id >= snapshot.next_agent_id {
                return invalid(format!(
                    "message {} addressed to unallocated {}",
                    message.seq(),
                    id
                ));
            }
            if !seen.insert((message.seq(), id)) {
                return invalid(format!("message {} is duplicated", message.seq()));
            }
        }
    }

    if snapshot.world_version > snapshot.current_tick {
        return invalid(format!(
            "world version {} is ahead of tick {}",
            snapshot.world_version, snapshot.current_tick
        ));
    }

    Ok(())
}

// ============================================================================
// Save / Restore
// ============================================================================

impl Scheduler {
    /// Capture the scheduler at the current tick boundary
    pub fn snapshot(&self) -> Result<StateSnapshot, SimulationError> {
        Ok(StateSnapshot {
            current_tick: self.current_tick(),
            state: self.state().clone(),
            seed: self.config().seed,
            next_agent_id: self.registry().next_id(),
            next_seq: self.bus().next_seq(),
            agents: self.registry().all().map(AgentSnapshot::from).collect(),
            pending_messages: self.bus().pending().cloned().collect(),
            world: self.world().values().clone(),
            world_version: self.world().version(),
            outputs: self.outputs().clone(),
            config_hash: compute_config_hash(self.config())?,
        })
    }

    /// Rebuild a scheduler from `snapshot`
    ///
    /// `factory` must produce one behavior per snapshotted agent, in
    /// ascending id order, with matching names. The event log starts empty.
    pub fn restore(
        config: SimulationConfig,
        mut factory: impl AgentFactory,
        snapshot: StateSnapshot,
    ) -> Result<Self, SimulationError> {
        config.validate()?;

        let config_hash = compute_config_hash(&config)?;
        if config_hash != snapshot.config_hash {
            return Err(SimulationError::StateValidation(
                "Config hash mismatch".to_string(),
            ));
        }
        validate_snapshot(&snapshot)?;

        let behaviors = factory.create_agents(config.seed);
        if behaviors.len() != snapshot.agents.len() {
            return Err(SimulationError::StateValidation(format!(
                "factory produced {} agents, snapshot has {}",
                behaviors.len(),
                snapshot.agents.len()
            )));
        }

        let mut registry = AgentRegistry::new(config.seed);
        for (behavior, saved) in behaviors.into_iter().zip(snapshot.agents) {
            if behavior.name() != saved.name {
                return Err(SimulationError::StateValidation(format!(
                    "{} was '{}', factory produced '{}'",
                    saved.id,
                    saved.name,
                    behavior.name()
                )));
            }
            registry
                .reinstate(saved.id, behavior)
                .restore(
                    RngManager::new(saved.rng_state),
                    saved.inbox,
                    saved.steps,
                    saved.state,
                )
                .map_err(|e| {
                    let msg = format!("{} rejected its state: {}", saved.id, e);
                    SimulationError::StateValidation(msg)
                })?;
        }
        registry.resume_ids_at(snapshot.next_agent_id);

        let mut bus = MessageBus::new();
        bus.resume_seq_at(snapshot.next_seq);
        for message in snapshot.pending_messages {
            bus.enqueue(message);
        }

        info!(
            "restored scheduler at tick {} with {} agents",
            snapshot.current_tick,
            registry.len()
        );

        let time = TimeManager::resume_at(config.max_ticks, snapshot.current_tick);
        Ok(Scheduler::from_parts(
            config,
            snapshot.state,
            time,
            registry,
            bus,
            WorldState::from_parts(snapshot.world, snapshot.world_version),
            snapshot.outputs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_snapshot() -> StateSnapshot {
        StateSnapshot {
            current_tick: 4,
            state: SchedulerState::Idle,
            seed: 1,
            next_agent_id: AgentId::new(3),
            next_seq: 10,
            agents: Vec::new(),
            pending_messages: Vec::new(),
            world: BTreeMap::new(),
            world_version: 4,
            outputs: Outputs::default(),
            config_hash: String::new(),
        }
    }

    #[test]
    fn test_config_hash_is_stable() {
        let config = SimulationConfig::new(10, 7).with_world("b", 1.0).with_world("a", 2.0);
        let first = compute_config_hash(&config).unwrap();
        let second = compute_config_hash(&config.clone()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, compute_config_hash(&SimulationConfig::new(10, 8)).unwrap());
    }

    #[test]
    fn test_mid_tick_snapshot_rejected() {
        let mut snapshot = empty_snapshot();
        snapshot.state = SchedulerState::Running;
        assert!(validate_snapshot(&snapshot).is_err());
    }

    #[test]
    fn test_world_version_ahead_rejected() {
        let mut snapshot = empty_snapshot();
        snapshot.world_version = 9;
        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(SimulationError::StateValidation(_))
        ));
    }

    #[test]
    fn test_unallocated_agent_rejected() {
        let mut snapshot = empty_snapshot();
        snapshot.agents.push(AgentSnapshot {
            id: AgentId::new(5),
            name: "ghost".to_string(),
            rng_state: 1,
            steps: 0,
            inbox: Vec::new(),
            state: None,
        });
        assert!(validate_snapshot(&snapshot).is_err());
    }
}
