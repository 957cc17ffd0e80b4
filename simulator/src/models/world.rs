//! World / environment state
//!
//! Shared key-value state (prices, global parameters) that every agent reads
//! during its step. Agents never mutate it directly: they stage
//! [`WorldDelta`]s in their effect buffer, and the scheduler commits all
//! deltas of a tick atomically between ticks.
//!
//! # Critical Invariants
//!
//! 1. **Read-only during a tick**: agents only ever see `&WorldState`
//! 2. **Atomic commit**: either every delta of a tick applies or none does
//! 3. **Buffer ownership**: a delta is accepted only from the effect buffer
//!    of the agent and tick it was stamped with

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::SimulationError;
use crate::core::time::Tick;
use crate::models::agent::AgentId;

/// Value stored under a world key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorldValue {
    Flag(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl WorldValue {
    /// Numeric view; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WorldValue::Int(v) => Some(*v as f64),
            WorldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WorldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WorldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WorldValue::Flag(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for WorldValue {
    fn from(value: f64) -> Self {
        WorldValue::Float(value)
    }
}

impl From<i64> for WorldValue {
    fn from(value: i64) -> Self {
        WorldValue::Int(value)
    }
}

impl From<bool> for WorldValue {
    fn from(value: bool) -> Self {
        WorldValue::Flag(value)
    }
}

impl From<&str> for WorldValue {
    fn from(value: &str) -> Self {
        WorldValue::Text(value.to_string())
    }
}

impl From<String> for WorldValue {
    fn from(value: String) -> Self {
        WorldValue::Text(value)
    }
}

/// Proposed change to one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    Set(WorldValue),
    Remove,
}

/// A staged world write, stamped with its author and tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDelta {
    author: AgentId,
    tick: Tick,
    key: String,
    change: Change,
}

impl WorldDelta {
    pub(crate) fn new(author: AgentId, tick: Tick, key: String, change: Change) -> Self {
        Self {
            author,
            tick,
            key,
            change,
        }
    }

    pub fn author(&self) -> AgentId {
        self.author
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn change(&self) -> &Change {
        &self.change
    }
}

/// Versioned key-value world state
///
/// # Example
/// ```
/// use econ_simulator_core_rs::WorldState;
///
/// let world = WorldState::new();
/// assert!(world.is_empty());
/// assert_eq!(world.version(), 0);
/// assert_eq!(world.get_f64("price.grain"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    values: BTreeMap<String, WorldValue>,
    /// First tick at which the current values are visible
    version: Tick,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: BTreeMap<String, WorldValue>) -> Self {
        Self { values, version: 0 }
    }

    pub(crate) fn from_parts(values: BTreeMap<String, WorldValue>, version: Tick) -> Self {
        Self { values, version }
    }

    pub fn get(&self, key: &str) -> Option<&WorldValue> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(WorldValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(WorldValue::as_i64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> &BTreeMap<String, WorldValue> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn version(&self) -> Tick {
        self.version
    }

    /// Host write between ticks
    pub(crate) fn set(&mut self, key: String, value: WorldValue) {
        self.values.insert(key, value);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<WorldValue> {
        self.values.remove(key)
    }

    /// Validate and apply the deltas of `tick` as one unit
    ///
    /// `writes` pairs each delta with the owner of the effect buffer it was
    /// found in. Deltas apply in order, so the last write to a key wins.
    /// Returns the number of deltas applied.
    pub(crate) fn commit(
        &mut self,
        tick: Tick,
        writes: &[(AgentId, WorldDelta)],
    ) -> Result<usize, SimulationError> {
        if let Some((owner, delta)) = writes
            .iter()
            .find(|(owner, delta)| delta.author != *owner || delta.tick != tick)
        {
            return Err(SimulationError::StaleWrite {
                agent: *owner,
                author: delta.author,
                key: delta.key.clone(),
                stamped_tick: delta.tick,
                tick,
            });
        }

        for (_, delta) in writes {
            match &delta.change {
                Change::Set(value) => {
                    self.values.insert(delta.key.clone(), value.clone());
                }
                Change::Remove => {
                    self.values.remove(&delta.key);
                }
            }
        }
        self.version = tick + 1;
        Ok(writes.len())
    }
}
