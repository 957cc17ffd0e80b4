//! Agent Registry
//!
//! Owns every live agent, keyed by id. Iteration is always in ascending id
//! order, which is the order the scheduler steps agents in.
//!
//! # Critical Invariants
//!
//! 1. **Unique ids**: ids are allocated monotonically starting at 1
//! 2. **No reuse**: a removed id is never handed out again
//! 3. **Exclusive ownership**: agents are only reachable through the registry

use std::collections::BTreeMap;

use crate::core::error::SimulationError;
use crate::models::agent::{Agent, AgentId, Behavior};
use crate::rng::RngManager;

/// Registry of live agents
///
/// # Example
///
/// ```rust
/// use econ_simulator_core_rs::registry::AgentRegistry;
/// use econ_simulator_core_rs::scheduler::StepContext;
/// use econ_simulator_core_rs::{AgentError, Behavior};
///
/// struct Idle;
///
/// impl Behavior for Idle {
///     fn name(&self) -> &str {
///         "idle"
///     }
///
///     fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
///         Ok(())
///     }
/// }
///
/// let mut registry = AgentRegistry::new(42);
/// let first = registry.register(Box::new(Idle));
/// let second = registry.register(Box::new(Idle));
///
/// assert!(first < second);
/// assert_eq!(registry.len(), 2);
///
/// registry.remove(first).unwrap();
/// assert!(registry.get(first).is_err());
/// ```
#[derive(Debug)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, Agent>,
    next_id: u64,
    seed: u64,
}

impl AgentRegistry {
    /// Create an empty registry; `seed` derives each agent's RNG stream
    pub fn new(seed: u64) -> Self {
        Self {
            agents: BTreeMap::new(),
            next_id: 1,
            seed,
        }
    }

    /// Register a behavior under a fresh id
    pub fn register(&mut self, behavior: Box<dyn Behavior>) -> AgentId {
        let id = AgentId::new(self.next_id);
        self.next_id += 1;
        let agent = Agent::new(id, behavior, RngManager::for_agent(self.seed, id));
        self.agents.insert(id, agent);
        id
    }

    /// Remove an agent, returning it with any undelivered inbox contents
    pub fn remove(&mut self, id: AgentId) -> Result<Agent, SimulationError> {
        self.agents
            .remove(&id)
            .ok_or(SimulationError::UnknownAgent(id))
    }

    pub fn get(&self, id: AgentId) -> Result<&Agent, SimulationError> {
        self.agents.get(&id).ok_or(SimulationError::UnknownAgent(id))
    }

    pub fn get_mut(&mut self, id: AgentId) -> Result<&mut Agent, SimulationError> {
        self.agents
            .get_mut(&id)
            .ok_or(SimulationError::UnknownAgent(id))
    }

    /// All agents in ascending id order
    pub fn all(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub(crate) fn all_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.values_mut()
    }

    /// Live ids in ascending order
    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Id the next registration will receive
    pub fn next_id(&self) -> AgentId {
        AgentId::new(self.next_id)
    }

    /// Continue allocation after `next_id` (checkpoint restore)
    pub(crate) fn resume_ids_at(&mut self, next_id: AgentId) {
        self.next_id = self.next_id.max(next_id.value());
    }

    /// Re-insert a behavior under an id it held before (checkpoint restore)
    pub(crate) fn reinstate(&mut self, id: AgentId, behavior: Box<dyn Behavior>) -> &mut Agent {
        self.next_id = self.next_id.max(id.value() + 1);
        let agent = Agent::new(id, behavior, RngManager::for_agent(self.seed, id));
        self.agents.entry(id).or_insert(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::agent::AgentError;
    use crate::scheduler::effects::StepContext;

    struct Named(&'static str);

    impl Behavior for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
            Ok(())
        }
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = AgentRegistry::new(1);
        let a = registry.register(Box::new(Named("a")));
        registry.remove(a).unwrap();
        let b = registry.register(Box::new(Named("b")));

        assert_ne!(a, b);
        assert_eq!(b, AgentId::new(2));
    }

    #[test]
    fn test_all_is_ordered_by_id() {
        let mut registry = AgentRegistry::new(1);
        for name in ["x", "y", "z"] {
            registry.register(Box::new(Named(name)));
        }
        registry.remove(AgentId::new(2)).unwrap();

        let names: Vec<&str> = registry.all().map(|a| a.name()).collect();
        assert_eq!(names, vec!["x", "z"]);
    }

    #[test]
    fn test_remove_unknown_agent_fails() {
        let mut registry = AgentRegistry::new(1);
        let err = registry.remove(AgentId::new(9)).unwrap_err();
        assert_eq!(err, SimulationError::UnknownAgent(AgentId::new(9)));
    }
}
