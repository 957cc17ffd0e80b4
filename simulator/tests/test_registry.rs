//! Tests for AgentRegistry
//!
//! Critical invariants tested:
//! - Ids are allocated monotonically from 1 and never reused
//! - Iteration is in ascending id order
//! - Unknown ids fail with `UnknownAgent`

use econ_simulator_core_rs::registry::AgentRegistry;
use econ_simulator_core_rs::scheduler::StepContext;
use econ_simulator_core_rs::{AgentError, AgentId, Behavior, RngManager, SimulationError};

// ============================================================================
// Test Helpers
// ============================================================================

struct Named {
    name: String,
}

impl Named {
    fn boxed(name: &str) -> Box<dyn Behavior> {
        Box::new(Named {
            name: name.to_string(),
        })
    }
}

impl Behavior for Named {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
        Ok(())
    }
}

fn registry_with(names: &[&str]) -> AgentRegistry {
    let mut registry = AgentRegistry::new(42);
    for name in names {
        registry.register(Named::boxed(name));
    }
    registry
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_first_id_is_one() {
    let mut registry = AgentRegistry::new(42);
    assert!(registry.is_empty());
    assert_eq!(registry.next_id(), AgentId::new(1));

    let id = registry.register(Named::boxed("a"));
    assert_eq!(id, AgentId::new(1));
    assert!(!id.is_host());
}

#[test]
fn test_ids_monotonic_and_not_reused() {
    let mut registry = registry_with(&["a", "b", "c"]);

    registry.remove(AgentId::new(3)).unwrap();
    registry.remove(AgentId::new(1)).unwrap();
    let next = registry.register(Named::boxed("d"));

    assert_eq!(next, AgentId::new(4));
    assert_eq!(registry.ids(), vec![AgentId::new(2), AgentId::new(4)]);
}

#[test]
fn test_iteration_in_id_order() {
    let registry = registry_with(&["zeta", "alpha", "mid"]);
    let ids: Vec<u64> = registry.all().map(|a| a.id().value()).collect();
    let names: Vec<&str> = registry.all().map(|a| a.name()).collect();

    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn test_unknown_agent_errors() {
    let mut registry = registry_with(&["a"]);
    let ghost = AgentId::new(77);

    assert_eq!(registry.get(ghost).unwrap_err(), SimulationError::UnknownAgent(ghost));
    assert!(registry.get_mut(ghost).is_err());
    assert!(registry.remove(ghost).is_err());
    assert!(!registry.contains(ghost));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_removed_agent_is_gone() {
    let mut registry = registry_with(&["a", "b"]);
    let removed = registry.remove(AgentId::new(1)).unwrap();

    assert_eq!(removed.name(), "a");
    assert!(registry.get(AgentId::new(1)).is_err());
    assert!(!registry.contains(AgentId::new(1)));
}

#[test]
fn test_agent_rng_derived_from_seed_and_id() {
    let registry = registry_with(&["a", "b"]);
    let agent = registry.get(AgentId::new(2)).unwrap();

    assert_eq!(
        agent.rng_state(),
        RngManager::for_agent(42, AgentId::new(2)).get_state()
    );
    assert_eq!(agent.steps(), 0);
    assert!(agent.inbox().is_empty());
}
