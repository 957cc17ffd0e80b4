//! Checkpoint save/restore tests
//!
//! Critical invariants tested:
//! - Restore resumes with the same subsequent message trace and world
//! - Snapshots survive a JSON round trip
//! - Config and population mismatches are rejected
//! - Corrupt snapshots fail validation

use serde_json::json;

use econ_simulator_core_rs::scheduler::{compute_config_hash, validate_snapshot, StepContext};
use econ_simulator_core_rs::{
    AgentError, AgentId, Behavior, Event, HaltReason, Payload, Recipient, Scheduler,
    SchedulerState, SimulationConfig, SimulationError, StateSnapshot,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Counts received messages and passes a token to a random agent
struct Tally {
    population: u64,
    received: i64,
}

impl Behavior for Tally {
    fn name(&self) -> &str {
        "tally"
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
        self.received += ctx.inbox().len() as i64;

        let peer = ctx.rng().range(1, self.population as i64 + 1) as u64;
        let delay = ctx.rng().range(1, 4) as u64;
        ctx.send_after(AgentId::new(peer), delay, Payload::Number(self.received as f64));

        let key = format!("received.{}", ctx.id().value());
        ctx.write(key, self.received);
        Ok(())
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        Some(json!({ "received": self.received }))
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<(), AgentError> {
        self.received = state["received"]
            .as_i64()
            .ok_or_else(|| AgentError::InvalidState("missing 'received'".to_string()))?;
        Ok(())
    }
}

const POPULATION: u64 = 4;

fn config() -> SimulationConfig {
    SimulationConfig::new(12, 2024).observing("received.1")
}

fn tallies(_seed: u64) -> Vec<Box<dyn Behavior>> {
    (0..POPULATION)
        .map(|_| {
            Box::new(Tally {
                population: POPULATION,
                received: 0,
            }) as Box<dyn Behavior>
        })
        .collect()
}

fn trace_from(scheduler: &Scheduler, tick: u64) -> Vec<Event> {
    scheduler
        .event_log()
        .message_trace()
        .into_iter()
        .filter(|e| e.tick() >= tick)
        .cloned()
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_restore_resumes_identical_run() {
    let _ = env_logger::try_init();

    let mut reference = Scheduler::new(config(), tallies).unwrap();
    reference.run().unwrap();

    let mut first = Scheduler::new(config(), tallies).unwrap();
    for _ in 0..5 {
        first.tick().unwrap();
    }
    let json = first.snapshot().unwrap().to_json().unwrap();
    drop(first);

    let snapshot = StateSnapshot::from_json(&json).unwrap();
    let mut resumed = Scheduler::restore(config(), tallies, snapshot).unwrap();
    assert_eq!(resumed.current_tick(), 5);
    assert!(resumed.event_log().is_empty());
    resumed.run().unwrap();

    assert_eq!(trace_from(&resumed, 5), trace_from(&reference, 5));
    assert_eq!(resumed.world(), reference.world());
    assert_eq!(
        resumed.outputs().series("received.1"),
        reference.outputs().series("received.1")
    );
    for id in resumed.agent_ids() {
        assert_eq!(
            resumed.agent(id).unwrap().rng_state(),
            reference.agent(id).unwrap().rng_state()
        );
    }
}

#[test]
fn test_snapshot_captures_boundary_state() {
    let mut scheduler = Scheduler::new(config(), tallies).unwrap();
    scheduler.tick().unwrap();
    scheduler.tick().unwrap();

    let snapshot = scheduler.snapshot().unwrap();

    assert_eq!(snapshot.current_tick, 2);
    assert_eq!(snapshot.state, SchedulerState::Idle);
    assert_eq!(snapshot.seed, 2024);
    assert_eq!(snapshot.next_agent_id, AgentId::new(POPULATION + 1));
    assert_eq!(snapshot.agents.len(), POPULATION as usize);
    assert_eq!(snapshot.pending_messages.len(), scheduler.bus().len());
    assert_eq!(snapshot.next_seq, 9);
    assert_eq!(snapshot.world_version, 2);
    assert_eq!(snapshot.config_hash, compute_config_hash(&config()).unwrap());
    assert!(snapshot.agents.iter().all(|a| a.state.is_some() && a.steps == 2));
    validate_snapshot(&snapshot).unwrap();
}

#[test]
fn test_config_mismatch_rejected() {
    let scheduler = Scheduler::new(config(), tallies).unwrap();
    let snapshot = scheduler.snapshot().unwrap();

    let other = SimulationConfig::new(12, 2025).observing("received.1");
    let err = Scheduler::restore(other, tallies, snapshot).unwrap_err();

    assert!(matches!(err, SimulationError::StateValidation(ref msg) if msg.contains("hash")));
}

#[test]
fn test_population_mismatch_rejected() {
    let mut scheduler = Scheduler::new(config(), tallies).unwrap();
    scheduler.tick().unwrap();
    let snapshot = scheduler.snapshot().unwrap();

    let short = |seed: u64| {
        let mut agents = tallies(seed);
        agents.pop();
        agents
    };
    assert!(matches!(
        Scheduler::restore(config(), short, snapshot.clone()),
        Err(SimulationError::StateValidation(_))
    ));

    struct Impostor;
    impl Behavior for Impostor {
        fn name(&self) -> &str {
            "impostor"
        }
        fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
            Ok(())
        }
    }
    let renamed = |seed: u64| {
        let mut agents = tallies(seed);
        agents[0] = Box::new(Impostor);
        agents
    };
    let err = Scheduler::restore(config(), renamed, snapshot).unwrap_err();
    assert!(err.to_string().contains("impostor"));
}

#[test]
fn test_rejected_agent_state() {
    let scheduler = Scheduler::new(config(), tallies).unwrap();
    let mut snapshot = scheduler.snapshot().unwrap();
    snapshot.agents[1].state = Some(json!({ "unexpected": true }));

    let err = Scheduler::restore(config(), tallies, snapshot).unwrap_err();
    assert!(matches!(err, SimulationError::StateValidation(_)));
}

#[test]
fn test_corrupt_snapshots_fail_validation() {
    let mut scheduler = Scheduler::new(config(), tallies).unwrap();
    scheduler.tick().unwrap();
    let good = scheduler.snapshot().unwrap();

    let mut running = good.clone();
    running.state = SchedulerState::Running;
    assert!(validate_snapshot(&running).is_err());

    let mut unordered = good.clone();
    unordered.agents.swap(0, 1);
    assert!(validate_snapshot(&unordered).is_err());

    let mut unallocated = good.clone();
    unallocated.next_agent_id = AgentId::new(2);
    assert!(validate_snapshot(&unallocated).is_err());

    let mut ahead = good.clone();
    ahead.next_seq = 1;
    assert!(validate_snapshot(&ahead).is_err());

    let mut future_world = good.clone();
    future_world.world_version = 5;
    assert!(validate_snapshot(&future_world).is_err());

    let mut duplicated = good;
    let copy = duplicated.pending_messages[0].clone();
    duplicated.pending_messages.push(copy);
    assert!(matches!(
        Scheduler::restore(config(), tallies, duplicated),
        Err(SimulationError::StateValidation(_))
    ));
}

#[test]
fn test_malformed_json_is_serialization_error() {
    let err = StateSnapshot::from_json("{\"current_tick\": ").unwrap_err();
    assert!(matches!(err, SimulationError::Serialization(_)));
}

#[test]
fn test_halted_snapshot_restores_halted() {
    let mut scheduler = Scheduler::new(config(), tallies).unwrap();
    scheduler.run().unwrap();
    let snapshot = scheduler.snapshot().unwrap();

    let mut restored = Scheduler::restore(config(), tallies, snapshot).unwrap();

    assert_eq!(
        *restored.state(),
        SchedulerState::Halted(HaltReason::MaxTicks)
    );
    assert!(matches!(restored.tick(), Err(SimulationError::Halted(_))));
}

#[test]
fn test_pending_message_to_removed_agent_survives_restore() {
    let mut scheduler = Scheduler::new(config(), tallies).unwrap();
    scheduler.tick().unwrap();
    scheduler
        .post(Recipient::Agent(AgentId::new(2)), Payload::Empty, 2)
        .unwrap();
    scheduler.remove_agent(AgentId::new(2)).unwrap();

    let snapshot = scheduler.snapshot().unwrap();
    let remaining = |seed: u64| {
        let mut agents = tallies(seed);
        agents.remove(1);
        agents
    };

    let mut restored = Scheduler::restore(config(), remaining, snapshot).unwrap();
    assert_eq!(
        restored.agent_ids(),
        vec![AgentId::new(1), AgentId::new(3), AgentId::new(4)]
    );
    let summary = restored.run().unwrap();
    // the posted message, and any later sends to agent 2, abort their ticks
    assert!(summary
        .aborted
        .iter()
        .any(|(_, err)| *err == SimulationError::UnknownAgent(AgentId::new(2))));
}
