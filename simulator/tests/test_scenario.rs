//! Scenario loading and end-to-end runs
//!
//! Tests cover:
//! - Loading a JSON scenario and running it to completion
//! - Validation of malformed scenarios
//! - Resuming a scenario from a JSON checkpoint

use econ_simulator_core_rs::{
    AgentSpec, Scenario, Scheduler, SimulationError, StateSnapshot,
};

const GRAIN_MARKET: &str = include_str!("fixtures/grain_market.json");

fn prices(scheduler: &Scheduler, key: &str) -> Vec<f64> {
    scheduler
        .outputs()
        .series(key)
        .iter()
        .map(|(_, value)| value.as_f64().unwrap())
        .collect()
}

fn invalid(json: &str) -> String {
    match Scenario::from_json(json) {
        Err(SimulationError::InvalidConfig(msg)) => msg,
        other => panic!("expected InvalidConfig, got {:?}", other.map(|s| s.agents.len())),
    }
}

#[test]
fn test_fixture_loads_with_defaults() {
    let scenario = Scenario::from_json(GRAIN_MARKET).unwrap();

    assert_eq!(scenario.agents.len(), 4);
    assert_eq!(scenario.config.max_cascade_depth, 16);
    match &scenario.agents[0] {
        AgentSpec::PriceSetter(config) => {
            assert_eq!(config.tatonnement.step_size, 0.05);
            assert_eq!(config.tatonnement.max_iterations, 10_000);
            assert_eq!(config.stop_after, None);
        }
        other => panic!("expected price setter, got {:?}", other),
    }
    match &scenario.agents[3] {
        AgentSpec::Trader(config) => {
            assert_eq!(config.taste_shock, 0.0);
            assert_eq!(config.cash, 0.0);
        }
        other => panic!("expected trader, got {:?}", other),
    }
}

#[test]
fn test_fixture_runs_two_markets() {
    let _ = env_logger::try_init();
    let mut scheduler = Scenario::from_json(GRAIN_MARKET).unwrap().build().unwrap();

    let summary = scheduler.run().unwrap();
    assert!(summary.aborted.is_empty());
    assert_eq!(summary.completed, 30);

    // unshocked equilibria: grain 16 - 3p = 0, wool 7 - 2p = 0
    let grain = prices(&scheduler, "price.grain");
    let wool = prices(&scheduler, "price.wool");
    assert_eq!(grain.len(), 28);
    assert_eq!(wool.len(), 28);
    for price in &grain {
        assert!(*price > 4.0 && *price < 6.7, "grain price {}", price);
    }
    for price in &wool {
        assert!(*price > 2.5 && *price < 4.5, "wool price {}", price);
    }
}

#[test]
fn test_json_round_trip() {
    let scenario = Scenario::from_json(GRAIN_MARKET).unwrap();
    let json = scenario.to_json().unwrap();

    assert_eq!(Scenario::from_json(&json).unwrap(), scenario);
}

#[test]
fn test_same_scenario_same_prices() {
    let scenario = Scenario::from_json(GRAIN_MARKET).unwrap();
    let mut a = scenario.build().unwrap();
    let mut b = scenario.build().unwrap();
    a.run().unwrap();
    b.run().unwrap();

    assert_eq!(prices(&a, "price.grain"), prices(&b, "price.grain"));
    assert_eq!(a.event_log().message_trace(), b.event_log().message_trace());
}

#[test]
fn test_scenario_as_factory() {
    let scenario = Scenario::from_json(GRAIN_MARKET).unwrap();
    let scheduler = Scheduler::new(scenario.config.clone(), scenario.clone()).unwrap();

    assert_eq!(scheduler.agent_ids().len(), 4);
}

#[test]
fn test_restore_from_checkpoint() {
    let scenario = Scenario::from_json(GRAIN_MARKET).unwrap();
    let mut reference = scenario.build().unwrap();
    reference.run().unwrap();

    let mut first = scenario.build().unwrap();
    for _ in 0..12 {
        first.tick().unwrap();
    }
    let json = first.snapshot().unwrap().to_json().unwrap();

    let mut resumed = scenario.restore(StateSnapshot::from_json(&json).unwrap()).unwrap();
    let summary = resumed.run().unwrap();
    assert_eq!(summary.completed, 18);

    let expected = prices(&reference, "price.grain");
    let actual = prices(&resumed, "price.grain");
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(&expected) {
        assert!((a - e).abs() < 1e-6, "{} vs {}", a, e);
    }
}

#[test]
fn test_invalid_scenarios() {
    let msg = invalid(r#"{"agents": []}"#);
    assert!(msg.contains("Malformed scenario"));

    let msg = invalid(r#"{"config": {"max_ticks": 0, "seed": 1}, "agents": []}"#);
    assert!(msg.contains("max_ticks"));

    let msg = invalid(
        r#"{"config": {"max_ticks": 5, "seed": 1},
            "agents": [
                {"kind": "trader", "demand": {"grain": {"intercept": 1.0, "slope": -1.0}}}
            ]}"#,
    );
    assert!(msg.contains("agent 0"));

    let msg = invalid(
        r#"{"config": {"max_ticks": 5, "seed": 1},
            "agents": [
                {"kind": "price_setter", "quotes": {"grain": 1.0}},
                {"kind": "trader",
                 "demand": {"grain": {"intercept": 1.0, "slope": 1.0}},
                 "taste_shock": 1.5}
            ]}"#,
    );
    assert!(msg.contains("agent 1") && msg.contains("taste_shock"));

    let msg = invalid(
        r#"{"config": {"max_ticks": 5, "seed": 1},
            "agents": [{"kind": "price_setter", "quotes": {"grain": 1.0}, "stop_after": 0}]}"#,
    );
    assert!(msg.contains("stop_after"));
}
