//! Declarative scenarios
//!
//! A scenario is a [`SimulationConfig`] plus the agents to register, in
//! order, described as data. It loads from JSON:
//!
//! ```json
//! {
//!   "config": { "max_ticks": 20, "seed": 7, "observed_keys": ["price.grain"] },
//!   "agents": [
//!     { "kind": "price_setter", "quotes": { "grain": 1.0 } },
//!     { "kind": "trader", "demand": { "grain": { "intercept": 10.0, "slope": 1.0 } } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::core::error::SimulationError;
use crate::economics::walras::{ExcessDemandTrader, PriceSetter, PriceSetterConfig, TraderConfig};
use crate::models::agent::Behavior;
use crate::scheduler::checkpoint::StateSnapshot;
use crate::scheduler::config::{AgentFactory, SimulationConfig};
use crate::scheduler::engine::Scheduler;

/// One agent of a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentSpec {
    PriceSetter(PriceSetterConfig),
    Trader(TraderConfig),
}

impl AgentSpec {
    pub fn build(&self) -> Box<dyn Behavior> {
        match self {
            AgentSpec::PriceSetter(config) => Box::new(PriceSetter::new(config.clone())),
            AgentSpec::Trader(config) => Box::new(ExcessDemandTrader::new(config.clone())),
        }
    }

    fn validate(&self, index: usize) -> Result<(), SimulationError> {
        let invalid = |msg: String| {
            Err(SimulationError::InvalidConfig(format!("agent {}: {}", index, msg)))
        };

        match self {
            AgentSpec::PriceSetter(config) => {
                if config.quotes.is_empty() {
                    return invalid("price setter must quote at least one property".to_string());
                }
                if let Some((property, price)) =
                    config.quotes.iter().find(|(_, p)| !(p.is_finite() && **p > 0.0))
                {
                    return invalid(format!(
                        "quote for '{}' must be positive, got {}",
                        property, price
                    ));
                }
                let params = &config.tatonnement;
                if !(params.step_size > 0.0 && params.tolerance > 0.0 && params.min_price > 0.0) {
                    return invalid("tatonnement parameters must be positive".to_string());
                }
                if config.stop_after == Some(0) {
                    return invalid("stop_after must be > 0".to_string());
                }
            }
            AgentSpec::Trader(config) => {
                if config.demand.is_empty() {
                    return invalid("trader must demand at least one property".to_string());
                }
                if let Some((property, _)) = config.demand.iter().find(|(_, d)| {
                    !(d.intercept.is_finite() && d.slope.is_finite() && d.slope >= 0.0)
                }) {
                    return invalid(format!(
                        "demand for '{}' must have a finite, non-negative slope",
                        property
                    ));
                }
                if !(0.0..1.0).contains(&config.taste_shock) {
                    return invalid(format!(
                        "taste_shock must be in [0, 1), got {}",
                        config.taste_shock
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Config plus initial population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub config: SimulationConfig,
    pub agents: Vec<AgentSpec>,
}

impl Scenario {
    /// Parse and validate a JSON scenario
    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        let scenario: Scenario = serde_json::from_str(json)
            .map_err(|e| SimulationError::InvalidConfig(format!("Malformed scenario: {}", e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn to_json(&self) -> Result<String, SimulationError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            SimulationError::Serialization(format!("Scenario serialization failed: {}", e))
        })
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        self.config.validate()?;
        for (index, spec) in self.agents.iter().enumerate() {
            spec.validate(index)?;
        }
        Ok(())
    }

    /// Behaviors in registration order
    pub fn behaviors(&self) -> Vec<Box<dyn Behavior>> {
        self.agents.iter().map(AgentSpec::build).collect()
    }

    /// Fresh scheduler at tick 0
    pub fn build(&self) -> Result<Scheduler, SimulationError> {
        self.validate()?;
        Scheduler::new(self.config.clone(), |_seed: u64| self.behaviors())
    }

    /// Scheduler resumed from a snapshot taken of this scenario
    ///
    /// Only valid while the population still matches the scenario's agent
    /// list (no agents added or removed since tick 0).
    pub fn restore(&self, snapshot: StateSnapshot) -> Result<Scheduler, SimulationError> {
        self.validate()?;
        Scheduler::restore(self.config.clone(), |_seed: u64| self.behaviors(), snapshot)
    }
}

impl AgentFactory for Scenario {
    fn create_agents(&mut self, _seed: u64) -> Vec<Box<dyn Behavior>> {
        self.behaviors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKET: &str = r#"{
        "config": { "max_ticks": 6, "seed": 3 },
        "agents": [
            { "kind": "price_setter", "quotes": { "grain": 2.0 } },
            { "kind": "trader", "demand": { "grain": { "intercept": 6.0, "slope": 1.0 } } },
            {
                "kind": "trader",
                "demand": { "grain": { "intercept": -2.0, "slope": 1.0 } },
                "holdings": { "grain": 50 }
            }
        ]
    }"#;

    #[test]
    fn test_scenario_parses_tagged_agents() {
        let scenario = Scenario::from_json(MARKET).unwrap();

        assert_eq!(scenario.agents.len(), 3);
        assert!(matches!(scenario.agents[0], AgentSpec::PriceSetter(_)));
        match &scenario.agents[2] {
            AgentSpec::Trader(config) => assert_eq!(config.holdings.get("grain"), Some(&50)),
            other => panic!("expected trader, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_invalid_config() {
        let err = Scenario::from_json(
            r#"{"config": {"max_ticks": 1, "seed": 1}, "agents": [{"kind": "oracle"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
    }

    #[test]
    fn test_negative_quote_rejected() {
        let err = Scenario::from_json(
            r#"{"config": {"max_ticks": 1, "seed": 1},
                "agents": [{"kind": "price_setter", "quotes": {"grain": -1.0}}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("agent 0"));
    }

    #[test]
    fn test_build_registers_in_order() {
        let scheduler = Scenario::from_json(MARKET).unwrap().build().unwrap();
        let names: Vec<&str> = scheduler.registry().all().map(|a| a.name()).collect();

        assert_eq!(
            names,
            vec!["price_setter", "excess_demand_trader", "excess_demand_trader"]
        );
    }
}
