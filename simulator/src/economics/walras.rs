//! Walrasian market: a price-setting auctioneer and excess-demand traders.
//!
//! # Protocol
//!
//! ```text
//! tick t     PriceSetter   --Quote (broadcast)-->    traders
//! tick t+1   traders       --DemandSchedule-->       PriceSetter
//! tick t+2   PriceSetter   clears by tatonnement, writes price.<property>,
//!                          --Transfer--> each trader, re-quotes
//! ```
//!
//! The price setter quotes every tick. When no demand schedules arrived it
//! repeats its previous quotes.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::economics::rounding::round_preserving_sum;
use crate::models::agent::{AgentError, AgentId, Behavior};
use crate::models::message::{DemandSchedule, Payload, Quote, Transfer};
use crate::scheduler::effects::StepContext;

/// World key holding the latest clearing price of `property`
pub fn price_key(property: &str) -> String {
    format!("price.{}", property)
}

// ============================================================================
// Tatonnement
// ============================================================================

/// Outcome of clearing one market
#[derive(Debug, Clone, PartialEq)]
pub struct Clearing {
    pub price: f64,
    /// Aggregate excess demand at `price`
    pub excess_demand: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Search parameters for [`tatonnement`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TatonnementParams {
    /// Stop once |aggregate excess demand| is at most this
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Initial price change per unit of excess demand
    #[serde(default = "default_step_size")]
    pub step_size: f64,

    /// Prices never fall below this
    #[serde(default = "default_min_price")]
    pub min_price: f64,
}

fn default_tolerance() -> f64 {
    1e-9
}

fn default_max_iterations() -> usize {
    10_000
}

fn default_step_size() -> f64 {
    0.1
}

fn default_min_price() -> f64 {
    1e-9
}

impl Default for TatonnementParams {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            step_size: default_step_size(),
            min_price: default_min_price(),
        }
    }
}

/// Adjust `start` in proportion to aggregate excess demand until it clears
///
/// The step size halves whenever a move would not reduce the absolute
/// excess demand, so steep aggregate schedules still converge.
///
/// # Example
/// ```
/// use econ_simulator_core_rs::economics::{tatonnement, TatonnementParams};
/// use econ_simulator_core_rs::DemandSchedule;
///
/// let buyer = DemandSchedule { property: "grain".into(), intercept: 10.0, slope: 1.0 };
/// let seller = DemandSchedule { property: "grain".into(), intercept: -2.0, slope: 1.0 };
///
/// let clearing = tatonnement(&[buyer, seller], 1.0, &TatonnementParams::default());
/// assert!(clearing.converged);
/// assert!((clearing.price - 4.0).abs() < 1e-6);
/// ```
pub fn tatonnement(
    schedules: &[DemandSchedule],
    start: f64,
    params: &TatonnementParams,
) -> Clearing {
    let aggregate = |price: f64| -> f64 { schedules.iter().map(|s| s.excess_demand(price)).sum() };

    let mut price = start.max(params.min_price);
    let mut excess = aggregate(price);
    let mut step = params.step_size;
    let mut iterations = 0;

    while iterations < params.max_iterations && excess.abs() > params.tolerance {
        iterations += 1;
        let candidate = (price + step * excess).max(params.min_price);
        if candidate == price {
            // pinned at the price floor with excess supply
            break;
        }
        let candidate_excess = aggregate(candidate);
        if candidate_excess.abs() >= excess.abs() {
            step *= 0.5;
            continue;
        }
        price = candidate;
        excess = candidate_excess;
    }

    Clearing {
        price,
        excess_demand: excess,
        iterations,
        converged: excess.abs() <= params.tolerance,
    }
}

// ============================================================================
// Price Setter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPhase {
    SendingQuotes,
    ClearingMarket,
}

/// Price setter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSetterConfig {
    /// Initial quote for each traded property
    pub quotes: BTreeMap<String, f64>,

    #[serde(default)]
    pub tatonnement: TatonnementParams,

    /// Terminate the simulation after this many clearings
    #[serde(default)]
    pub stop_after: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PriceSetterState {
    phase: MarketPhase,
    quotes: BTreeMap<String, f64>,
    clearings: u64,
}

/// Walrasian auctioneer
#[derive(Debug)]
pub struct PriceSetter {
    config: PriceSetterConfig,
    phase: MarketPhase,
    quotes: BTreeMap<String, f64>,
    clearings: u64,
}

impl PriceSetter {
    pub fn new(config: PriceSetterConfig) -> Self {
        Self {
            quotes: config.quotes.clone(),
            config,
            phase: MarketPhase::SendingQuotes,
            clearings: 0,
        }
    }

    pub fn phase(&self) -> MarketPhase {
        self.phase
    }

    /// Current quote per property
    pub fn quotes(&self) -> &BTreeMap<String, f64> {
        &self.quotes
    }

    /// Number of ticks in which at least one market cleared
    pub fn clearings(&self) -> u64 {
        self.clearings
    }

    fn broadcast_quotes(&self, ctx: &mut StepContext<'_>) {
        for (property, price) in &self.quotes {
            ctx.broadcast(Payload::Quote(Quote {
                property: property.clone(),
                price: *price,
            }));
        }
    }

    /// Latest schedule per (property, trader) in this inbox
    fn collect_orders(
        &self,
        ctx: &StepContext<'_>,
    ) -> Result<BTreeMap<String, BTreeMap<AgentId, DemandSchedule>>, AgentError> {
        let mut orders: BTreeMap<String, BTreeMap<AgentId, DemandSchedule>> = BTreeMap::new();
        for message in ctx.inbox() {
            match message.payload() {
                Payload::Demand(schedule) if self.quotes.contains_key(&schedule.property) => {
                    orders
                        .entry(schedule.property.clone())
                        .or_default()
                        .insert(message.sender(), schedule.clone());
                }
                Payload::Demand(schedule) => {
                    return Err(AgentError::Failed(format!(
                        "demand for untraded property '{}' from {}",
                        schedule.property,
                        message.sender()
                    )));
                }
                Payload::Quote(_) => {}
                other => {
                    return Err(AgentError::UnexpectedPayload {
                        kind: other.kind(),
                        sender: message.sender(),
                    })
                }
            }
        }
        Ok(orders)
    }

    fn clear(
        &mut self,
        ctx: &mut StepContext<'_>,
        property: &str,
        orders: &BTreeMap<AgentId, DemandSchedule>,
    ) {
        let start = self.quotes.get(property).copied().unwrap_or(1.0);
        let schedules: Vec<DemandSchedule> = orders.values().cloned().collect();
        let clearing = tatonnement(&schedules, start, &self.config.tatonnement);
        debug!(
            "{} cleared at {:.6} after {} iterations (excess {:.3e})",
            property, clearing.price, clearing.iterations, clearing.excess_demand
        );

        let demands: Vec<f64> = schedules.iter().map(|s| s.excess_demand(clearing.price)).collect();
        let quantities = round_preserving_sum(&demands);
        for (trader, quantity) in orders.keys().zip(quantities) {
            if quantity != 0 {
                ctx.send(
                    *trader,
                    Payload::Transfer(Transfer {
                        property: property.to_string(),
                        quantity,
                        price: clearing.price,
                    }),
                );
            }
        }

        ctx.write(price_key(property), clearing.price);
        self.quotes.insert(property.to_string(), clearing.price);
    }
}

impl Behavior for PriceSetter {
    fn name(&self) -> &str {
        "price_setter"
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
        match self.phase {
            MarketPhase::SendingQuotes => {
                self.phase = MarketPhase::ClearingMarket;
            }
            MarketPhase::ClearingMarket => {
                let orders = self.collect_orders(ctx)?;
                if !orders.is_empty() {
                    for (property, book) in &orders {
                        self.clear(ctx, property, book);
                    }
                    self.clearings += 1;
                    if self.config.stop_after.map_or(false, |n| self.clearings >= n) {
                        ctx.terminate(format!("market cleared {} times", self.clearings));
                    }
                }
            }
        }
        self.broadcast_quotes(ctx);
        Ok(())
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(PriceSetterState {
            phase: self.phase,
            quotes: self.quotes.clone(),
            clearings: self.clearings,
        })
        .ok()
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<(), AgentError> {
        let state: PriceSetterState =
            serde_json::from_value(state).map_err(|e| AgentError::InvalidState(e.to_string()))?;
        self.phase = state.phase;
        self.quotes = state.quotes;
        self.clearings = state.clearings;
        Ok(())
    }
}

// ============================================================================
// Excess Demand Trader
// ============================================================================

/// Linear demand for one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandParams {
    pub intercept: f64,
    pub slope: f64,
}

/// Trader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderConfig {
    /// Demand per property the trader participates in
    pub demand: BTreeMap<String, DemandParams>,

    /// Relative size of the uniform taste shock applied to intercepts
    #[serde(default)]
    pub taste_shock: f64,

    #[serde(default)]
    pub holdings: BTreeMap<String, i64>,

    #[serde(default)]
    pub cash: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TraderState {
    holdings: BTreeMap<String, i64>,
    cash: f64,
}

/// Trader answering quotes with linear excess-demand schedules
#[derive(Debug)]
pub struct ExcessDemandTrader {
    config: TraderConfig,
    holdings: BTreeMap<String, i64>,
    cash: f64,
}

impl ExcessDemandTrader {
    pub fn new(config: TraderConfig) -> Self {
        Self {
            holdings: config.holdings.clone(),
            cash: config.cash,
            config,
        }
    }

    pub fn holdings(&self) -> &BTreeMap<String, i64> {
        &self.holdings
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }
}

impl Behavior for ExcessDemandTrader {
    fn name(&self) -> &str {
        "excess_demand_trader"
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), AgentError> {
        // latest quoting agent per property
        let mut quoted: BTreeMap<&str, AgentId> = BTreeMap::new();

        for message in ctx.inbox() {
            match message.payload() {
                Payload::Quote(quote) => {
                    if self.config.demand.contains_key(&quote.property) {
                        quoted.insert(quote.property.as_str(), message.sender());
                    }
                }
                Payload::Transfer(transfer) => {
                    let held = self.holdings.entry(transfer.property.clone()).or_insert(0);
                    *held += transfer.quantity;
                    self.cash -= transfer.quantity as f64 * transfer.price;
                }
                other => {
                    return Err(AgentError::UnexpectedPayload {
                        kind: other.kind(),
                        sender: message.sender(),
                    })
                }
            }
        }

        for (property, setter) in quoted {
            let Some(params) = self.config.demand.get(property) else {
                continue;
            };
            let shock = 1.0 + self.config.taste_shock * (2.0 * ctx.rng().next_f64() - 1.0);
            ctx.send(
                setter,
                Payload::Demand(DemandSchedule {
                    property: property.to_string(),
                    intercept: params.intercept * shock,
                    slope: params.slope,
                }),
            );
        }
        Ok(())
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(TraderState {
            holdings: self.holdings.clone(),
            cash: self.cash,
        })
        .ok()
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<(), AgentError> {
        let state: TraderState =
            serde_json::from_value(state).map_err(|e| AgentError::InvalidState(e.to_string()))?;
        self.holdings = state.holdings;
        self.cash = state.cash;
        Ok(())
    }
}
