//! Economics library built on the scheduler
//!
//! - `rounding`: integer allocation that preserves totals
//! - `walras`: tatonnement market with a price setter and traders

pub mod rounding;
pub mod walras;

pub use rounding::round_preserving_sum;
pub use walras::{
    price_key, tatonnement, Clearing, DemandParams, ExcessDemandTrader, MarketPhase, PriceSetter,
    PriceSetterConfig, TatonnementParams, TraderConfig,
};
