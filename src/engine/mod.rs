// 8.0: leverage engine. keeps the position near its target leverage through bounded
// trades on an asynchronous venue, with an emergency unwind above the ripcord threshold.
// deterministic and single threaded; every entry point is all-or-nothing.

mod admin;
mod config;
mod core;
mod orders;
mod positions;
mod pricing;
mod rebalance;
mod results;
mod settlement;

pub use config::EngineConfig;
pub use core::{Engine, Externals};
pub use rebalance::recenter;
pub use results::{
    CancelResult, CompleteResult, EngageResult, EngineError, RebalanceAction, RebalanceResult, RipcordResult,
    SkipReason, TradeOutcome,
};
