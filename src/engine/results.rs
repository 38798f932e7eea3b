// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::lending::LendingError;
use crate::oracle::OracleError;
use crate::swap::{OrderId, PendingSwap, SwapDirection, VenueError};
use crate::types::{Address, Amount, AssetId, Fraction, Leverage};
use serde::{Deserialize, Serialize};

/// What the position needs next. Evaluated fresh on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceAction {
    None,
    Rebalance,
    Iterate,
    Ripcord,
}

/// Why a trade was not issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ZeroNotional,
    NoBorrowCapacity,
    /// The market releases no collateral while the debt is outstanding.
    NoWithdrawCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeOutcome {
    Requested {
        swap: PendingSwap,
        min_out: Amount,
        /// Notional was cut to the per-trade cap.
        capped: bool,
        /// Borrow was cut by live capacity or the projected leverage bound, or the
        /// withdrawal by the market's headroom.
        capacity_limited: bool,
    },
    Skipped(SkipReason),
}

impl TradeOutcome {
    pub fn swap(&self) -> Option<&PendingSwap> {
        match self {
            TradeOutcome::Requested { swap, .. } => Some(swap),
            TradeOutcome::Skipped(_) => None,
        }
    }

    pub fn is_requested(&self) -> bool {
        matches!(self, TradeOutcome::Requested { .. })
    }

    /// Input amount handed to the venue, zero when skipped.
    pub fn amount_in(&self) -> Amount {
        self.swap().map(|s| s.amount).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct EngageResult {
    pub collateral: Amount,
    pub target: Leverage,
    pub trade: TradeOutcome,
}

#[derive(Debug, Clone)]
pub struct RebalanceResult {
    pub leverage_before: Leverage,
    /// Leverage this call trades toward.
    pub toward: Leverage,
    pub trade: TradeOutcome,
    pub twap_cleared: bool,
}

#[derive(Debug, Clone)]
pub struct RipcordResult {
    pub leverage_before: Leverage,
    pub trade: TradeOutcome,
    pub reward: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteResult {
    pub order_id: OrderId,
    pub direction: SwapDirection,
    pub amount_out: Amount,
    pub surplus: Amount,
    pub leverage_after: Leverage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelResult {
    pub order_id: OrderId,
    pub direction: SwapDirection,
    pub stranded_asset: AssetId,
    pub stranded_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    // authorization
    #[error("Caller {0} is not on the allow-list")]
    NotAllowedCaller(Address),

    #[error("Operator capability belongs to another engine")]
    NotOperator,

    #[error("Owner capability belongs to another engine")]
    NotOwner,

    #[error("Caller {0} is not the vault adapter")]
    NotAdapter(Address),

    #[error("Caller {0} must call directly, not through a contract")]
    NotDirectCall(Address),

    // state conflict
    #[error("A swap is already pending")]
    SwapPending,

    #[error("No swap is pending")]
    SwapNotPending,

    #[error("Swap pending for {elapsed_secs}s, timeout is {timeout_secs}s")]
    SwapNotTimedOut { elapsed_secs: u64, timeout_secs: u64 },

    #[error("Pending swap has not been settled")]
    SwapNotSettled,

    #[error("Position already engaged at {0}")]
    AlreadyEngaged(Leverage),

    #[error("No collateral to engage")]
    NotEngaged,

    #[error("No multi step sequence in progress")]
    TwapNotActive,

    #[error("Reentrant call rejected")]
    Reentrancy,

    // risk bounds
    #[error("Leverage {leverage} at or above {bound}")]
    LeverageTooHigh { leverage: Leverage, bound: Leverage },

    #[error("Leverage {leverage} below {bound}")]
    LeverageTooLow { leverage: Leverage, bound: Leverage },

    #[error("Target {target} not supported by LTV {ltv}")]
    LeverageExceedsLTVLimit { target: Leverage, ltv: Fraction },

    // timing
    #[error("Rebalance not due yet")]
    RebalanceIntervalNotElapsed,

    // availability
    #[error("Strategy is not active")]
    StrategyNotActive,

    #[error("Reward balance {balance} cannot pay {reward}")]
    InsufficientEtherReward { balance: Amount, reward: Amount },

    #[error("Requested {requested}, only {available} available")]
    InsufficientAssets { requested: Amount, available: Amount },

    // settlement integrity
    #[error("Swap output {received} below expected {expected}")]
    SwapOutputTooLow { received: Amount, expected: Amount },

    // collaborators
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Lending market error: {0}")]
    Lending(#[from] LendingError),

    #[error("Swap venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Stale oracle, the only oracle health failure that is not a tripped breaker.
    pub fn is_oracle_stale(&self) -> bool {
        matches!(self, EngineError::Oracle(OracleError::Stale { .. }))
    }
}

