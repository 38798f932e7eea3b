// 7.0 config.rs: all strategy settings in one place. leverage bands, trade sizing,
// emergency incentive, oracle smoothing, price check. immutable once an engine is built.
// 7.1 presets and JSON loading. validate() runs on every load.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::oracle::OracleParams;
use crate::swap::PriceCheckerParams;
use crate::types::{Address, Amount, AssetId, AssetInfo, Bps, Fraction, Leverage};

// Leverage bands. invariant: 1x <= min < target < max < ripcord
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageParams {
    pub target: Leverage,
    pub min: Leverage,
    pub max: Leverage,
    // At or above this anyone may pull the ripcord
    pub ripcord: Leverage,
}

impl LeverageParams {
    /// From raw 1e9 units. Anything below 1x is rejected, not clamped.
    pub fn from_raw(target: u64, min: u64, max: u64, ripcord: u64) -> Result<Self, ConfigError> {
        let parse = |raw: u64, name: &str| {
            Leverage::from_raw(raw).ok_or_else(|| ConfigError::InvalidLeverage {
                reason: format!("{name} leverage {raw} below 1x"),
            })
        };
        Ok(Self {
            target: parse(target, "Target")?,
            min: parse(min, "Min")?,
            max: parse(max, "Max")?,
            ripcord: parse(ripcord, "Ripcord")?,
        })
    }

    fn preset(target: Decimal, min: Decimal, max: Decimal, ripcord: Decimal) -> Self {
        Self {
            target: Leverage::saturating(target),
            min: Leverage::saturating(min),
            max: Leverage::saturating(max),
            ripcord: Leverage::saturating(ripcord),
        }
    }
}

impl Default for LeverageParams {
    fn default() -> Self {
        Self::preset(dec!(2), dec!(1.7), dec!(2.3), dec!(2.5))
    }
}

// How ordinary rebalances trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
    // Largest single trade, in collateral units
    pub max_trade_size: Amount,
    // Minimum gap between steps of a multi step sequence
    pub twap_cooldown_secs: u64,
    pub slippage: Bps,
    // Minimum gap between timed rebalances inside the band
    pub rebalance_interval_secs: u64,
    // Share of the gap to target closed by one rebalance
    pub recenter_speed: Fraction,
    // Relative deviation from target below which a timed rebalance is skipped
    pub dead_band: Bps,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            max_trade_size: Amount::new(dec!(10)),
            twap_cooldown_secs: 60,
            slippage: Bps::new(50), // 0.5%
            rebalance_interval_secs: 86_400,
            recenter_speed: Fraction::new_unchecked(dec!(0.5)),
            dead_band: Bps::new(100), // 1%
        }
    }
}

/** 7.2: emergency path. wider slippage, own cap and cooldown, fixed reward per call */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncentiveParams {
    pub slippage: Bps,
    pub twap_cooldown_secs: u64,
    // Largest single ripcord trade, in collateral units
    pub max_trade: Amount,
    // Native token paid to whoever pulls the ripcord
    pub ether_reward: Amount,
}

impl Default for IncentiveParams {
    fn default() -> Self {
        Self {
            slippage: Bps::new(200), // 2%
            twap_cooldown_secs: 30,
            max_trade: Amount::new(dec!(5)),
            ether_reward: Amount::new(dec!(1)),
        }
    }
}

// Complete strategy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    // Human readable strategy name
    pub name: String,
    // Address the position is held under at the lending market
    pub account: Address,
    // Vault adapter allowed to deposit and withdraw
    pub adapter: Address,
    pub collateral: AssetInfo,
    pub debt: AssetInfo,
    pub leverage: LeverageParams,
    pub execution: ExecutionParams,
    pub incentive: IncentiveParams,
    pub oracle: OracleParams,
    pub checker: PriceCheckerParams,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::eth_usdc()
    }
}

impl StrategyConfig {
    // 2x WETH against USDC debt
    pub fn eth_usdc() -> Self {
        Self {
            name: "ETH 2x".to_string(),
            account: Address(100),
            adapter: Address(200),
            collateral: AssetInfo::new(AssetId(1), "WETH", 18),
            debt: AssetInfo::new(AssetId(2), "USDC", 6),
            leverage: LeverageParams::default(),
            execution: ExecutionParams::default(),
            incentive: IncentiveParams::default(),
            oracle: OracleParams::default(),
            checker: PriceCheckerParams::default(),
        }
    }

    // Lower target, narrower trades, slower recentering
    pub fn conservative() -> Self {
        let mut config = Self::eth_usdc();
        config.name = "ETH 1.5x".to_string();
        config.leverage = LeverageParams::preset(dec!(1.5), dec!(1.3), dec!(1.7), dec!(1.9));
        config.execution.max_trade_size = Amount::new(dec!(5));
        config.execution.slippage = Bps::new(30);
        config.execution.recenter_speed = Fraction::new_unchecked(dec!(0.25));
        config
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lev = &self.leverage;
        if lev.min < Leverage::ONE {
            return Err(ConfigError::InvalidLeverage {
                reason: "Min leverage below 1x".to_string(),
            });
        }
        if !(lev.min < lev.target && lev.target < lev.max && lev.max < lev.ripcord) {
            return Err(ConfigError::InvalidLeverage {
                reason: "Need min < target < max < ripcord".to_string(),
            });
        }

        let exec = &self.execution;
        if exec.max_trade_size.is_zero() {
            return Err(ConfigError::InvalidExecution {
                reason: "Max trade size must be positive".to_string(),
            });
        }
        // doubled slippage must leave a positive settlement floor
        if exec.slippage.doubled().as_fraction() >= Decimal::ONE {
            return Err(ConfigError::InvalidExecution {
                reason: "Slippage too high (>=50%)".to_string(),
            });
        }
        if exec.recenter_speed.value().is_zero() {
            return Err(ConfigError::InvalidExecution {
                reason: "Recenter speed must be in (0, 1]".to_string(),
            });
        }

        let inc = &self.incentive;
        if inc.max_trade.is_zero() {
            return Err(ConfigError::InvalidIncentive {
                reason: "Incentive max trade must be positive".to_string(),
            });
        }
        if inc.slippage.doubled().as_fraction() >= Decimal::ONE {
            return Err(ConfigError::InvalidIncentive {
                reason: "Incentive slippage too high (>=50%)".to_string(),
            });
        }

        let oracle = &self.oracle;
        if oracle.accrual_rate_per_block.value().is_zero() || oracle.accrual_rate_per_block == Fraction::ONE {
            return Err(ConfigError::InvalidOracle {
                reason: "Accrual rate must be in (0, 1)".to_string(),
            });
        }
        if oracle.max_staleness_secs == 0 {
            return Err(ConfigError::InvalidOracle {
                reason: "Max staleness must be positive".to_string(),
            });
        }

        if self.collateral.id == self.debt.id {
            return Err(ConfigError::InvalidAssets {
                reason: "Collateral and debt must differ".to_string(),
            });
        }
        if self.collateral.decimals > 18 || self.debt.decimals > 18 {
            return Err(ConfigError::InvalidAssets {
                reason: "More than 18 decimals not supported".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid leverage params: {reason}")]
    InvalidLeverage { reason: String },
    #[error("Invalid execution params: {reason}")]
    InvalidExecution { reason: String },
    #[error("Invalid incentive params: {reason}")]
    InvalidIncentive { reason: String },
    #[error("Invalid oracle params: {reason}")]
    InvalidOracle { reason: String },
    #[error("Invalid assets: {reason}")]
    InvalidAssets { reason: String },
    #[error("Config parse error: {0}")]
    Parse(String),
}
