// 1.0: all the primitives live here. nothing in the engine works without these types.
// amounts, prices, leverage, fractions, time. each is a newtype so the compiler catches
// type mixups, and every fixed point scale (1e9 leverage, 1e18 wad, 1e4 bps, asset
// decimals) is converted here and nowhere else.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 1.0x leverage in raw units.
pub const LEVERAGE_SCALE: u64 = 1_000_000_000;
/// 1.0 in wad units.
pub const WAD: u128 = 1_000_000_000_000_000_000;
pub const BPS_SCALE: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:040x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub id: AssetId,
    pub symbol: String,
    pub decimals: u32,
}

impl AssetInfo {
    pub fn new(id: AssetId, symbol: &str, decimals: u32) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            decimals,
        }
    }

    /// Smallest representable amount of this asset.
    pub fn unit(&self) -> Amount {
        Amount(Decimal::new(1, self.decimals))
    }
}

// 1.1: token amount. never negative, subtraction saturates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Self {
        Self(value.max(Decimal::ZERO))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, other: Amount) -> Self {
        Self(self.0 + other.0)
    }

    pub fn saturating_sub(&self, other: Amount) -> Self {
        Self((self.0 - other.0).max(Decimal::ZERO))
    }

    pub fn mul(&self, factor: Decimal) -> Self {
        Self::new(self.0 * factor)
    }

    pub fn min(self, other: Amount) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Truncates toward zero to `decimals` places.
    pub fn round_to(&self, decimals: u32) -> Self {
        Self(self.0.round_dp_with_strategy(decimals, RoundingStrategy::ToZero))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// 1.2: debt asset units per one collateral unit. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Collateral amount expressed in debt units, truncated to the debt asset.
    pub fn collateral_to_debt(&self, amount: Amount, debt: &AssetInfo) -> Amount {
        Amount::new(amount.value() * self.0).round_to(debt.decimals)
    }

    /// Debt amount expressed in collateral units, truncated to the collateral asset.
    pub fn debt_to_collateral(&self, amount: Amount, collateral: &AssetInfo) -> Amount {
        Amount::new(amount.value() / self.0).round_to(collateral.decimals)
    }

    /// Relative distance `|self - reference| / reference`.
    pub fn deviation_from(&self, reference: Price) -> Decimal {
        ((self.0 - reference.0) / reference.0).abs()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// 1.3: leverage multiplier. >= 1x. MAX stands in for infinite leverage (zero equity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Leverage(Decimal);

impl Leverage {
    pub const ONE: Leverage = Leverage(Decimal::ONE);
    pub const MAX: Leverage = Leverage(Decimal::MAX);

    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ONE {
            Some(Self(value))
        } else {
            None
        }
    }

    /// From raw units where 1.0x = 1e9. None below 1x.
    pub fn from_raw(raw: u64) -> Option<Self> {
        Self::new(Decimal::from(raw) / Decimal::from(LEVERAGE_SCALE))
    }

    pub fn to_raw(&self) -> u64 {
        self.0
            .checked_mul(Decimal::from(LEVERAGE_SCALE))
            .and_then(|v| v.trunc().to_u64())
            .unwrap_or(u64::MAX)
    }

    /// 1e18 fixed point, saturating at `u128::MAX` for unbounded leverage.
    pub fn to_wad(&self) -> u128 {
        self.0
            .checked_mul(Decimal::from(WAD))
            .and_then(|v| v.trunc().to_u128())
            .unwrap_or(u128::MAX)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_unbounded(&self) -> bool {
        self.0 == Decimal::MAX
    }

    /// Clamped to 1x so rounding noise never yields an invalid ratio.
    pub fn saturating(value: Decimal) -> Self {
        Self(value.max(Decimal::ONE))
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "infx")
        } else {
            write!(f, "{}x", self.0.round_dp(4).normalize())
        }
    }
}

// 1.4: fraction in [0, 1]. LTV, recenter speed, per block accrual, breaker threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fraction(Decimal);

impl Fraction {
    pub const ZERO: Fraction = Fraction(Decimal::ZERO);
    pub const ONE: Fraction = Fraction(Decimal::ONE);

    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO && value <= Decimal::ONE {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value >= Decimal::ZERO && value <= Decimal::ONE);
        Self(value)
    }

    /// From 1e18 fixed point. None above 1.0.
    #[must_use]
    pub fn from_wad(wad: u128) -> Option<Self> {
        if wad > WAD {
            return None;
        }
        let value = Decimal::try_from_i128_with_scale(wad as i128, 18).ok()?;
        Some(Self(value))
    }

    pub fn to_wad(&self) -> u128 {
        (self.0 * Decimal::from(WAD)).trunc().to_u128().unwrap_or(0)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// `1 - self`.
    pub fn complement(&self) -> Decimal {
        Decimal::ONE - self.0
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * dec!(100)).normalize())
    }
}

// 1.5: basis points. 100 bps = 1%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bps(u32);

impl Bps {
    pub fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(BPS_SCALE)
    }

    pub fn doubled(&self) -> Self {
        Self(self.0.saturating_mul(2))
    }

    /// `amount × (1 - bps)`, zero once the haircut reaches 100%.
    pub fn haircut(&self, amount: Amount) -> Amount {
        amount.mul((Decimal::ONE - self.as_fraction()).max(Decimal::ZERO))
    }
}

// 1.6: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add((secs as i64).saturating_mul(1000)))
    }

    /// Whole seconds from `earlier` to `self`, zero if `earlier` is in the future.
    pub fn secs_since(&self, earlier: Timestamp) -> u64 {
        ((self.0 - earlier.0).max(0) / 1000) as u64
    }

    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

impl BlockNumber {
    pub fn blocks_since(&self, earlier: BlockNumber) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

// 1.7: block height plus wall time. everything time dependent reads one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Clock {
    pub block: BlockNumber,
    pub time: Timestamp,
}

impl Clock {
    pub fn new(block: u64, time: Timestamp) -> Self {
        Self {
            block: BlockNumber(block),
            time,
        }
    }

    pub fn advance(&mut self, blocks: u64, secs: u64) {
        self.block = BlockNumber(self.block.0 + blocks);
        self.time = self.time.plus_secs(secs);
    }
}
