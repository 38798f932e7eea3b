// 2.0: the position is never stored. it is read from the lending market on demand and
// converted into collateral units through the smoothed price. all leverage math lives here.

use crate::types::{Amount, AssetInfo, Fraction, Leverage, Price};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Haircut applied to the theoretical max leverage and to live borrow capacity.
pub const SAFETY_MARGIN: Decimal = dec!(0.95);

/// Leverage at or below `1 + tolerance` counts as unlevered.
pub const UNLEVERED_TOLERANCE: Decimal = dec!(0.01);

/// `collateral / (collateral - debt)`, both in collateral units.
pub fn leverage_ratio(collateral: Amount, debt: Amount) -> Leverage {
    if collateral.is_zero() || debt.is_zero() {
        return Leverage::ONE;
    }
    if debt >= collateral {
        return Leverage::MAX;
    }
    let equity = collateral.value() - debt.value();
    Leverage::saturating(collateral.value() / equity)
}

/// `1 / (1 - ltv)`. unbounded when the market lends the full collateral value.
pub fn max_achievable_leverage(ltv: Fraction) -> Leverage {
    let headroom = ltv.complement();
    if headroom <= Decimal::ZERO {
        return Leverage::MAX;
    }
    Leverage::saturating(Decimal::ONE / headroom)
}

pub fn safe_max_leverage(ltv: Fraction) -> Leverage {
    let max = max_achievable_leverage(ltv);
    if max.is_unbounded() {
        return max;
    }
    Leverage::saturating(max.value() * SAFETY_MARGIN)
}

/// True when a position at `target` stays under the LTV limit: `target × (1 - ltv) < 1`.
pub fn ltv_supports(target: Leverage, ltv: Fraction) -> bool {
    target.value() * ltv.complement() < Decimal::ONE
}

// 2.1: snapshot of the position in collateral units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    pub collateral: Amount,
    /// Debt balance converted to collateral units.
    pub debt: Amount,
}

impl PositionState {
    pub fn new(collateral: Amount, debt: Amount) -> Self {
        Self { collateral, debt }
    }

    /// Reads raw balances and converts the debt through `price`.
    pub fn from_balances(
        collateral: Amount,
        debt_balance: Amount,
        price: Price,
        collateral_asset: &AssetInfo,
    ) -> Self {
        Self {
            collateral,
            debt: price.debt_to_collateral(debt_balance, collateral_asset),
        }
    }

    /// Signed equity. negative when underwater.
    pub fn equity(&self) -> Decimal {
        self.collateral.value() - self.debt.value()
    }

    pub fn leverage_ratio(&self) -> Leverage {
        leverage_ratio(self.collateral, self.debt)
    }

    pub fn is_unlevered(&self) -> bool {
        self.leverage_ratio().value() <= Decimal::ONE + UNLEVERED_TOLERANCE
    }

    /// Collateral to add (funded by equal new debt) to reach `target`.
    pub fn lever_notional(&self, target: Leverage) -> Amount {
        let equity = self.equity();
        if equity <= Decimal::ZERO {
            return Amount::zero();
        }
        Amount::new(target.value() * equity - self.collateral.value())
    }

    /// Collateral to sell (repaying debt) to come down to `target`.
    pub fn delever_notional(&self, target: Leverage) -> Amount {
        let equity = self.equity();
        if equity <= Decimal::ZERO {
            return self.collateral;
        }
        Amount::new(self.collateral.value() - target.value() * equity)
    }

    /// Leverage after adding `extra` collateral and the same value of debt.
    pub fn projected_after_lever(&self, extra: Amount) -> Leverage {
        leverage_ratio(self.collateral.add(extra), self.debt.add(extra))
    }

    /// Largest lever notional that keeps leverage at or below `bound`.
    pub fn lever_headroom(&self, bound: Leverage) -> Amount {
        if bound.is_unbounded() {
            return Amount::new(Decimal::MAX);
        }
        self.lever_notional(bound)
    }
}
