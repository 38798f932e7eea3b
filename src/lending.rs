// 5.0 lending.rs: the external lending market the position lives in.
// the engine only needs supply/withdraw/borrow/repay, balances, the pair LTV,
// remaining borrow capacity and withdrawable collateral. 5.1 InMemoryLendingMarket is a single pair mock.

use crate::types::{Address, Amount, AssetId, AssetInfo, Fraction, Price};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LendingError {
    #[error("Asset {0:?} not listed")]
    UnsupportedAsset(AssetId),

    #[error("Insufficient supplied balance: requested {requested}, available {available}")]
    InsufficientCollateral { requested: Amount, available: Amount },

    #[error("Borrow of {requested} exceeds capacity {available}")]
    BorrowCapExceeded { requested: Amount, available: Amount },

    #[error("Withdrawal would leave the account below its liquidation threshold")]
    HealthFactorTooLow,
}

pub trait LendingMarket {
    fn supply(&mut self, asset: AssetId, amount: Amount, on_behalf_of: Address) -> Result<(), LendingError>;
    fn withdraw(&mut self, asset: AssetId, amount: Amount, to: Address) -> Result<Amount, LendingError>;
    fn borrow(&mut self, asset: AssetId, amount: Amount, on_behalf_of: Address) -> Result<(), LendingError>;
    /// Returns the amount actually repaid, never more than the outstanding debt.
    fn repay(&mut self, asset: AssetId, amount: Amount, on_behalf_of: Address) -> Result<Amount, LendingError>;
    fn collateral_balance(&self, user: Address, asset: AssetId) -> Amount;
    fn debt_balance(&self, user: Address, asset: AssetId) -> Amount;
    /// Max borrow fraction of collateral value for the pair.
    fn ltv(&self, collateral: AssetId, debt: AssetId) -> Fraction;
    /// Remaining borrow capacity of `user` in `asset`.
    fn max_borrow(&self, user: Address, asset: AssetId) -> Amount;
    /// Supplied `asset` that `user` can withdraw with its debt still outstanding.
    fn max_withdraw(&self, user: Address, asset: AssetId) -> Amount;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub supplied: Amount,
    pub borrowed: Amount,
}

// 5.1: one collateral asset, one debt asset, one price.
#[derive(Debug, Clone)]
pub struct InMemoryLendingMarket {
    collateral: AssetInfo,
    debt: AssetInfo,
    /// Debt units per collateral unit.
    price: Price,
    ltv: Fraction,
    liquidation_threshold: Fraction,
    /// Debt asset available to lend.
    liquidity: Amount,
    balances: HashMap<(Address, AssetId), AccountBalance>,
}

impl InMemoryLendingMarket {
    pub fn new(
        collateral: AssetInfo,
        debt: AssetInfo,
        price: Price,
        ltv: Fraction,
        liquidation_threshold: Fraction,
        liquidity: Amount,
    ) -> Self {
        Self {
            collateral,
            debt,
            price,
            ltv,
            liquidation_threshold,
            liquidity,
            balances: HashMap::new(),
        }
    }

    pub fn set_price(&mut self, price: Price) {
        self.price = price;
    }

    pub fn set_ltv(&mut self, ltv: Fraction) {
        self.ltv = ltv;
    }

    pub fn set_liquidity(&mut self, liquidity: Amount) {
        self.liquidity = liquidity;
    }

    pub fn liquidity(&self) -> Amount {
        self.liquidity
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn balance(&self, user: Address, asset: AssetId) -> AccountBalance {
        self.balances.get(&(user, asset)).copied().unwrap_or_default()
    }

    fn entry(&mut self, user: Address, asset: AssetId) -> &mut AccountBalance {
        self.balances.entry((user, asset)).or_default()
    }

    fn check_listed(&self, asset: AssetId) -> Result<(), LendingError> {
        if asset == self.collateral.id || asset == self.debt.id {
            Ok(())
        } else {
            Err(LendingError::UnsupportedAsset(asset))
        }
    }

    /// Collateral value in debt units, scaled by `factor`.
    fn weighted_collateral(&self, supplied: Amount, factor: Fraction) -> Amount {
        self.price
            .collateral_to_debt(supplied, &self.debt)
            .mul(factor.value())
            .round_to(self.debt.decimals)
    }
}

impl LendingMarket for InMemoryLendingMarket {
    fn supply(&mut self, asset: AssetId, amount: Amount, on_behalf_of: Address) -> Result<(), LendingError> {
        self.check_listed(asset)?;
        let balance = self.entry(on_behalf_of, asset);
        balance.supplied = balance.supplied.add(amount);
        Ok(())
    }

    fn withdraw(&mut self, asset: AssetId, amount: Amount, to: Address) -> Result<Amount, LendingError> {
        self.check_listed(asset)?;
        let current = self.balance(to, asset);
        if amount > current.supplied {
            return Err(LendingError::InsufficientCollateral {
                requested: amount,
                available: current.supplied,
            });
        }

        if asset == self.collateral.id {
            let remaining = current.supplied.saturating_sub(amount);
            let debt = self.balance(to, self.debt.id).borrowed;
            if debt > self.weighted_collateral(remaining, self.liquidation_threshold) {
                return Err(LendingError::HealthFactorTooLow);
            }
        }

        let balance = self.entry(to, asset);
        balance.supplied = balance.supplied.saturating_sub(amount);
        Ok(amount)
    }

    fn borrow(&mut self, asset: AssetId, amount: Amount, on_behalf_of: Address) -> Result<(), LendingError> {
        if asset != self.debt.id {
            return Err(LendingError::UnsupportedAsset(asset));
        }
        let available = self.max_borrow(on_behalf_of, asset);
        if amount > available {
            return Err(LendingError::BorrowCapExceeded {
                requested: amount,
                available,
            });
        }
        self.liquidity = self.liquidity.saturating_sub(amount);
        let balance = self.entry(on_behalf_of, asset);
        balance.borrowed = balance.borrowed.add(amount);
        Ok(())
    }

    fn repay(&mut self, asset: AssetId, amount: Amount, on_behalf_of: Address) -> Result<Amount, LendingError> {
        if asset != self.debt.id {
            return Err(LendingError::UnsupportedAsset(asset));
        }
        let balance = self.entry(on_behalf_of, asset);
        let repaid = amount.min(balance.borrowed);
        balance.borrowed = balance.borrowed.saturating_sub(repaid);
        self.liquidity = self.liquidity.add(repaid);
        Ok(repaid)
    }

    fn collateral_balance(&self, user: Address, asset: AssetId) -> Amount {
        self.balance(user, asset).supplied
    }

    fn debt_balance(&self, user: Address, asset: AssetId) -> Amount {
        self.balance(user, asset).borrowed
    }

    fn ltv(&self, collateral: AssetId, debt: AssetId) -> Fraction {
        if collateral == self.collateral.id && debt == self.debt.id {
            self.ltv
        } else {
            Fraction::ZERO
        }
    }

    fn max_borrow(&self, user: Address, asset: AssetId) -> Amount {
        if asset != self.debt.id {
            return Amount::zero();
        }
        let supplied = self.balance(user, self.collateral.id).supplied;
        let borrowed = self.balance(user, self.debt.id).borrowed;
        self.weighted_collateral(supplied, self.ltv)
            .saturating_sub(borrowed)
            .min(self.liquidity)
    }

    fn max_withdraw(&self, user: Address, asset: AssetId) -> Amount {
        if self.check_listed(asset).is_err() {
            return Amount::zero();
        }
        let supplied = self.balance(user, asset).supplied;
        if asset != self.collateral.id {
            return supplied;
        }
        let debt = self.balance(user, self.debt.id).borrowed;
        if debt.is_zero() {
            return supplied;
        }
        let backing = self.price.value() * self.liquidation_threshold.value();
        if backing.is_zero() {
            return Amount::zero();
        }
        // collateral that must stay behind the debt at the liquidation threshold
        let locked = debt.value() / backing;
        Amount::new(supplied.value() - locked).round_to(self.collateral.decimals)
    }
}
