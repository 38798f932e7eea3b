//! Vault adapter surface: deposits, withdrawals and the real assets read.

use super::core::Engine;
use super::results::EngineError;
use crate::access::Caller;
use crate::events::{EventPayload, VaultEvent};
use crate::lending::LendingMarket;
use crate::oracle::PriceFeed;
use crate::position::leverage_ratio;
use crate::swap::{SwapDirection, SwapVenue};
use crate::types::Amount;

impl<M, V, F> Engine<M, V, F>
where
    M: LendingMarket + Clone,
    V: SwapVenue + Clone,
    F: PriceFeed + Clone,
{
    /// Net value the position stands for, in collateral units.
    ///
    /// Equity at the lending market, plus idle tokens held by the engine, plus the
    /// input of a pending swap whose output has not arrived yet.
    pub fn real_assets(&self) -> Amount {
        let price = self.oracle.twap_price();
        let collateral = &self.strategy.collateral;
        let debt = &self.strategy.debt;

        let equity = Amount::new(self.position_at(price).equity());
        let idle = self
            .holding(collateral.id)
            .add(price.debt_to_collateral(self.holding(debt.id), collateral));

        let in_flight = match self.lifecycle.pending() {
            Some(p) if p.received(self.holding(p.asset_out)).is_zero() => match p.direction {
                SwapDirection::Lever => price.debt_to_collateral(p.amount, collateral),
                SwapDirection::Delever => p.amount,
            },
            _ => Amount::zero(),
        };

        equity.add(idle).add(in_flight)
    }

    /// Adapter pushes collateral in; it is supplied straight to the lending market.
    pub fn deposit(&mut self, caller: Caller, amount: Amount) -> Result<Amount, EngineError> {
        self.transact(|engine| {
            engine.require_adapter(&caller)?;
            engine.require_idle()?;

            let account = engine.strategy.account;
            let asset = engine.strategy.collateral.id;
            engine.market.supply(asset, amount, account)?;
            let collateral_after = engine.market.collateral_balance(account, asset);

            tracing::info!(%amount, %collateral_after, "deposited");
            engine.emit_event(EventPayload::Deposited(VaultEvent {
                adapter: caller.address,
                amount,
                collateral_after,
            }));
            Ok(collateral_after)
        })
    }

    /// Adapter pulls collateral out. Refused if it exceeds real assets or would push
    /// leverage above the max band.
    pub fn withdraw(&mut self, caller: Caller, amount: Amount) -> Result<Amount, EngineError> {
        self.transact(|engine| {
            engine.require_adapter(&caller)?;
            engine.require_idle()?;

            let available = engine.real_assets();
            if amount > available {
                return Err(EngineError::InsufficientAssets {
                    requested: amount,
                    available,
                });
            }

            let position = engine.position();
            let projected = leverage_ratio(position.collateral.saturating_sub(amount), position.debt);
            let max = engine.strategy.leverage.max;
            if projected > max {
                return Err(EngineError::LeverageTooHigh {
                    leverage: projected,
                    bound: max,
                });
            }

            let account = engine.strategy.account;
            let asset = engine.strategy.collateral.id;
            let withdrawn = engine.market.withdraw(asset, amount, account)?;
            let collateral_after = engine.market.collateral_balance(account, asset);

            tracing::info!(%withdrawn, %collateral_after, "withdrawn");
            engine.emit_event(EventPayload::Withdrawn(VaultEvent {
                adapter: caller.address,
                amount: withdrawn,
                collateral_after,
            }));
            Ok(withdrawn)
        })
    }

    fn require_adapter(&self, caller: &Caller) -> Result<(), EngineError> {
        if caller.address != self.strategy.adapter {
            return Err(EngineError::NotAdapter(caller.address));
        }
        Ok(())
    }
}
