//! Trade sizing and swap requests.

use super::core::Engine;
use super::results::{EngineError, SkipReason, TradeOutcome};
use crate::events::{EventPayload, SwapRequestedEvent, TwapClearedEvent};
use crate::lending::LendingMarket;
use crate::oracle::PriceFeed;
use crate::position::{safe_max_leverage, SAFETY_MARGIN};
use crate::swap::{quote, PendingSwap, SwapDirection, SwapQuote, SwapRequest, SwapState, SwapVenue, ValidityData};
use crate::types::{Amount, Bps, Leverage, Price};

impl<M, V, F> Engine<M, V, F>
where
    M: LendingMarket + Clone,
    V: SwapVenue + Clone,
    F: PriceFeed + Clone,
{
    /// Borrow against the position and swap the debt for collateral.
    ///
    /// The notional is cut to the per-trade cap, re-arming the sequence toward
    /// `toward` so later calls continue. The borrow is then cut to 95% of live
    /// capacity and scaled down until the projected leverage stays within the
    /// safe bound for the current LTV.
    pub(super) fn lever(
        &mut self,
        notional: Amount,
        toward: Leverage,
        price: Price,
    ) -> Result<TradeOutcome, EngineError> {
        let max_trade = self.strategy.execution.max_trade_size;
        let capped = notional > max_trade;
        let notional = notional.min(max_trade).round_to(self.strategy.collateral.decimals);
        if capped {
            self.twap_target = Some(toward);
        }
        if notional.is_zero() {
            return Ok(TradeOutcome::Skipped(SkipReason::ZeroNotional));
        }

        let account = self.strategy.account;
        let debt = self.strategy.debt.clone();
        let collateral = self.strategy.collateral.clone();
        let wanted = price.collateral_to_debt(notional, &debt);

        let capacity = self.market.max_borrow(account, debt.id);
        if capacity.is_zero() {
            tracing::debug!(%notional, "no borrow capacity, lever skipped");
            return Ok(TradeOutcome::Skipped(SkipReason::NoBorrowCapacity));
        }
        let safe_capacity = capacity.mul(SAFETY_MARGIN).round_to(debt.decimals);
        let mut borrow = wanted.min(safe_capacity);
        let mut capacity_limited = borrow < wanted;

        let position = self.position_at(price);
        let bound = safe_max_leverage(self.current_ltv());
        let extra = price.debt_to_collateral(borrow, &collateral);
        if position.projected_after_lever(extra) > bound {
            let headroom = position.lever_headroom(bound);
            borrow = borrow.min(price.collateral_to_debt(headroom, &debt));
            capacity_limited = true;
            tracing::debug!(%bound, %borrow, "borrow scaled to projected leverage bound");
        }

        let slippage = self.strategy.execution.slippage;
        let q = self.price_swap(SwapDirection::Lever, borrow, slippage, price);
        if q.expected_output.is_zero() {
            return Ok(TradeOutcome::Skipped(SkipReason::NoBorrowCapacity));
        }

        self.market.borrow(debt.id, borrow, account)?;
        self.credit(debt.id, borrow);
        let swap = self.request_swap(SwapDirection::Lever, borrow, &q)?;

        tracing::info!(
            order = swap.order_id.0,
            %notional,
            %borrow,
            %capacity,
            capped,
            capacity_limited,
            "lever requested"
        );

        Ok(TradeOutcome::Requested {
            swap,
            min_out: q.min_out,
            capped,
            capacity_limited,
        })
    }

    /// Withdraw collateral and swap it for the debt asset.
    ///
    /// `max_trade` and `slippage` come from the execution params on the ordinary
    /// path and from the incentive params on the emergency path. The withdrawal is
    /// cut to 95% of what the market releases while the debt is outstanding, since
    /// the repay only lands on completion. A capped or limited trade re-arms the
    /// sequence only when `toward` is given.
    pub(super) fn delever(
        &mut self,
        notional: Amount,
        slippage: Bps,
        max_trade: Amount,
        toward: Option<Leverage>,
        price: Price,
    ) -> Result<TradeOutcome, EngineError> {
        let capped = notional > max_trade;
        let collateral = self.strategy.collateral.clone();
        let wanted = notional.min(max_trade).round_to(collateral.decimals);

        let withdrawable = self
            .market
            .max_withdraw(self.strategy.account, collateral.id)
            .mul(SAFETY_MARGIN)
            .round_to(collateral.decimals);
        let notional = wanted.min(withdrawable);
        let capacity_limited = notional < wanted;
        if capacity_limited {
            tracing::debug!(%wanted, %withdrawable, "withdrawal cut to market headroom");
        }
        if capped || capacity_limited {
            if let Some(target) = toward {
                self.twap_target = Some(target);
            }
        }
        if notional.is_zero() {
            let reason = if capacity_limited {
                SkipReason::NoWithdrawCapacity
            } else {
                SkipReason::ZeroNotional
            };
            return Ok(TradeOutcome::Skipped(reason));
        }

        let q = self.price_swap(SwapDirection::Delever, notional, slippage, price);
        if q.expected_output.is_zero() {
            return Ok(TradeOutcome::Skipped(SkipReason::ZeroNotional));
        }

        let withdrawn = self.market.withdraw(collateral.id, notional, self.strategy.account)?;
        self.credit(collateral.id, withdrawn);
        let swap = self.request_swap(SwapDirection::Delever, withdrawn, &q)?;

        tracing::info!(
            order = swap.order_id.0,
            %notional,
            slippage_bps = slippage.value(),
            capped,
            capacity_limited,
            "delever requested"
        );

        Ok(TradeOutcome::Requested {
            swap,
            min_out: q.min_out,
            capped,
            capacity_limited,
        })
    }

    /// Clears the multi step target. Returns false if none was set.
    pub(super) fn clear_twap_target(&mut self) -> bool {
        let Some(target) = self.twap_target.take() else {
            return false;
        };
        tracing::info!(%target, "twap target cleared");
        self.emit_event(EventPayload::TwapCleared(TwapClearedEvent { target }));
        true
    }

    fn price_swap(&self, direction: SwapDirection, amount_in: Amount, slippage: Bps, price: Price) -> SwapQuote {
        quote(
            direction,
            amount_in,
            price,
            slippage,
            &self.strategy.collateral,
            &self.strategy.debt,
        )
    }

    /// Hands `amount_in` to the venue and moves the lifecycle to pending.
    fn request_swap(
        &mut self,
        direction: SwapDirection,
        amount_in: Amount,
        q: &SwapQuote,
    ) -> Result<PendingSwap, EngineError> {
        let (asset_in, asset_out) = match direction {
            SwapDirection::Lever => (self.strategy.debt.id, self.strategy.collateral.id),
            SwapDirection::Delever => (self.strategy.collateral.id, self.strategy.debt.id),
        };
        let amount_in = self.debit(asset_in, amount_in);
        let baseline = self.holding(asset_out);

        let order_id = self.venue.request_swap(SwapRequest {
            amount_in,
            asset_in,
            asset_out,
            recipient: self.strategy.account,
            validity: ValidityData {
                direction,
                min_out: q.min_out,
            },
        })?;

        let swap = PendingSwap {
            direction,
            order_id,
            asset_in,
            asset_out,
            amount: amount_in,
            requested_at: self.clock.time,
            expected_output: q.expected_output,
            baseline,
        };
        self.lifecycle = SwapState::Pending(swap);
        self.last_trade_at = self.clock.time;

        self.emit_event(EventPayload::SwapRequested(SwapRequestedEvent {
            order_id,
            direction,
            asset_in,
            asset_out,
            amount_in,
            min_out: q.min_out,
            expected_output: q.expected_output,
        }));

        Ok(swap)
    }
}
