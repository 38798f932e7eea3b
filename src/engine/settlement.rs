//! Swap reconciliation: completion, timeout cancellation, forced settlement.

use super::core::Engine;
use super::results::{CancelResult, CompleteResult, EngineError};
use crate::access::Caller;
use crate::events::{EventPayload, SwapCancelledEvent, SwapCompletedEvent};
use crate::lending::LendingMarket;
use crate::oracle::PriceFeed;
use crate::swap::{MockVenue, OrderId, Settlement, SwapDirection, SwapState, SwapVenue, VenueError, SWAP_TIMEOUT_SECS};
use crate::types::Amount;

impl<M, V, F> Engine<M, V, F>
where
    M: LendingMarket + Clone,
    V: SwapVenue + Clone,
    F: PriceFeed + Clone,
{
    /// Applies settled proceeds to the position. Anyone may call.
    ///
    /// Reads what the venue pushed in the output asset since the request. Tokens
    /// held before it, or pushed by other orders, are left idle. The lifecycle is
    /// cleared before the lending market is touched.
    pub fn complete_swap(&mut self, caller: Caller) -> Result<CompleteResult, EngineError> {
        self.transact(|engine| {
            let pending = *engine.lifecycle.pending().ok_or(EngineError::SwapNotPending)?;

            let received = pending.received(engine.holding(pending.asset_out));
            if received.is_zero() {
                return Err(EngineError::SwapNotSettled);
            }
            if received < pending.expected_output {
                return Err(EngineError::SwapOutputTooLow {
                    received,
                    expected: pending.expected_output,
                });
            }

            engine.lifecycle = SwapState::Idle;
            let amount_out = engine.debit(pending.asset_out, received);
            let account = engine.strategy.account;

            let surplus = match pending.direction {
                SwapDirection::Lever => {
                    engine.market.supply(pending.asset_out, amount_out, account)?;
                    Amount::zero()
                }
                SwapDirection::Delever => {
                    let repaid = engine.market.repay(pending.asset_out, amount_out, account)?;
                    let surplus = amount_out.saturating_sub(repaid);
                    // debt already gone, the rest stays idle
                    engine.credit(pending.asset_out, surplus);
                    surplus
                }
            };

            let leverage_after = engine.current_leverage_ratio();
            tracing::info!(
                caller = %caller.address,
                order = pending.order_id.0,
                direction = ?pending.direction,
                %amount_out,
                %surplus,
                leverage = %leverage_after,
                "swap completed"
            );
            engine.emit_event(EventPayload::SwapCompleted(SwapCompletedEvent {
                caller: caller.address,
                order_id: pending.order_id,
                direction: pending.direction,
                amount_out,
                surplus,
                leverage_after,
            }));

            Ok(CompleteResult {
                order_id: pending.order_id,
                direction: pending.direction,
                amount_out,
                surplus,
                leverage_after,
            })
        })
    }

    /// Abandons a request the venue never settled.
    ///
    /// Balances are left alone: the input stays with the venue and is reported as
    /// stranded. Any armed sequence is cleared with it.
    pub fn cancel_timed_out_swap(&mut self, caller: Caller) -> Result<CancelResult, EngineError> {
        self.transact(|engine| {
            engine.require_allowed(&caller)?;
            let pending = *engine.lifecycle.pending().ok_or(EngineError::SwapNotPending)?;

            let now = engine.clock.time;
            if !pending.is_timed_out(now) {
                return Err(EngineError::SwapNotTimedOut {
                    elapsed_secs: now.secs_since(pending.requested_at),
                    timeout_secs: SWAP_TIMEOUT_SECS,
                });
            }

            engine.lifecycle = SwapState::Idle;
            engine.clear_twap_target();

            tracing::warn!(
                caller = %caller.address,
                order = pending.order_id.0,
                stranded = %pending.amount,
                "timed out swap cancelled, input left at venue"
            );
            engine.emit_event(EventPayload::SwapCancelled(SwapCancelledEvent {
                caller: caller.address,
                order_id: pending.order_id,
                direction: pending.direction,
                stranded_asset: pending.asset_in,
                stranded_amount: pending.amount,
            }));

            Ok(CancelResult {
                order_id: pending.order_id,
                direction: pending.direction,
                stranded_asset: pending.asset_in,
                stranded_amount: pending.amount,
            })
        })
    }
}

impl<M, F> Engine<M, MockVenue, F>
where
    M: LendingMarket + Clone,
    F: PriceFeed + Clone,
{
    /// Forces the in-memory venue to fill `order_id` at `amount_out`.
    ///
    /// The fill must pass the price check against the smoothed oracle and meet the
    /// order minimum. Proceeds are pushed to the recipient; the position is not
    /// touched until `complete_swap`.
    pub fn settle_order(&mut self, order_id: OrderId, amount_out: Amount) -> Result<Settlement, EngineError> {
        self.transact(|engine| {
            let order = engine.venue.order(order_id).ok_or(VenueError::UnknownOrder(order_id))?;
            engine
                .checker
                .validate(
                    &order.request,
                    amount_out,
                    engine.oracle.twap_price(),
                    engine.oracle.is_breaker_tripped(),
                )
                .map_err(VenueError::from)?;

            let settlement = engine.venue.fill(order_id, amount_out)?;
            if settlement.recipient == engine.strategy.account {
                engine.receive(settlement.asset, settlement.amount);
                // a late fill of an abandoned order is not the pending order's output
                if let SwapState::Pending(pending) = &mut engine.lifecycle {
                    if pending.order_id != order_id && pending.asset_out == settlement.asset {
                        pending.baseline = pending.baseline.add(settlement.amount);
                        tracing::warn!(
                            order = order_id.0,
                            pending = pending.order_id.0,
                            amount = %settlement.amount,
                            "fill of a stale order kept idle"
                        );
                    }
                }
            }
            tracing::debug!(order = order_id.0, %amount_out, "order settled");
            Ok(settlement)
        })
    }
}
