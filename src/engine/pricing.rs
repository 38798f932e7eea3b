//! Oracle refresh and LTV re-validation.

use super::core::Engine;
use super::results::EngineError;
use crate::access::OperatorCap;
use crate::events::{CircuitBreakerTrippedEvent, EventPayload, OracleResetEvent, StrategyDeactivatedEvent};
use crate::lending::LendingMarket;
use crate::oracle::{PriceFeed, TwapUpdate};
use crate::position::ltv_supports;
use crate::swap::SwapVenue;
use crate::types::Price;

impl<M, V, F> Engine<M, V, F>
where
    M: LendingMarket + Clone,
    V: SwapVenue + Clone,
    F: PriceFeed + Clone,
{
    /// Permissionless smoothing step.
    pub fn update_oracle(&mut self) -> Result<TwapUpdate, EngineError> {
        self.transact(|engine| engine.refresh_oracle())
    }

    /// Operator recovery: smoothed price jumps to spot and the breaker clears.
    pub fn reset_oracle(&mut self, operator: &OperatorCap) -> Result<Price, EngineError> {
        if !self.access.operates(operator) {
            return Err(EngineError::NotOperator);
        }
        self.transact(|engine| {
            let previous_twap = engine.oracle.twap_price();
            let twap = engine.oracle.reset_to_spot(operator, engine.clock)?;

            tracing::warn!(%previous_twap, %twap, "oracle reset to spot");
            engine.emit_event(EventPayload::OracleReset(OracleResetEvent { previous_twap, twap }));
            Ok(twap)
        })
    }

    /// Re-checks the live LTV against the target and deactivates the strategy when it no
    /// longer fits. Safe to call repeatedly. Returns whether the LTV is valid.
    pub fn sync_ltv(&mut self) -> Result<bool, EngineError> {
        self.transact(|engine| {
            let ltv = engine.current_ltv();
            let target = engine.strategy.leverage.target;
            if ltv_supports(target, ltv) {
                return Ok(true);
            }
            if engine.access.is_active {
                engine.access.is_active = false;
                tracing::warn!(%ltv, %target, "ltv no longer supports target, strategy deactivated");
                engine.emit_event(EventPayload::StrategyDeactivated(StrategyDeactivatedEvent { ltv, target }));
            }
            Ok(false)
        })
    }

    pub fn is_ltv_valid(&self) -> bool {
        ltv_supports(self.strategy.leverage.target, self.current_ltv())
    }

    pub(super) fn refresh_oracle(&mut self) -> Result<TwapUpdate, EngineError> {
        let update = self.oracle.update_twap(self.clock)?;
        if update.newly_tripped {
            self.emit_event(EventPayload::CircuitBreakerTripped(CircuitBreakerTrippedEvent {
                twap: update.twap,
                spot: update.spot,
            }));
        }
        Ok(update)
    }

    /// Refreshes the oracle and returns the smoothed price, failing while the
    /// breaker is tripped.
    pub(super) fn safe_price(&mut self) -> Result<Price, EngineError> {
        self.refresh_oracle()?;
        Ok(self.oracle.safe_twap_price()?)
    }
}
