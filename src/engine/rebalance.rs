//! Leverage control loop: engage, rebalance, multi step iteration, ripcord.

use super::core::Engine;
use super::results::{
    EngageResult, EngineError, RebalanceAction, RebalanceResult, RipcordResult, SkipReason, TradeOutcome,
};
use crate::access::Caller;
use crate::events::{EngagedEvent, EventPayload, RebalanceKind, RebalancedEvent, RipcordedEvent};
use crate::lending::{LendingError, LendingMarket};
use crate::oracle::PriceFeed;
use crate::position::ltv_supports;
use crate::swap::{SwapDirection, SwapVenue};
use crate::types::{Amount, Leverage, Price};
use rust_decimal::Decimal;

impl<M, V, F> Engine<M, V, F>
where
    M: LendingMarket + Clone,
    V: SwapVenue + Clone,
    F: PriceFeed + Clone,
{
    /// First lever trade from an unlevered position. Arms the sequence toward target.
    pub fn engage(&mut self, caller: Caller) -> Result<EngageResult, EngineError> {
        self.transact(|engine| {
            engine.require_allowed(&caller)?;
            engine.require_active()?;
            engine.require_idle()?;

            let position = engine.position();
            if position.collateral.is_zero() {
                return Err(EngineError::NotEngaged);
            }
            if !position.is_unlevered() {
                return Err(EngineError::AlreadyEngaged(position.leverage_ratio()));
            }

            let ltv = engine.current_ltv();
            let target = engine.strategy.leverage.target;
            if !ltv_supports(target, ltv) {
                return Err(EngineError::LeverageExceedsLTVLimit { target, ltv });
            }

            let price = engine.safe_price()?;
            let position = engine.position_at(price);
            engine.twap_target = Some(target);
            let trade = engine.lever(position.lever_notional(target), target, price)?;
            engine.last_rebalance_at = engine.clock.time;

            tracing::info!(
                caller = %caller.address,
                collateral = %position.collateral,
                %target,
                amount_in = %trade.amount_in(),
                "engaged"
            );
            engine.emit_event(EventPayload::Engaged(EngagedEvent {
                caller: caller.address,
                collateral: position.collateral,
                target,
            }));

            Ok(EngageResult {
                collateral: position.collateral,
                target,
                trade,
            })
        })
    }

    /// Decision for the keeper. Pending swap first, then ripcord, then an active
    /// sequence, then the band, then the timed dead-band check.
    ///
    /// A position at or below 1.01x counts as unlevered and reads `None` even
    /// when `min` is above it: `engage` is the way in, not a rebalance.
    pub fn should_rebalance(&self) -> RebalanceAction {
        if !self.lifecycle.is_idle() {
            return RebalanceAction::None;
        }
        let position = self.position();
        if position.collateral.is_zero() {
            return RebalanceAction::None;
        }

        let leverage = position.leverage_ratio();
        let params = &self.strategy.leverage;
        if leverage >= params.ripcord {
            return RebalanceAction::Ripcord;
        }

        if self.twap_target.is_some() {
            return if self.twap_cooldown_elapsed() {
                RebalanceAction::Iterate
            } else {
                RebalanceAction::None
            };
        }

        // not engaged yet; engage() is the way in
        if position.is_unlevered() {
            return RebalanceAction::None;
        }

        if leverage < params.min || leverage > params.max {
            return RebalanceAction::Rebalance;
        }

        let interval = self.strategy.execution.rebalance_interval_secs;
        if self.clock.time.secs_since(self.last_rebalance_at) >= interval {
            let target = params.target.value();
            let deviation = (leverage.value() - target).abs() / target;
            if deviation > self.strategy.execution.dead_band.as_fraction() {
                return RebalanceAction::Rebalance;
            }
        }

        RebalanceAction::None
    }

    /// Ordinary rebalance. Moves `recenter_speed` of the way from current leverage
    /// back to target.
    pub fn rebalance(&mut self, caller: Caller) -> Result<RebalanceResult, EngineError> {
        self.transact(|engine| {
            engine.require_direct(&caller)?;
            engine.require_allowed(&caller)?;
            engine.require_active()?;
            engine.require_idle()?;

            let price = engine.safe_price()?;
            let leverage_before = engine.current_leverage_ratio();
            match engine.should_rebalance() {
                RebalanceAction::Rebalance => {}
                RebalanceAction::Ripcord => {
                    return Err(EngineError::LeverageTooHigh {
                        leverage: leverage_before,
                        bound: engine.strategy.leverage.ripcord,
                    });
                }
                RebalanceAction::None | RebalanceAction::Iterate => {
                    return Err(EngineError::RebalanceIntervalNotElapsed);
                }
            }

            let target = engine.strategy.leverage.target;
            let toward = recenter(leverage_before, target, engine.strategy.execution.recenter_speed.value());
            let trade = engine.trade_toward(toward, price)?;
            engine.last_rebalance_at = engine.clock.time;

            engine.record_rebalance(&caller, RebalanceKind::Recenter, leverage_before, toward, &trade);
            Ok(RebalanceResult {
                leverage_before,
                toward,
                trade,
                twap_cleared: false,
            })
        })
    }

    /// Next step of an armed sequence. Clears the target once the remaining
    /// notional went out in full.
    pub fn iterate_rebalance(&mut self, caller: Caller) -> Result<RebalanceResult, EngineError> {
        self.transact(|engine| {
            engine.require_direct(&caller)?;
            engine.require_allowed(&caller)?;
            engine.require_active()?;
            engine.require_idle()?;

            let target = engine.twap_target.ok_or(EngineError::TwapNotActive)?;
            if !engine.twap_cooldown_elapsed() {
                return Err(EngineError::RebalanceIntervalNotElapsed);
            }

            let price = engine.safe_price()?;
            let leverage_before = engine.current_leverage_ratio();
            let ripcord = engine.strategy.leverage.ripcord;
            if leverage_before >= ripcord {
                return Err(EngineError::LeverageTooHigh {
                    leverage: leverage_before,
                    bound: ripcord,
                });
            }

            let trade = engine.trade_toward(target, price)?;
            let complete = match &trade {
                TradeOutcome::Requested {
                    capped,
                    capacity_limited,
                    ..
                } => !capped && !capacity_limited,
                // nothing left to trade
                TradeOutcome::Skipped(reason) => *reason == SkipReason::ZeroNotional,
            };
            let twap_cleared = complete && engine.clear_twap_target();
            engine.last_rebalance_at = engine.clock.time;

            engine.record_rebalance(&caller, RebalanceKind::Iterate, leverage_before, target, &trade);
            Ok(RebalanceResult {
                leverage_before,
                toward: target,
                trade,
                twap_cleared,
            })
        })
    }

    /// Emergency unwind above the ripcord threshold. Open to any direct caller, who
    /// is paid the configured reward.
    pub fn ripcord(&mut self, caller: Caller) -> Result<RipcordResult, EngineError> {
        self.transact(|engine| {
            engine.require_direct(&caller)?;
            engine.require_idle()?;

            engine.refresh_oracle()?;
            let price = engine.oracle.twap_price();
            let position = engine.position_at(price);
            let leverage_before = position.leverage_ratio();
            let params = engine.strategy.leverage.clone();
            if leverage_before < params.ripcord {
                return Err(EngineError::LeverageTooLow {
                    leverage: leverage_before,
                    bound: params.ripcord,
                });
            }

            let incentive = engine.strategy.incentive.clone();
            if engine.clock.time.secs_since(engine.last_trade_at) < incentive.twap_cooldown_secs {
                return Err(EngineError::RebalanceIntervalNotElapsed);
            }
            if engine.native_balance < incentive.ether_reward {
                return Err(EngineError::InsufficientEtherReward {
                    balance: engine.native_balance,
                    reward: incentive.ether_reward,
                });
            }

            let notional = position.delever_notional(params.max);
            let trade = engine.delever(notional, incentive.slippage, incentive.max_trade, None, price)?;
            // no reward for an unwind the market would not release collateral for
            if !trade.is_requested() {
                return Err(LendingError::HealthFactorTooLow.into());
            }
            engine.clear_twap_target();
            engine.last_rebalance_at = engine.clock.time;

            engine.native_balance = engine.native_balance.saturating_sub(incentive.ether_reward);
            let paid = engine.payouts.entry(caller.address).or_default();
            *paid = paid.add(incentive.ether_reward);

            tracing::warn!(
                caller = %caller.address,
                leverage = %leverage_before,
                notional = %trade.amount_in(),
                reward = %incentive.ether_reward,
                "ripcord pulled"
            );
            engine.emit_event(EventPayload::Ripcorded(RipcordedEvent {
                caller: caller.address,
                leverage_before,
                notional: trade.amount_in(),
                reward: incentive.ether_reward,
            }));

            Ok(RipcordResult {
                leverage_before,
                trade,
                reward: incentive.ether_reward,
            })
        })
    }

    /// Levers or delevers from the current position toward `toward` with the
    /// ordinary execution params.
    fn trade_toward(&mut self, toward: Leverage, price: Price) -> Result<TradeOutcome, EngineError> {
        let position = self.position_at(price);
        let current = position.leverage_ratio();
        if current < toward {
            self.lever(position.lever_notional(toward), toward, price)
        } else if current > toward {
            let exec = self.strategy.execution.clone();
            self.delever(
                position.delever_notional(toward),
                exec.slippage,
                exec.max_trade_size,
                Some(toward),
                price,
            )
        } else {
            Ok(TradeOutcome::Skipped(SkipReason::ZeroNotional))
        }
    }

    fn twap_cooldown_elapsed(&self) -> bool {
        self.clock.time.secs_since(self.last_trade_at) >= self.strategy.execution.twap_cooldown_secs
    }

    fn record_rebalance(
        &mut self,
        caller: &Caller,
        kind: RebalanceKind,
        leverage_before: Leverage,
        toward: Leverage,
        trade: &TradeOutcome,
    ) {
        let direction: Option<SwapDirection> = trade.swap().map(|s| s.direction);
        let notional: Amount = trade.amount_in();
        tracing::info!(
            caller = %caller.address,
            ?kind,
            leverage = %leverage_before,
            %toward,
            ?direction,
            %notional,
            "rebalanced"
        );
        self.emit_event(EventPayload::Rebalanced(RebalancedEvent {
            caller: caller.address,
            kind,
            leverage_before,
            toward,
            direction,
            notional,
        }));
    }
}

/// `current ± |current - target| × speed`, never past target.
pub fn recenter(current: Leverage, target: Leverage, speed: Decimal) -> Leverage {
    let gap = (current.value() - target.value()).abs() * speed;
    if current < target {
        Leverage::saturating((current.value() + gap).min(target.value()))
    } else {
        Leverage::saturating((current.value() - gap).max(target.value()))
    }
}
