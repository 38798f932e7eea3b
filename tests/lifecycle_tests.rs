//! Lifecycle Tests
//!
//! Walks a position through engage, settlement, multi step iteration, recentering
//! after price moves, and the vault adapter's deposits and withdrawals.

mod common;

use common::*;
use leverage_core::*;
use rust_decimal_macros::dec;

/// Engaging and stepping a capped sequence to target.
mod engage_tests {
    use super::*;

    #[test]
    fn engage_borrows_within_capacity_and_arms_target() {
        let (mut engine, _caps) = funded();

        let result = engine.engage(keeper()).unwrap();

        assert_eq!(result.collateral.value(), dec!(10));
        assert_eq!(result.target.value(), dec!(2));
        match result.trade {
            TradeOutcome::Requested {
                swap,
                min_out,
                capped,
                capacity_limited,
            } => {
                assert_eq!(swap.direction, SwapDirection::Lever);
                assert_eq!(swap.amount.value(), dec!(15200));
                assert_eq!(min_out.value(), dec!(7.562));
                assert_eq!(swap.expected_output.value(), dec!(7.524));
                assert!(!capped);
                assert!(capacity_limited);
            }
            other => panic!("expected a swap request, got {:?}", other),
        }

        // borrowed funds went to the venue, nothing sits idle
        assert_eq!(debt_balance(&engine).value(), dec!(15200));
        assert_eq!(engine.venue().held(USDC).value(), dec!(15200));
        assert!(engine.holding(USDC).is_zero());

        assert_eq!(engine.lifecycle().direction(), Some(SwapDirection::Lever));
        assert_eq!(engine.lifecycle().pending_timestamp(), engine.time());
        assert_eq!(engine.twap_target().map(|t| t.value()), Some(dec!(2)));
        assert_eq!(count_events(&engine, "engaged"), 1);
        assert_eq!(count_events(&engine, "swap_requested"), 1);
    }

    #[test]
    fn completion_supplies_proceeds() {
        let (mut engine, _caps) = funded();
        engine.engage(keeper()).unwrap();

        let completed = settle_fair(&mut engine);

        assert_eq!(completed.direction, SwapDirection::Lever);
        assert_eq!(completed.amount_out.value(), dec!(7.6));
        assert!(completed.surplus.is_zero());
        assert_eq!(completed.leverage_after.value(), dec!(1.76));
        assert_eq!(collateral_balance(&engine).value(), dec!(17.6));

        assert!(engine.lifecycle().is_idle());
        assert!(engine.lifecycle().pending_amount().is_zero());
        assert!(engine.lifecycle().pending_timestamp().is_zero());
        assert!(engine.holding(WETH).is_zero());
        // the sequence is still armed
        assert!(engine.twap_target().is_some());
    }

    #[test]
    fn iterate_reaches_target_and_clears() {
        let (mut engine, _caps) = funded();
        engine.engage(keeper()).unwrap();
        settle_fair(&mut engine);

        assert_eq!(engine.should_rebalance(), RebalanceAction::None);
        cooldown(&mut engine);
        assert_eq!(engine.should_rebalance(), RebalanceAction::Iterate);

        let result = engine.iterate_rebalance(keeper()).unwrap();
        assert_eq!(result.leverage_before.value(), dec!(1.76));
        assert_eq!(result.trade.amount_in().value(), dec!(4800));
        assert!(result.twap_cleared);
        assert!(engine.twap_target().is_none());

        settle_fair(&mut engine);
        assert_eq!(engine.current_leverage_ratio().value(), dec!(2));
        assert_eq!(collateral_balance(&engine).value(), dec!(20));
        assert_eq!(debt_balance(&engine).value(), dec!(20000));
        assert_eq!(count_events(&engine, "twap_cleared"), 1);
    }

    #[test]
    fn iterate_respects_cooldown() {
        let (mut engine, _caps) = funded();
        engine.engage(keeper()).unwrap();
        settle_fair(&mut engine);

        assert_eq!(
            engine.iterate_rebalance(keeper()).unwrap_err(),
            EngineError::RebalanceIntervalNotElapsed
        );

        cooldown(&mut engine);
        assert!(engine.iterate_rebalance(keeper()).is_ok());
    }

    #[test]
    fn iterate_without_sequence_fails() {
        let (mut engine, _caps) = at_target();
        cooldown(&mut engine);

        assert_eq!(engine.iterate_rebalance(keeper()).unwrap_err(), EngineError::TwapNotActive);
    }

    #[test]
    fn capped_trades_step_monotonically_to_target() {
        let mut config = StrategyConfig::default();
        config.execution.max_trade_size = amt(dec!(2));
        let (mut engine, _caps) = funded_with(config);

        let engaged = engine.engage(keeper()).unwrap();
        assert!(matches!(engaged.trade, TradeOutcome::Requested { capped: true, .. }));
        assert_eq!(engaged.trade.amount_in().value(), dec!(4000));
        settle_fair(&mut engine);

        let mut seen = vec![engine.current_leverage_ratio().value()];
        let mut cleared_at = None;
        for step in 0..10 {
            if engine.twap_target().is_none() {
                break;
            }
            cooldown(&mut engine);
            let result = engine.iterate_rebalance(keeper()).unwrap();
            if result.twap_cleared {
                cleared_at = Some(step);
            }
            settle_fair(&mut engine);
            seen.push(engine.current_leverage_ratio().value());
        }

        assert_eq!(seen, vec![dec!(1.2), dec!(1.4), dec!(1.6), dec!(1.8), dec!(2)]);
        assert_eq!(cleared_at, Some(3));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn engage_without_liquidity_arms_but_skips() {
        let (mut engine, _caps) = funded();
        engine.market_mut().set_liquidity(Amount::zero());

        let result = engine.engage(keeper()).unwrap();

        assert_eq!(result.trade, TradeOutcome::Skipped(SkipReason::NoBorrowCapacity));
        assert!(engine.lifecycle().is_idle());
        assert!(debt_balance(&engine).is_zero());
        assert_eq!(engine.twap_target().map(|t| t.value()), Some(dec!(2)));
    }

    #[test]
    fn thin_liquidity_limits_borrow() {
        let (mut engine, _caps) = funded();
        engine.market_mut().set_liquidity(amt(dec!(1000)));

        let result = engine.engage(keeper()).unwrap();

        assert!(matches!(
            result.trade,
            TradeOutcome::Requested {
                capacity_limited: true,
                ..
            }
        ));
        assert_eq!(result.trade.amount_in().value(), dec!(950));
    }
}

/// Partial recentering after the price leaves the band.
mod recentering_tests {
    use super::*;

    #[test]
    fn price_rise_recenters_half_way() {
        let (mut engine, _caps) = at_target();

        move_price(&mut engine, dec!(2500), 30);
        assert_eq!(engine.oracle().twap_price().value(), dec!(2500));
        assert_close(engine.current_leverage_ratio().value(), dec!(1.6666667), dec!(0.000001));
        assert_eq!(engine.should_rebalance(), RebalanceAction::Rebalance);

        let result = engine.rebalance(keeper()).unwrap();
        assert_close(result.toward.value(), dec!(1.8333333), dec!(0.000001));
        assert!(!result.twap_cleared);
        let swap = *result.trade.swap().unwrap();
        assert_eq!(swap.direction, SwapDirection::Lever);
        assert_close(swap.amount.value(), dec!(5000), dec!(0.01));

        settle_fair(&mut engine);
        assert_close(engine.current_leverage_ratio().value(), dec!(1.8333333), dec!(0.000001));
        // within the per trade cap, so no sequence
        assert!(engine.twap_target().is_none());
        assert_eq!(engine.should_rebalance(), RebalanceAction::None);
    }

    #[test]
    fn price_drop_delevers_half_way() {
        let (mut engine, _caps) = at_target();

        move_price(&mut engine, dec!(1750), 30);
        assert_close(engine.current_leverage_ratio().value(), dec!(2.3333333), dec!(0.000001));
        assert_eq!(engine.should_rebalance(), RebalanceAction::Rebalance);

        let result = engine.rebalance(keeper()).unwrap();
        let swap = *result.trade.swap().unwrap();
        assert_eq!(swap.direction, SwapDirection::Delever);
        assert_close(swap.amount.value(), dec!(1.4285714), dec!(0.000001));

        let completed = settle_fair(&mut engine);
        assert_eq!(completed.direction, SwapDirection::Delever);
        assert_close(completed.amount_out.value(), dec!(2500), dec!(0.001));
        assert!(completed.surplus.is_zero());
        assert_close(engine.current_leverage_ratio().value(), dec!(2.1666667), dec!(0.000001));
    }

    #[test]
    fn rebalance_inside_band_waits_for_interval() {
        let (mut engine, _caps) = at_target();

        move_price(&mut engine, dec!(2060), 30);
        let leverage = engine.current_leverage_ratio();
        assert!(leverage.value() > dec!(1.7) && leverage.value() < dec!(2.3));

        assert_eq!(engine.should_rebalance(), RebalanceAction::None);
        assert_eq!(
            engine.rebalance(keeper()).unwrap_err(),
            EngineError::RebalanceIntervalNotElapsed
        );

        engine.advance(7_200, 86_400);
        assert_eq!(engine.should_rebalance(), RebalanceAction::Rebalance);

        touch_feed(&mut engine);
        let result = engine.rebalance(keeper()).unwrap();
        assert_eq!(result.trade.swap().map(|s| s.direction), Some(SwapDirection::Lever));
        assert_eq!(engine.last_rebalance_at(), engine.time());
    }

    #[test]
    fn unlevered_position_waits_for_engage() {
        let (mut engine, _caps) = funded();
        engine.advance(7_200, 86_400);

        // 1x sits under min, but engage is the way in
        assert!(engine.current_leverage_ratio() < engine.strategy().leverage.min);
        assert_eq!(engine.should_rebalance(), RebalanceAction::None);

        touch_feed(&mut engine);
        assert_eq!(
            engine.rebalance(keeper()).unwrap_err(),
            EngineError::RebalanceIntervalNotElapsed
        );
    }

    #[test]
    fn inside_dead_band_never_rebalances() {
        let (mut engine, _caps) = at_target();

        move_price(&mut engine, dec!(2010), 30);
        engine.advance(7_200, 86_400);

        // deviation is about 0.5%, under the 1% dead band
        assert_eq!(engine.should_rebalance(), RebalanceAction::None);
    }
}

/// Deposits, withdrawals and the real assets read.
mod vault_tests {
    use super::*;

    #[test]
    fn only_adapter_moves_collateral() {
        let (mut engine, _caps) = deploy();

        assert_eq!(
            engine.deposit(keeper(), amt(dec!(10))).unwrap_err(),
            EngineError::NotAdapter(KEEPER)
        );

        let after = engine.deposit(adapter(), amt(dec!(10))).unwrap();
        assert_eq!(after.value(), dec!(10));
        assert_eq!(engine.real_assets().value(), dec!(10));

        assert_eq!(
            engine.withdraw(keeper(), amt(dec!(1))).unwrap_err(),
            EngineError::NotAdapter(KEEPER)
        );
        assert!(matches!(
            engine.withdraw(adapter(), amt(dec!(11))),
            Err(EngineError::InsufficientAssets { .. })
        ));

        let withdrawn = engine.withdraw(adapter(), amt(dec!(4))).unwrap();
        assert_eq!(withdrawn.value(), dec!(4));
        assert_eq!(collateral_balance(&engine).value(), dec!(6));
        assert_eq!(count_events(&engine, "deposited"), 1);
        assert_eq!(count_events(&engine, "withdrawn"), 1);
    }

    #[test]
    fn withdraw_keeps_leverage_under_max() {
        let (mut engine, _caps) = at_target();

        assert!(matches!(
            engine.withdraw(adapter(), amt(dec!(3))),
            Err(EngineError::LeverageTooHigh { .. })
        ));

        engine.withdraw(adapter(), amt(dec!(1))).unwrap();
        assert_close(engine.current_leverage_ratio().value(), dec!(2.1111111), dec!(0.000001));
    }

    #[test]
    fn vault_is_closed_while_swap_pending() {
        let (mut engine, _caps) = funded();
        engine.engage(keeper()).unwrap();

        assert_eq!(engine.deposit(adapter(), amt(dec!(1))).unwrap_err(), EngineError::SwapPending);
        assert_eq!(engine.withdraw(adapter(), amt(dec!(1))).unwrap_err(), EngineError::SwapPending);
    }

    #[test]
    fn real_assets_count_swap_in_flight() {
        let (mut engine, _caps) = funded();
        assert_eq!(engine.real_assets().value(), dec!(10));

        engine.engage(keeper()).unwrap();
        // 2.4 equity at the market plus 7.6 worth of debt asset at the venue
        assert_eq!(engine.real_assets().value(), dec!(10));

        let swap = pending(&engine);
        engine.settle_order(swap.order_id, amt(dec!(7.6))).unwrap();
        // output arrived but is not applied yet
        assert_eq!(engine.holding(WETH).value(), dec!(7.6));
        assert_eq!(engine.real_assets().value(), dec!(10));

        engine.complete_swap(keeper()).unwrap();
        assert_eq!(engine.real_assets().value(), dec!(10));
    }
}
