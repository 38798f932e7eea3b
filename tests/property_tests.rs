//! Property-Based Tests
//!
//! Invariants that must hold for any inputs: leverage math bounds, conversion
//! rounding, oracle smoothing limits, the borrow bound and lifecycle consistency.

mod common;

use common::*;
use leverage_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Collateral amounts between 0.001 and 1000.
fn collateral_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000u64).prop_map(|v| Decimal::new(v as i64, 3))
}

/// Prices between 1 and 100000 with two decimals.
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100u64..10_000_000u64).prop_map(|v| Decimal::new(v as i64, 2))
}

/// LTVs that still support a 2x target, 0.55 to 0.90.
fn supporting_ltv_strategy() -> impl Strategy<Value = Decimal> {
    (55u64..=90u64).prop_map(|v| Decimal::new(v as i64, 2))
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (1_000u64..10_000u64).prop_map(|v| Decimal::new(v as i64, 3))
}

#[derive(Debug, Clone)]
enum Op {
    Engage,
    Settle,
    Complete,
    Iterate,
    Wait(u64),
    Cancel,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Engage),
        Just(Op::Settle),
        Just(Op::Complete),
        Just(Op::Iterate),
        (1u64..4_000u64).prop_map(Op::Wait),
        Just(Op::Cancel),
    ]
}

fn weth() -> AssetInfo {
    StrategyConfig::default().collateral
}

fn usdc() -> AssetInfo {
    StrategyConfig::default().debt
}

/// Leverage ratio and trade sizing.
mod leverage_props {
    use super::*;

    proptest! {
        #[test]
        fn leverage_never_below_one(
            collateral in collateral_strategy(),
            debt_share in 0u64..100u64,
        ) {
            let debt = collateral * Decimal::new(debt_share as i64, 2);
            let leverage = leverage_ratio(amt(collateral), amt(debt));
            prop_assert!(leverage >= Leverage::ONE);
            if debt.is_zero() {
                prop_assert_eq!(leverage, Leverage::ONE);
            }
        }

        #[test]
        fn lever_notional_lands_on_target(
            collateral in collateral_strategy(),
            debt_share in 0u64..50u64,
            target in leverage_strategy(),
        ) {
            let debt = collateral * Decimal::new(debt_share as i64, 2);
            let position = PositionState::new(amt(collateral), amt(debt));
            let target = Leverage::new(target).unwrap();
            prop_assume!(position.leverage_ratio() < target);

            let notional = position.lever_notional(target);
            let after = position.projected_after_lever(notional);
            prop_assert!((after.value() - target.value()).abs() < dec!(0.000001));
        }

        #[test]
        fn recenter_stays_between_current_and_target(
            current in leverage_strategy(),
            target in leverage_strategy(),
            speed in 1u64..=100u64,
        ) {
            let current = Leverage::new(current).unwrap();
            let target = Leverage::new(target).unwrap();
            let toward = recenter(current, target, Decimal::new(speed as i64, 2));

            let (low, high) = if current < target { (current, target) } else { (target, current) };
            prop_assert!(toward >= low && toward <= high);
            if speed == 100 {
                prop_assert_eq!(toward, target);
            }
        }
    }
}

/// Asset conversions through a price.
mod conversion_props {
    use super::*;

    proptest! {
        #[test]
        fn conversion_truncates_toward_zero(
            collateral in collateral_strategy(),
            price in price_strategy(),
        ) {
            let converted = Price::new_unchecked(price).collateral_to_debt(amt(collateral), &usdc());
            prop_assert!(converted.value() <= collateral * price);
            prop_assert!(collateral * price - converted.value() < usdc().unit().value());
        }

        #[test]
        fn debt_round_trip_within_one_unit(
            micros in 1u64..1_000_000_000_000u64,
            price in price_strategy(),
        ) {
            let debt = amt(Decimal::new(micros as i64, 6));
            let price = Price::new_unchecked(price);

            let back = price.collateral_to_debt(price.debt_to_collateral(debt, &weth()), &usdc());
            prop_assert!(back <= debt);
            prop_assert!(debt.value() - back.value() <= usdc().unit().value());
        }
    }
}

/// Per block smoothing bounds.
mod oracle_props {
    use super::*;

    proptest! {
        #[test]
        fn smoothing_step_is_bounded(
            current in price_strategy(),
            target in price_strategy(),
            blocks in 0u64..200u64,
        ) {
            let rate = Fraction::new_unchecked(dec!(0.01));
            let current = Price::new_unchecked(current);
            let target = Price::new_unchecked(target);
            let next = step_toward(current, target, rate, blocks);

            // never overshoots
            let (low, high) = if current < target { (current, target) } else { (target, current) };
            prop_assert!(next >= low && next <= high);

            // never moves more than rate per block
            let max_move = (dec!(0.01) * Decimal::from(blocks)).min(Decimal::ONE);
            prop_assert!((next.value() - current.value()).abs() <= current.value() * max_move);
        }
    }
}

/// Engine level invariants over random inputs and call sequences.
mod engine_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn borrow_stays_within_ltv(
            collateral in (1_000u64..1_000_000u64).prop_map(|v| Decimal::new(v as i64, 3)),
            price in (500u64..5_000u64).prop_map(Decimal::from),
            ltv in supporting_ltv_strategy(),
        ) {
            let (mut engine, _caps) = deploy_with(StrategyConfig::default(), price, ltv);
            engine.deposit(adapter(), amt(collateral)).unwrap();

            let limit = |engine: &TestEngine| collateral_balance(engine).value() * price * ltv;

            engine.engage(keeper()).unwrap();
            prop_assert!(debt_balance(&engine).value() <= limit(&engine));
            settle_fair(&mut engine);
            prop_assert!(debt_balance(&engine).value() <= limit(&engine));

            for _ in 0..3 {
                if engine.twap_target().is_none() {
                    break;
                }
                cooldown(&mut engine);
                let result = engine.iterate_rebalance(keeper()).unwrap();
                if result.trade.is_requested() {
                    prop_assert!(debt_balance(&engine).value() <= limit(&engine));
                    settle_fair(&mut engine);
                }
                prop_assert!(debt_balance(&engine).value() <= limit(&engine));
            }

            let bound = safe_max_leverage(Fraction::new_unchecked(ltv));
            prop_assert!(engine.current_leverage_ratio() <= bound);
        }

        #[test]
        fn lifecycle_fields_consistent(ops in prop::collection::vec(op_strategy(), 1..16)) {
            let (mut engine, _caps) = funded();

            for op in ops {
                match op {
                    Op::Engage => {
                        let _ = engine.engage(keeper());
                    }
                    Op::Settle => {
                        if let Some(swap) = engine.lifecycle().pending().copied() {
                            let out = fair_output(&engine);
                            let _ = engine.settle_order(swap.order_id, out);
                        }
                    }
                    Op::Complete => {
                        let _ = engine.complete_swap(keeper());
                    }
                    Op::Iterate => {
                        let _ = engine.iterate_rebalance(keeper());
                    }
                    Op::Wait(secs) => {
                        engine.advance(secs / BLOCK_SECS + 1, secs);
                        touch_feed(&mut engine);
                    }
                    Op::Cancel => {
                        let _ = engine.cancel_timed_out_swap(keeper());
                    }
                }

                let lifecycle = engine.lifecycle();
                prop_assert_eq!(lifecycle.is_idle(), lifecycle.pending_amount().is_zero());
                prop_assert_eq!(lifecycle.is_idle(), lifecycle.pending_timestamp().is_zero());
                prop_assert_eq!(lifecycle.is_idle(), lifecycle.direction().is_none());
                prop_assert_eq!(lifecycle.is_idle(), lifecycle.expected_output().is_zero());

                let limit = collateral_balance(&engine).value() * dec!(2000) * dec!(0.8);
                prop_assert!(debt_balance(&engine).value() <= limit);
            }
        }
    }
}
