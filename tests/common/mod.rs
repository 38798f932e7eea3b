//! Shared setup for the integration tests.
//!
//! WETH (18 decimals) collateral against USDC (6 decimals) debt at 2000, LTV 0.8,
//! default strategy bands 1.7 / 2.0 / 2.3 / ripcord 2.5.

#![allow(dead_code)]

use leverage_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub type TestEngine = Engine<InMemoryLendingMarket, MockVenue, MockPriceFeed>;

pub const KEEPER: Address = Address(1);
pub const ADAPTER: Address = Address(200);
pub const ACCOUNT: Address = Address(100);
pub const STRANGER: Address = Address(999);
pub const WETH: AssetId = AssetId(1);
pub const USDC: AssetId = AssetId(2);
pub const START_SECS: i64 = 1_700_000_000;
pub const BLOCK_SECS: u64 = 12;

pub fn amt(v: Decimal) -> Amount {
    Amount::new(v)
}

pub fn keeper() -> Caller {
    Caller::external(KEEPER)
}

pub fn adapter() -> Caller {
    Caller::external(ADAPTER)
}

pub fn market(price: Decimal, ltv: Decimal) -> InMemoryLendingMarket {
    let config = StrategyConfig::default();
    InMemoryLendingMarket::new(
        config.collateral,
        config.debt,
        Price::new_unchecked(price),
        Fraction::new_unchecked(ltv),
        Fraction::new_unchecked(dec!(0.85)),
        amt(dec!(1_000_000_000_000)),
    )
}

/// Deployed engine with the keeper allowed. No collateral yet.
pub fn deploy_with(config: StrategyConfig, price: Decimal, ltv: Decimal) -> (TestEngine, Capabilities) {
    let start = Timestamp::from_secs(START_SECS);
    let externals = Externals {
        market: market(price, ltv),
        venue: MockVenue::new(),
        feed: MockPriceFeed::new(Price::new_unchecked(price), start),
    };
    let (mut engine, caps) =
        Engine::deploy(config, EngineConfig::default(), externals, Clock::new(1, start)).unwrap();
    engine.allow_caller(&caps.owner, KEEPER).unwrap();
    (engine, caps)
}

pub fn deploy() -> (TestEngine, Capabilities) {
    deploy_with(StrategyConfig::default(), dec!(2000), dec!(0.8))
}

/// 10 WETH deposited and 5 native tokens of ripcord reward funded.
pub fn funded_with(config: StrategyConfig) -> (TestEngine, Capabilities) {
    let (mut engine, caps) = deploy_with(config, dec!(2000), dec!(0.8));
    engine.deposit(adapter(), amt(dec!(10))).unwrap();
    engine.fund_reward(amt(dec!(5)));
    (engine, caps)
}

pub fn funded() -> (TestEngine, Capabilities) {
    funded_with(StrategyConfig::default())
}

/// Engaged and stepped to exactly 2.0x: 20 WETH collateral, 20000 USDC debt.
pub fn at_target() -> (TestEngine, Capabilities) {
    let (mut engine, caps) = funded();
    engine.engage(keeper()).unwrap();
    settle_fair(&mut engine);
    cooldown(&mut engine);
    engine.iterate_rebalance(keeper()).unwrap();
    settle_fair(&mut engine);
    (engine, caps)
}

/// Lets the default multi step cooldown pass.
pub fn cooldown(engine: &mut TestEngine) {
    engine.advance(5, 60);
}

pub fn pending(engine: &TestEngine) -> PendingSwap {
    *engine.lifecycle().pending().expect("swap pending")
}

/// Oracle-fair output of the pending swap.
pub fn fair_output(engine: &TestEngine) -> Amount {
    let swap = pending(engine);
    quote(
        swap.direction,
        swap.amount,
        engine.oracle().twap_price(),
        Bps::new(0),
        &engine.strategy().collateral,
        &engine.strategy().debt,
    )
    .fair_output
}

/// Fills the pending order at the oracle price and completes it.
pub fn settle_fair(engine: &mut TestEngine) -> CompleteResult {
    let swap = pending(engine);
    let out = fair_output(engine);
    engine.settle_order(swap.order_id, out).unwrap();
    engine.complete_swap(keeper()).unwrap()
}

/// Moves feed and lending market to `price` over `blocks`, then refreshes the oracle.
pub fn move_price(engine: &mut TestEngine, price: Decimal, blocks: u64) {
    let price = Price::new_unchecked(price);
    engine.advance(blocks, blocks * BLOCK_SECS);
    let now = engine.time();
    engine.feed_mut().set_price(price, now);
    engine.market_mut().set_price(price);
    engine.update_oracle().unwrap();
}

/// Keeps the feed fresh at its current price.
pub fn touch_feed(engine: &mut TestEngine) {
    let price = engine.oracle().feed().latest_price().price;
    let now = engine.time();
    engine.feed_mut().set_price(price, now);
}

pub fn debt_balance(engine: &TestEngine) -> Amount {
    engine.market().debt_balance(ACCOUNT, USDC)
}

pub fn collateral_balance(engine: &TestEngine) -> Amount {
    engine.market().collateral_balance(ACCOUNT, WETH)
}

pub fn assert_close(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} within {} of {}",
        actual,
        tolerance,
        expected
    );
}

pub fn count_events(engine: &TestEngine, kind: &str) -> usize {
    engine.events().iter().filter(|e| e.kind() == kind).count()
}
