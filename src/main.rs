//! Leverage control core simulation.
//!
//! Runs scripted scenarios against the in-memory lending market, swap venue and
//! price feed: engaging and stepping to target, partial recentering, a price crash
//! with ripcord, a venue that never settles, and the lending market tightening LTV.
//!
//! Usage: `leverage-sim [config.json]`. Logging follows `RUST_LOG` (default `info`).

use leverage_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use tracing_subscriber::EnvFilter;

type SimEngine = Engine<InMemoryLendingMarket, MockVenue, MockPriceFeed>;
type SimResult = Result<(), Box<dyn Error>>;

const KEEPER: Address = Address(1);
const STRANGER: Address = Address(999);
const BLOCK_SECS: u64 = 12;

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => StrategyConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => StrategyConfig::default(),
    };

    println!("Leverage Control Core Simulation");
    println!("Strategy: {}, target {}\n", config.name, config.leverage.target);

    scenario_1_engage_to_target(&config)?;
    scenario_2_partial_recentering(&config)?;
    scenario_3_crash_and_ripcord(&config)?;
    scenario_4_venue_timeout(&config)?;
    scenario_5_ltv_tightening(&config)?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Deploys an engine at 2000 with 10 collateral deposited and the keeper allowed.
/// The simulated clock starts at wall-clock time.
fn setup(config: &StrategyConfig) -> Result<(SimEngine, Capabilities), Box<dyn Error>> {
    let start = Timestamp::now();
    let price = Price::new_unchecked(dec!(2000));
    let externals = Externals {
        market: InMemoryLendingMarket::new(
            config.collateral.clone(),
            config.debt.clone(),
            price,
            Fraction::new_unchecked(dec!(0.8)),
            Fraction::new_unchecked(dec!(0.85)),
            Amount::new(dec!(10_000_000)),
        ),
        venue: MockVenue::new(),
        feed: MockPriceFeed::new(price, start),
    };

    let (mut engine, caps) = Engine::deploy(
        config.clone(),
        EngineConfig::default(),
        externals,
        Clock::new(1, start),
    )?;
    engine.allow_caller(&caps.owner, KEEPER)?;
    engine.deposit(Caller::external(config.adapter), Amount::new(dec!(10)))?;
    engine.fund_reward(Amount::new(dec!(5)));
    Ok((engine, caps))
}

/// Fills the pending order at the oracle price and applies the proceeds.
fn settle_at_oracle(engine: &mut SimEngine) -> Result<CompleteResult, Box<dyn Error>> {
    let pending = *engine.lifecycle().pending().ok_or(EngineError::SwapNotPending)?;
    let fair = quote(
        pending.direction,
        pending.amount,
        engine.oracle().twap_price(),
        Bps::new(0),
        &engine.strategy().collateral,
        &engine.strategy().debt,
    )
    .fair_output;
    engine.settle_order(pending.order_id, fair)?;
    Ok(engine.complete_swap(Caller::external(KEEPER))?)
}

/// Moves feed and lending market to `price` and lets enough blocks pass for the
/// smoothed price to catch up.
fn move_price(engine: &mut SimEngine, price: Decimal, blocks: u64) -> SimResult {
    let price = Price::new(price).ok_or("price must be positive")?;
    engine.advance(blocks, blocks * BLOCK_SECS);
    let now = engine.time();
    engine.feed_mut().set_price(price, now);
    engine.market_mut().set_price(price);
    engine.update_oracle()?;
    Ok(())
}

fn clock_label(time: Timestamp) -> String {
    match time.to_datetime() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{}ms", time.as_millis()),
    }
}

fn step(engine: &mut SimEngine) {
    engine.advance(5, 5 * BLOCK_SECS);
}

/// Engage, then iterate until the sequence clears.
fn scenario_1_engage_to_target(config: &StrategyConfig) -> SimResult {
    println!("Scenario 1: Engage and step to target\n");

    let mut config = config.clone();
    config.execution.max_trade_size = Amount::new(dec!(2));
    let (mut engine, _caps) = setup(&config)?;

    let engaged = engine.engage(Caller::external(KEEPER))?;
    println!("  Engaged with {} collateral, first trade {}", engaged.collateral, engaged.trade.amount_in());
    settle_at_oracle(&mut engine)?;
    println!("  Leverage after first step: {}", engine.current_leverage_ratio());

    while engine.twap_target().is_some() {
        step(&mut engine);
        let result = engine.iterate_rebalance(Caller::external(KEEPER))?;
        settle_at_oracle(&mut engine)?;
        println!(
            "  Step from {} -> {} (cleared: {})",
            result.leverage_before,
            engine.current_leverage_ratio(),
            result.twap_cleared
        );
    }

    println!("  Real assets: {}\n", engine.real_assets());
    Ok(())
}

/// Price rises out of the band; one rebalance closes half the gap.
fn scenario_2_partial_recentering(config: &StrategyConfig) -> SimResult {
    println!("Scenario 2: Partial recentering\n");

    let (mut engine, _caps) = setup(config)?;
    engine.engage(Caller::external(KEEPER))?;
    settle_at_oracle(&mut engine)?;
    while engine.twap_target().is_some() {
        step(&mut engine);
        engine.iterate_rebalance(Caller::external(KEEPER))?;
        settle_at_oracle(&mut engine)?;
    }
    println!("  At target: {}", engine.current_leverage_ratio());

    move_price(&mut engine, dec!(2500), 30)?;
    println!("  Price 2500, leverage {}, decision {:?}", engine.current_leverage_ratio(), engine.should_rebalance());

    let result = engine.rebalance(Caller::external(KEEPER))?;
    settle_at_oracle(&mut engine)?;
    println!(
        "  Recentered toward {}, now {}\n",
        result.toward,
        engine.current_leverage_ratio()
    );
    Ok(())
}

/// Price crash pushes leverage past the ripcord; a stranger unwinds and is paid.
fn scenario_3_crash_and_ripcord(config: &StrategyConfig) -> SimResult {
    println!("Scenario 3: Crash and ripcord\n");

    let (mut engine, _caps) = setup(config)?;
    engine.engage(Caller::external(KEEPER))?;
    settle_at_oracle(&mut engine)?;
    step(&mut engine);
    engine.iterate_rebalance(Caller::external(KEEPER))?;
    settle_at_oracle(&mut engine)?;

    move_price(&mut engine, dec!(1600), 30)?;
    println!("  Price 1600, leverage {}, decision {:?}", engine.current_leverage_ratio(), engine.should_rebalance());

    let stranger = Caller::external(STRANGER);
    let result = engine.ripcord(stranger)?;
    println!("  Ripcord sold {}, reward {}", result.trade.amount_in(), engine.paid_to(STRANGER));
    settle_at_oracle(&mut engine)?;
    println!("  Leverage after unwind: {}\n", engine.current_leverage_ratio());
    Ok(())
}

/// Venue never fills; after the timeout the keeper cancels.
fn scenario_4_venue_timeout(config: &StrategyConfig) -> SimResult {
    println!("Scenario 4: Venue timeout\n");

    let (mut engine, _caps) = setup(config)?;
    engine.engage(Caller::external(KEEPER))?;
    println!("  Requested at {}", clock_label(engine.lifecycle().pending_timestamp()));

    match engine.cancel_timed_out_swap(Caller::external(KEEPER)) {
        Err(e) => println!("  Early cancel refused: {}", e),
        Ok(_) => println!("  Early cancel unexpectedly accepted"),
    }

    engine.advance(300, SWAP_TIMEOUT_SECS);
    let cancelled = engine.cancel_timed_out_swap(Caller::external(KEEPER))?;
    println!(
        "  Cancelled order {:?} at {}, {} of asset {:?} left at the venue",
        cancelled.order_id,
        clock_label(engine.time()),
        cancelled.stranded_amount,
        cancelled.stranded_asset
    );
    println!("  Lifecycle idle: {}\n", engine.lifecycle().is_idle());
    Ok(())
}

/// The lending market cuts LTV below what the target needs.
fn scenario_5_ltv_tightening(config: &StrategyConfig) -> SimResult {
    println!("Scenario 5: LTV tightening\n");

    let (mut engine, _caps) = setup(config)?;
    engine.market_mut().set_ltv(Fraction::new_unchecked(dec!(0.4)));

    let valid = engine.sync_ltv()?;
    println!("  LTV valid: {}, strategy active: {}", valid, engine.is_active());

    match engine.engage(Caller::external(KEEPER)) {
        Err(e) => println!("  Engage refused: {}", e),
        Ok(_) => println!("  Engage unexpectedly accepted"),
    }
    println!();
    Ok(())
}
