// 8.0 engine/core.rs: main engine. owns the oracle, the price checker, the lending market
// and swap venue handles, the swap lifecycle and the audit log.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::access::{AccessControl, Caller, Capabilities};
use crate::config::StrategyConfig;
use crate::events::{Event, EventId, EventPayload};
use crate::lending::LendingMarket;
use crate::oracle::{PriceFeed, SmoothingOracle};
use crate::position::{ltv_supports, PositionState};
use crate::swap::{PriceChecker, SwapState, SwapVenue};
use crate::types::{Address, Amount, AssetId, Clock, Fraction, Leverage, Price, Timestamp};
use std::collections::{BTreeMap, HashMap};

/// External collaborators handed to the engine at deployment.
#[derive(Debug, Clone)]
pub struct Externals<M, V, F> {
    pub market: M,
    pub venue: V,
    pub feed: F,
}

/** 8.1: main engine struct. all state lives here */
#[derive(Debug, Clone)]
pub struct Engine<M, V, F> {
    pub(super) strategy: StrategyConfig,
    pub(super) config: EngineConfig,
    pub(super) access: AccessControl,
    pub(super) oracle: SmoothingOracle<F>,
    pub(super) checker: PriceChecker,
    pub(super) market: M,
    pub(super) venue: V,
    pub(super) lifecycle: SwapState,
    pub(super) twap_target: Option<Leverage>,
    // tokens pushed to the engine and not yet applied
    pub(super) holdings: HashMap<AssetId, Amount>,
    pub(super) native_balance: Amount,
    pub(super) payouts: BTreeMap<Address, Amount>,
    pub(super) last_trade_at: Timestamp,
    pub(super) last_rebalance_at: Timestamp,
    pub(super) clock: Clock,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) entered: bool,
}

impl<M, V, F> Engine<M, V, F>
where
    M: LendingMarket + Clone,
    V: SwapVenue + Clone,
    F: PriceFeed + Clone,
{
    /// Validates the strategy, seeds the oracle and mints the role capabilities.
    pub fn deploy(
        strategy: StrategyConfig,
        config: EngineConfig,
        externals: Externals<M, V, F>,
        clock: Clock,
    ) -> Result<(Self, Capabilities), EngineError> {
        strategy.validate()?;

        let ltv = externals.market.ltv(strategy.collateral.id, strategy.debt.id);
        if !ltv_supports(strategy.leverage.target, ltv) {
            return Err(EngineError::LeverageExceedsLTVLimit {
                target: strategy.leverage.target,
                ltv,
            });
        }

        let oracle = SmoothingOracle::new(externals.feed, strategy.oracle.clone(), clock)?;
        let checker = PriceChecker::new(strategy.checker.clone());
        let caps = Capabilities::mint();

        tracing::info!(
            name = %strategy.name,
            target = %strategy.leverage.target,
            %ltv,
            twap = %oracle.twap_price(),
            "strategy deployed"
        );

        let engine = Self {
            access: AccessControl::new(caps.instance()),
            strategy,
            config,
            oracle,
            checker,
            market: externals.market,
            venue: externals.venue,
            lifecycle: SwapState::Idle,
            twap_target: None,
            holdings: HashMap::new(),
            native_balance: Amount::zero(),
            payouts: BTreeMap::new(),
            last_trade_at: Timestamp::default(),
            last_rebalance_at: clock.time,
            clock,
            events: Vec::new(),
            next_event_id: 1,
            entered: false,
        };
        Ok((engine, caps))
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn time(&self) -> Timestamp {
        self.clock.time
    }

    /// Moves the chain forward. Nothing else happens until someone calls in.
    pub fn advance(&mut self, blocks: u64, secs: u64) {
        self.clock.advance(blocks, secs);
    }

    pub fn lifecycle(&self) -> &SwapState {
        &self.lifecycle
    }

    pub fn twap_target(&self) -> Option<Leverage> {
        self.twap_target
    }

    pub fn is_active(&self) -> bool {
        self.access.is_active
    }

    pub fn is_allowed(&self, address: Address) -> bool {
        self.access.is_allowed(address)
    }

    pub fn oracle(&self) -> &SmoothingOracle<F> {
        &self.oracle
    }

    pub fn checker(&self) -> &PriceChecker {
        &self.checker
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    /// Direct handle on the lending market, for moving its prices and limits.
    pub fn market_mut(&mut self) -> &mut M {
        &mut self.market
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn venue_mut(&mut self) -> &mut V {
        &mut self.venue
    }

    pub fn feed_mut(&mut self) -> &mut F {
        self.oracle.feed_mut()
    }

    pub fn last_trade_at(&self) -> Timestamp {
        self.last_trade_at
    }

    pub fn last_rebalance_at(&self) -> Timestamp {
        self.last_rebalance_at
    }

    /// Tokens of `asset` pushed to the engine and not yet applied.
    pub fn holding(&self, asset: AssetId) -> Amount {
        self.holdings.get(&asset).copied().unwrap_or_default()
    }

    pub fn native_balance(&self) -> Amount {
        self.native_balance
    }

    /// Native rewards paid to `address` so far.
    pub fn paid_to(&self, address: Address) -> Amount {
        self.payouts.get(&address).copied().unwrap_or_default()
    }

    /// Token push from outside, e.g. a venue settling an order. No callback runs.
    pub fn receive(&mut self, asset: AssetId, amount: Amount) {
        tracing::debug!(asset = asset.0, %amount, "tokens received");
        self.credit(asset, amount);
    }

    /// Native push funding ripcord rewards.
    pub fn fund_reward(&mut self, amount: Amount) {
        self.native_balance = self.native_balance.add(amount);
    }

    /// Position read from the lending market through the smoothed price.
    pub fn position(&self) -> PositionState {
        self.position_at(self.oracle.twap_price())
    }

    pub fn current_leverage_ratio(&self) -> Leverage {
        self.position().leverage_ratio()
    }

    pub fn is_engaged(&self) -> bool {
        !self.position().is_unlevered()
    }

    pub fn current_ltv(&self) -> Fraction {
        self.market.ltv(self.strategy.collateral.id, self.strategy.debt.id)
    }

    pub fn max_achievable_leverage(&self) -> Leverage {
        crate::position::max_achievable_leverage(self.current_ltv())
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn position_at(&self, price: Price) -> PositionState {
        let account = self.strategy.account;
        let collateral = self.market.collateral_balance(account, self.strategy.collateral.id);
        let debt = self.market.debt_balance(account, self.strategy.debt.id);
        PositionState::from_balances(collateral, debt, price, &self.strategy.collateral)
    }

    /// Runs `op` as one all-or-nothing call. On error every change, including
    /// those made to the market, the venue and the audit log, is rolled back.
    pub(super) fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if self.entered {
            return Err(EngineError::Reentrancy);
        }
        let snapshot = self.clone();
        self.entered = true;
        let result = op(self);
        self.entered = false;
        if let Err(e) = &result {
            tracing::debug!(error = %e, "call reverted");
            *self = snapshot;
        }
        result
    }

    pub(super) fn require_direct(&self, caller: &Caller) -> Result<(), EngineError> {
        if !caller.is_direct() {
            return Err(EngineError::NotDirectCall(caller.address));
        }
        Ok(())
    }

    pub(super) fn require_allowed(&self, caller: &Caller) -> Result<(), EngineError> {
        if !self.access.is_allowed(caller.address) {
            return Err(EngineError::NotAllowedCaller(caller.address));
        }
        Ok(())
    }

    pub(super) fn require_active(&self) -> Result<(), EngineError> {
        if !self.access.is_active {
            return Err(EngineError::StrategyNotActive);
        }
        Ok(())
    }

    pub(super) fn require_idle(&self) -> Result<(), EngineError> {
        if !self.lifecycle.is_idle() {
            return Err(EngineError::SwapPending);
        }
        Ok(())
    }

    pub(super) fn credit(&mut self, asset: AssetId, amount: Amount) {
        let held = self.holdings.entry(asset).or_default();
        *held = held.add(amount);
    }

    /// Removes up to `amount` and returns what was actually held.
    pub(super) fn debit(&mut self, asset: AssetId, amount: Amount) -> Amount {
        let held = self.holdings.entry(asset).or_default();
        let taken = amount.min(*held);
        *held = held.saturating_sub(taken);
        taken
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(
            EventId(self.next_event_id),
            self.clock.block,
            self.clock.time,
            payload,
        );
        self.next_event_id += 1;

        tracing::debug!(id = event.id.0, kind = event.kind(), "event");

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
