// 4.0 swap.rs: the asynchronous trade venue and the gate every trade passes.
// a request hands input tokens plus a minimum output to the venue. the venue settles
// whenever it likes by pushing tokens back, with no callback. the engine reconciles later.
// 4.1 PriceChecker: independent check of the fill price against the smoothed oracle.
// 4.2 MockVenue: in-memory venue used by tests and the simulation.

use crate::types::{Address, Amount, AssetId, AssetInfo, Bps, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A pending request may be cancelled once it has been open this long.
pub const SWAP_TIMEOUT_SECS: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    /// Debt asset in, collateral asset out.
    Lever,
    /// Collateral asset in, debt asset out.
    Delever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSwap {
    pub direction: SwapDirection,
    pub order_id: OrderId,
    pub asset_in: AssetId,
    pub asset_out: AssetId,
    pub amount: Amount,
    pub requested_at: Timestamp,
    /// Settlement floor checked on completion.
    pub expected_output: Amount,
    /// Output asset held outside this order. Only arrivals above it count.
    pub baseline: Amount,
}

impl PendingSwap {
    /// What this order delivered, given the engine now holds `held` of the output asset.
    pub fn received(&self, held: Amount) -> Amount {
        held.saturating_sub(self.baseline)
    }

    pub fn is_timed_out(&self, now: Timestamp) -> bool {
        now.secs_since(self.requested_at) >= SWAP_TIMEOUT_SECS
    }
}

// the only lifecycle state. idle carries no pending fields, so the accessors below
// read zero exactly when idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwapState {
    #[default]
    Idle,
    Pending(PendingSwap),
}

impl SwapState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SwapState::Idle)
    }

    pub fn pending(&self) -> Option<&PendingSwap> {
        match self {
            SwapState::Idle => None,
            SwapState::Pending(p) => Some(p),
        }
    }

    pub fn direction(&self) -> Option<SwapDirection> {
        self.pending().map(|p| p.direction)
    }

    pub fn pending_amount(&self) -> Amount {
        self.pending().map(|p| p.amount).unwrap_or_default()
    }

    pub fn pending_timestamp(&self) -> Timestamp {
        self.pending().map(|p| p.requested_at).unwrap_or_default()
    }

    pub fn expected_output(&self) -> Amount {
        self.pending().map(|p| p.expected_output).unwrap_or_default()
    }
}

/// Output bounds derived from the oracle price for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    /// Oracle-fair output.
    pub fair_output: Amount,
    /// Constraint handed to the venue: one slippage below fair.
    pub min_out: Amount,
    /// Completion floor: two slippages below fair, absorbing drift while pending.
    pub expected_output: Amount,
}

pub fn quote(
    direction: SwapDirection,
    amount_in: Amount,
    price: Price,
    slippage: Bps,
    collateral: &AssetInfo,
    debt: &AssetInfo,
) -> SwapQuote {
    let (fair_output, out_decimals) = match direction {
        SwapDirection::Lever => (price.debt_to_collateral(amount_in, collateral), collateral.decimals),
        SwapDirection::Delever => (price.collateral_to_debt(amount_in, debt), debt.decimals),
    };
    SwapQuote {
        fair_output,
        min_out: slippage.haircut(fair_output).round_to(out_decimals),
        expected_output: slippage.doubled().haircut(fair_output).round_to(out_decimals),
    }
}

/// Data the validity checker needs to judge a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityData {
    pub direction: SwapDirection,
    pub min_out: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub amount_in: Amount,
    pub asset_in: AssetId,
    pub asset_out: AssetId,
    pub recipient: Address,
    pub validity: ValidityData,
}

impl SwapRequest {
    /// Debt per collateral implied by filling this request with `amount_out`.
    pub fn implied_price(&self, amount_out: Amount) -> Option<Price> {
        if self.amount_in.is_zero() || amount_out.is_zero() {
            return None;
        }
        let value = match self.validity.direction {
            SwapDirection::Lever => self.amount_in.value() / amount_out.value(),
            SwapDirection::Delever => amount_out.value() / self.amount_in.value(),
        };
        Price::new(value)
    }
}

// 4.1: price validity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCheckerParams {
    /// Largest tolerated `|implied - twap| / twap`.
    pub max_deviation: Bps,
}

impl Default for PriceCheckerParams {
    fn default() -> Self {
        Self {
            max_deviation: Bps::new(300), // 3%
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceCheckError {
    #[error("Price checker is paused")]
    Paused,

    #[error("Oracle circuit breaker tripped")]
    OracleUnsafe,

    #[error("Fill has no meaningful price")]
    EmptyFill,

    #[error("Fill price {implied} deviates {deviation} from oracle {oracle}, max {max}")]
    ExcessiveDeviation {
        implied: Price,
        oracle: Price,
        deviation: Decimal,
        max: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct PriceChecker {
    params: PriceCheckerParams,
    paused: bool,
}

impl PriceChecker {
    pub fn new(params: PriceCheckerParams) -> Self {
        Self {
            params,
            paused: false,
        }
    }

    pub fn params(&self) -> &PriceCheckerParams {
        &self.params
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Judges a fill of `request` yielding `amount_out` against the smoothed price.
    pub fn validate(
        &self,
        request: &SwapRequest,
        amount_out: Amount,
        twap: Price,
        oracle_tripped: bool,
    ) -> Result<(), PriceCheckError> {
        if self.paused {
            return Err(PriceCheckError::Paused);
        }
        if oracle_tripped {
            return Err(PriceCheckError::OracleUnsafe);
        }
        let implied = request
            .implied_price(amount_out)
            .ok_or(PriceCheckError::EmptyFill)?;
        let deviation = implied.deviation_from(twap);
        let max = self.params.max_deviation.as_fraction();
        if deviation > max {
            return Err(PriceCheckError::ExcessiveDeviation {
                implied,
                oracle: twap,
                deviation,
                max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("Venue rejected the request: {reason}")]
    Rejected { reason: String },

    #[error("Order {0:?} not found")]
    UnknownOrder(OrderId),

    #[error("Order {0:?} is not open")]
    OrderNotOpen(OrderId),

    #[error("Fill of {offered} is below the order minimum {min_out}")]
    BelowMinimum { offered: Amount, min_out: Amount },

    #[error("Fill rejected by price check: {0}")]
    PriceCheck(#[from] PriceCheckError),
}

/// External asynchronous trade venue. Settlement happens out of band.
pub trait SwapVenue {
    /// Takes custody of `amount_in` and queues the order.
    fn request_swap(&mut self, request: SwapRequest) -> Result<OrderId, VenueError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Filled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueOrder {
    pub id: OrderId,
    pub request: SwapRequest,
    pub status: OrderStatus,
}

/// Tokens the venue pushes to a recipient when it fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub order_id: OrderId,
    pub recipient: Address,
    pub asset: AssetId,
    pub amount: Amount,
}

// 4.2: in-memory venue. fills only when told to, at whatever amount it is given.
#[derive(Debug, Clone, Default)]
pub struct MockVenue {
    next_order_id: u64,
    orders: HashMap<OrderId, VenueOrder>,
    /// Input tokens in venue custody.
    held: HashMap<AssetId, Amount>,
    rejecting: bool,
}

impl MockVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every new request until switched back.
    pub fn set_rejecting(&mut self, rejecting: bool) {
        self.rejecting = rejecting;
    }

    pub fn order(&self, id: OrderId) -> Option<&VenueOrder> {
        self.orders.get(&id)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &VenueOrder> {
        self.orders.values().filter(|o| o.status == OrderStatus::Open)
    }

    pub fn held(&self, asset: AssetId) -> Amount {
        self.held.get(&asset).copied().unwrap_or_default()
    }

    /// Fills an open order. The caller is responsible for the price check.
    pub fn fill(&mut self, id: OrderId, amount_out: Amount) -> Result<Settlement, VenueError> {
        let order = self.orders.get_mut(&id).ok_or(VenueError::UnknownOrder(id))?;
        if order.status != OrderStatus::Open {
            return Err(VenueError::OrderNotOpen(id));
        }
        if amount_out < order.request.validity.min_out {
            return Err(VenueError::BelowMinimum {
                offered: amount_out,
                min_out: order.request.validity.min_out,
            });
        }
        order.status = OrderStatus::Filled;

        let request = order.request.clone();
        let held = self.held.entry(request.asset_in).or_default();
        *held = held.saturating_sub(request.amount_in);

        Ok(Settlement {
            order_id: id,
            recipient: request.recipient,
            asset: request.asset_out,
            amount: amount_out,
        })
    }
}

impl SwapVenue for MockVenue {
    fn request_swap(&mut self, request: SwapRequest) -> Result<OrderId, VenueError> {
        if self.rejecting {
            return Err(VenueError::Rejected {
                reason: "venue offline".to_string(),
            });
        }
        if request.amount_in.is_zero() {
            return Err(VenueError::Rejected {
                reason: "zero input".to_string(),
            });
        }
        self.next_order_id += 1;
        let id = OrderId(self.next_order_id);

        let held = self.held.entry(request.asset_in).or_default();
        *held = held.add(request.amount_in);

        self.orders.insert(
            id,
            VenueOrder {
                id,
                request,
                status: OrderStatus::Open,
            },
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn weth() -> AssetInfo {
        AssetInfo::new(AssetId(1), "WETH", 18)
    }

    fn usdc() -> AssetInfo {
        AssetInfo::new(AssetId(2), "USDC", 6)
    }

    fn lever_request(amount_in: Decimal, min_out: Decimal) -> SwapRequest {
        SwapRequest {
            amount_in: Amount::new(amount_in),
            asset_in: AssetId(2),
            asset_out: AssetId(1),
            recipient: Address(100),
            validity: ValidityData {
                direction: SwapDirection::Lever,
                min_out: Amount::new(min_out),
            },
        }
    }

    #[test]
    fn idle_reads_zero() {
        let state = SwapState::Idle;
        assert!(state.pending_amount().is_zero());
        assert!(state.pending_timestamp().is_zero());
        assert!(state.expected_output().is_zero());
        assert_eq!(state.direction(), None);
    }

    #[test]
    fn quote_applies_single_and_double_slippage() {
        let price = Price::new_unchecked(dec!(2000));
        let q = quote(
            SwapDirection::Lever,
            Amount::new(dec!(15200)),
            price,
            Bps::new(50),
            &weth(),
            &usdc(),
        );
        assert_eq!(q.fair_output.value(), dec!(7.6));
        assert_eq!(q.min_out.value(), dec!(7.562));
        assert_eq!(q.expected_output.value(), dec!(7.524));

        let q = quote(
            SwapDirection::Delever,
            Amount::new(dec!(2.75)),
            Price::new_unchecked(dec!(1600)),
            Bps::new(200),
            &weth(),
            &usdc(),
        );
        assert_eq!(q.fair_output.value(), dec!(4400));
        assert_eq!(q.expected_output.value(), dec!(4224));
    }

    #[test]
    fn checker_accepts_fill_near_oracle() {
        let checker = PriceChecker::new(PriceCheckerParams::default());
        let request = lever_request(dec!(15200), dec!(7.562));
        let twap = Price::new_unchecked(dec!(2000));

        assert!(checker.validate(&request, Amount::new(dec!(7.6)), twap, false).is_ok());
        // 15200 / 7.4 ≈ 2054, 2.7% off
        assert!(checker.validate(&request, Amount::new(dec!(7.4)), twap, false).is_ok());
    }

    #[test]
    fn checker_rejects_divergent_fill() {
        let checker = PriceChecker::new(PriceCheckerParams::default());
        let request = lever_request(dec!(15200), dec!(7));
        let twap = Price::new_unchecked(dec!(2000));

        let result = checker.validate(&request, Amount::new(dec!(7)), twap, false);
        assert!(matches!(result, Err(PriceCheckError::ExcessiveDeviation { .. })));
    }

    #[test]
    fn checker_rejects_when_paused_or_oracle_unsafe() {
        let mut checker = PriceChecker::new(PriceCheckerParams::default());
        let request = lever_request(dec!(15200), dec!(7.562));
        let twap = Price::new_unchecked(dec!(2000));

        assert_eq!(
            checker.validate(&request, Amount::new(dec!(7.6)), twap, true),
            Err(PriceCheckError::OracleUnsafe)
        );
        checker.set_paused(true);
        assert_eq!(
            checker.validate(&request, Amount::new(dec!(7.6)), twap, false),
            Err(PriceCheckError::Paused)
        );
    }

    #[test]
    fn venue_enforces_minimum_and_single_fill() {
        let mut venue = MockVenue::new();
        let id = venue.request_swap(lever_request(dec!(15200), dec!(7.562))).unwrap();
        assert_eq!(venue.held(AssetId(2)).value(), dec!(15200));

        let low = venue.fill(id, Amount::new(dec!(7.5)));
        assert!(matches!(low, Err(VenueError::BelowMinimum { .. })));

        let settlement = venue.fill(id, Amount::new(dec!(7.6))).unwrap();
        assert_eq!(settlement.asset, AssetId(1));
        assert_eq!(settlement.recipient, Address(100));
        assert!(venue.held(AssetId(2)).is_zero());

        assert_eq!(venue.fill(id, Amount::new(dec!(7.6))), Err(VenueError::OrderNotOpen(id)));
    }

    #[test]
    fn rejecting_venue_refuses_requests() {
        let mut venue = MockVenue::new();
        venue.set_rejecting(true);
        let result = venue.request_swap(lever_request(dec!(100), dec!(0.04)));
        assert!(matches!(result, Err(VenueError::Rejected { .. })));
        assert_eq!(venue.open_orders().count(), 0);
    }
}
