// 9.0: every state transition produces an event. audit trail for operators and a way to
// reconstruct what the keeper and the venue did. events from a failed call are discarded
// with the rest of its state.

use crate::swap::{OrderId, SwapDirection};
use crate::types::{Address, Amount, AssetId, BlockNumber, Fraction, Leverage, Price, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub block: BlockNumber,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, block: BlockNumber, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            block,
            timestamp,
            payload,
        }
    }

    /// Short machine friendly name of the payload variant.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Leverage events
    Engaged(EngagedEvent),
    Rebalanced(RebalancedEvent),
    TwapCleared(TwapClearedEvent),
    Ripcorded(RipcordedEvent),

    // Swap lifecycle events
    SwapRequested(SwapRequestedEvent),
    SwapCompleted(SwapCompletedEvent),
    SwapCancelled(SwapCancelledEvent),

    // Access events
    StrategyDeactivated(StrategyDeactivatedEvent),
    ActiveSet(ActiveSetEvent),
    CallerAllowed(CallerEvent),
    CallerDisallowed(CallerEvent),

    // Oracle events
    OracleReset(OracleResetEvent),
    CircuitBreakerTripped(CircuitBreakerTrippedEvent),

    // Vault events
    Deposited(VaultEvent),
    Withdrawn(VaultEvent),
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Engaged(_) => "engaged",
            EventPayload::Rebalanced(_) => "rebalanced",
            EventPayload::TwapCleared(_) => "twap_cleared",
            EventPayload::Ripcorded(_) => "ripcorded",
            EventPayload::SwapRequested(_) => "swap_requested",
            EventPayload::SwapCompleted(_) => "swap_completed",
            EventPayload::SwapCancelled(_) => "swap_cancelled",
            EventPayload::StrategyDeactivated(_) => "strategy_deactivated",
            EventPayload::ActiveSet(_) => "active_set",
            EventPayload::CallerAllowed(_) => "caller_allowed",
            EventPayload::CallerDisallowed(_) => "caller_disallowed",
            EventPayload::OracleReset(_) => "oracle_reset",
            EventPayload::CircuitBreakerTripped(_) => "circuit_breaker_tripped",
            EventPayload::Deposited(_) => "deposited",
            EventPayload::Withdrawn(_) => "withdrawn",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagedEvent {
    pub caller: Address,
    pub collateral: Amount,
    pub target: Leverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceKind {
    /// Partial recentering inside or back into the band.
    Recenter,
    /// One step of a multi step sequence.
    Iterate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancedEvent {
    pub caller: Address,
    pub kind: RebalanceKind,
    pub leverage_before: Leverage,
    pub toward: Leverage,
    pub direction: Option<SwapDirection>,
    pub notional: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwapClearedEvent {
    pub target: Leverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RipcordedEvent {
    pub caller: Address,
    pub leverage_before: Leverage,
    pub notional: Amount,
    pub reward: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequestedEvent {
    pub order_id: OrderId,
    pub direction: SwapDirection,
    pub asset_in: AssetId,
    pub asset_out: AssetId,
    pub amount_in: Amount,
    pub min_out: Amount,
    pub expected_output: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapCompletedEvent {
    pub caller: Address,
    pub order_id: OrderId,
    pub direction: SwapDirection,
    pub amount_out: Amount,
    /// Part of a delever's proceeds left idle because the debt was already repaid.
    pub surplus: Amount,
    pub leverage_after: Leverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapCancelledEvent {
    pub caller: Address,
    pub order_id: OrderId,
    pub direction: SwapDirection,
    /// Input tokens left at the venue. recovering them is an operational procedure.
    pub stranded_asset: AssetId,
    pub stranded_amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDeactivatedEvent {
    pub ltv: Fraction,
    pub target: Leverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSetEvent {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerEvent {
    pub caller: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResetEvent {
    pub previous_twap: Price,
    pub twap: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerTrippedEvent {
    pub twap: Price,
    pub spot: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultEvent {
    pub adapter: Address,
    pub amount: Amount,
    pub collateral_after: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn event_kind_names() {
        let event = Event::new(
            EventId(1),
            BlockNumber(10),
            Timestamp::from_millis(1000),
            EventPayload::Deposited(VaultEvent {
                adapter: Address(200),
                amount: Amount::new(dec!(10)),
                collateral_after: Amount::new(dec!(10)),
            }),
        );
        assert_eq!(event.kind(), "deposited");

        let cleared = EventPayload::TwapCleared(TwapClearedEvent {
            target: Leverage::from_raw(2_000_000_000).unwrap(),
        });
        assert_eq!(cleared.kind(), "twap_cleared");
    }

    #[test]
    fn cancelled_event_serializes() {
        let payload = EventPayload::SwapCancelled(SwapCancelledEvent {
            caller: Address(1),
            order_id: OrderId(7),
            direction: SwapDirection::Lever,
            stranded_asset: AssetId(2),
            stranded_amount: Amount::new(dec!(15200)),
        });
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("SwapCancelled"));
        assert!(json.contains("lever"));
    }
}
