//! Owner and operator actions. Each takes the capability that authorizes it.

use super::core::Engine;
use super::results::EngineError;
use crate::access::{OperatorCap, OwnerCap};
use crate::events::{ActiveSetEvent, CallerEvent, EventPayload};
use crate::lending::LendingMarket;
use crate::oracle::PriceFeed;
use crate::swap::SwapVenue;
use crate::types::Address;

impl<M, V, F> Engine<M, V, F>
where
    M: LendingMarket + Clone,
    V: SwapVenue + Clone,
    F: PriceFeed + Clone,
{
    pub fn allow_caller(&mut self, owner: &OwnerCap, address: Address) -> Result<bool, EngineError> {
        if !self.access.owns(owner) {
            return Err(EngineError::NotOwner);
        }
        self.transact(|engine| {
            let added = engine.access.allow(address);
            if added {
                tracing::info!(caller = %address, "caller allowed");
                engine.emit_event(EventPayload::CallerAllowed(CallerEvent { caller: address }));
            }
            Ok(added)
        })
    }

    pub fn disallow_caller(&mut self, owner: &OwnerCap, address: Address) -> Result<bool, EngineError> {
        if !self.access.owns(owner) {
            return Err(EngineError::NotOwner);
        }
        self.transact(|engine| {
            let removed = engine.access.disallow(address);
            if removed {
                tracing::info!(caller = %address, "caller disallowed");
                engine.emit_event(EventPayload::CallerDisallowed(CallerEvent { caller: address }));
            }
            Ok(removed)
        })
    }

    pub fn set_active(&mut self, operator: &OperatorCap, is_active: bool) -> Result<(), EngineError> {
        if !self.access.operates(operator) {
            return Err(EngineError::NotOperator);
        }
        self.transact(|engine| {
            engine.access.is_active = is_active;
            tracing::info!(is_active, "strategy active flag set");
            engine.emit_event(EventPayload::ActiveSet(ActiveSetEvent { is_active }));
            Ok(())
        })
    }

    /// Administrative pause of the fill price check. While paused no fill passes.
    pub fn set_checker_paused(&mut self, operator: &OperatorCap, paused: bool) -> Result<(), EngineError> {
        if !self.access.operates(operator) {
            return Err(EngineError::NotOperator);
        }
        self.transact(|engine| {
            engine.checker.set_paused(paused);
            tracing::info!(paused, "price checker pause set");
            Ok(())
        })
    }
}
