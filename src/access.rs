// 6.0: who may call what. callers carry their address and whether the call came straight
// from outside or through another contract. privileged operations take a capability
// value instead of checking an ambient "current caller".

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Call initiated directly by an external account, one step per invocation.
    External,
    /// Call relayed through another contract in the same atomic unit.
    Contract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub address: Address,
    pub origin: Origin,
}

impl Caller {
    pub fn external(address: Address) -> Self {
        Self {
            address,
            origin: Origin::External,
        }
    }

    pub fn contract(address: Address) -> Self {
        Self {
            address,
            origin: Origin::Contract,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.origin == Origin::External
    }
}

/// Owner capability: manages the allow-list. Not `Clone`, move it to hand it over.
#[derive(Debug)]
pub struct OwnerCap {
    instance: u64,
}

/// Operator capability: active toggle, oracle reset, price checker pause.
#[derive(Debug)]
pub struct OperatorCap {
    instance: u64,
}

impl OwnerCap {
    pub fn instance(&self) -> u64 {
        self.instance
    }
}

impl OperatorCap {
    pub fn instance(&self) -> u64 {
        self.instance
    }
}

/// Both capabilities for one deployed engine.
#[derive(Debug)]
pub struct Capabilities {
    pub owner: OwnerCap,
    pub operator: OperatorCap,
}

impl Capabilities {
    /// Mints a fresh pair bound to a new instance id.
    pub fn mint() -> Self {
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        Self {
            owner: OwnerCap { instance },
            operator: OperatorCap { instance },
        }
    }

    pub fn instance(&self) -> u64 {
        self.owner.instance
    }
}

// 6.1: allow-list plus the active flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControl {
    instance: u64,
    allowed_callers: BTreeSet<Address>,
    pub is_active: bool,
}

impl AccessControl {
    pub fn new(instance: u64) -> Self {
        Self {
            instance,
            allowed_callers: BTreeSet::new(),
            is_active: true,
        }
    }

    pub fn owns(&self, cap: &OwnerCap) -> bool {
        cap.instance == self.instance
    }

    pub fn operates(&self, cap: &OperatorCap) -> bool {
        cap.instance == self.instance
    }

    pub fn is_allowed(&self, address: Address) -> bool {
        self.allowed_callers.contains(&address)
    }

    /// Returns false if the address was already allowed.
    pub fn allow(&mut self, address: Address) -> bool {
        self.allowed_callers.insert(address)
    }

    /// Returns false if the address was not on the list.
    pub fn disallow(&mut self, address: Address) -> bool {
        self.allowed_callers.remove(&address)
    }

    pub fn allowed_callers(&self) -> impl Iterator<Item = &Address> {
        self.allowed_callers.iter()
    }
}
