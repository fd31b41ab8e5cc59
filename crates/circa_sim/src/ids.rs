//! Opaque identifiers and the process-wide counters behind them.
//!
//! State IDs are arena indices. Component IDs, circuit serial numbers and
//! network epochs come from global atomic counters that start once per
//! process and are never reset: lock ordering depends on circuit serials
//! being strictly increasing across every circuit ever created.

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Index of a [`CircuitState`](crate::state::CircuitState) in a state tree.
    StateId
);

define_id!(
    /// Index of a bundle in a [`BundleNetwork`](crate::network::BundleNetwork).
    BundleId
);

define_id!(
    /// Index of a per-bit thread in a [`BundleNetwork`](crate::network::BundleNetwork).
    ThreadId
);

/// Globally unique identity of a placed component.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ComponentId(u64);

impl ComponentId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_CIRCUIT_SERIAL: AtomicU64 = AtomicU64::new(1);
static NEXT_NETWORK_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Allocates the serial number that fixes a circuit's place in the lock order.
pub(crate) fn next_circuit_serial() -> u64 {
    NEXT_CIRCUIT_SERIAL.fetch_add(1, Ordering::SeqCst)
}

/// Allocates a fresh epoch for a bundle network revision.
pub(crate) fn next_network_epoch() -> u64 {
    NEXT_NETWORK_EPOCH.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_id_roundtrip() {
        let id = StateId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
        assert_eq!(<StateId as ArenaId>::as_raw(id), 42);
    }

    #[test]
    fn component_ids_are_unique() {
        let a = ComponentId::next();
        let b = ComponentId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn circuit_serials_strictly_increase() {
        let a = next_circuit_serial();
        let b = next_circuit_serial();
        assert!(b > a);
    }

    #[test]
    fn display() {
        assert_eq!(StateId::from_raw(3).to_string(), "3");
        assert!(ComponentId::next().to_string().starts_with('#'));
    }
}
