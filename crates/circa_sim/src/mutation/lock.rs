//! Per-circuit reader/writer locks acquired in serial-number order.
//!
//! Guards are owned (`arc_lock`) and parked in a per-thread registry keyed by
//! circuit serial. Everything that reads or writes circuit contents looks
//! there first, so a transaction started while the same thread already holds
//! a circuit's lock reuses that lock instead of deadlocking on it.

use crate::circuit::{Circuit, CircuitContents};
use crate::error::MutationError;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Access mode a transaction requests for one circuit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum LockMode {
    /// Shared; the circuit is only inspected.
    Read,
    /// Exclusive; the circuit's topology may change.
    Write,
}

pub(crate) enum HeldGuard {
    Read(ArcRwLockReadGuard<RawRwLock, CircuitContents>),
    Write(ArcRwLockWriteGuard<RawRwLock, CircuitContents>),
}

impl HeldGuard {
    fn mode(&self) -> LockMode {
        match self {
            HeldGuard::Read(_) => LockMode::Read,
            HeldGuard::Write(_) => LockMode::Write,
        }
    }

    pub(crate) fn contents(&self) -> &CircuitContents {
        match self {
            HeldGuard::Read(g) => g,
            HeldGuard::Write(g) => g,
        }
    }
}

thread_local! {
    static HELD: RefCell<HashMap<u64, HeldGuard>> = RefCell::new(HashMap::new());
}

/// Mode in which the current thread holds the circuit with `serial`.
pub(crate) fn held_mode(serial: u64) -> Option<LockMode> {
    HELD.with(|h| h.borrow().get(&serial).map(HeldGuard::mode))
}

/// Temporarily removes a held guard so it can be used without keeping the
/// registry borrowed; pair with [`restore_guard`].
pub(crate) fn take_guard(serial: u64) -> Option<HeldGuard> {
    HELD.with(|h| h.borrow_mut().remove(&serial))
}

pub(crate) fn restore_guard(serial: u64, guard: HeldGuard) {
    HELD.with(|h| {
        h.borrow_mut().insert(serial, guard);
    });
}

/// Locks acquired by one call to [`acquire_locks`], released on drop.
///
/// Locks that were already held when the call was made are left alone.
#[derive(Debug, Default)]
pub struct HeldLocks {
    acquired: Vec<u64>,
}

impl HeldLocks {
    /// Serial numbers of the circuits this holder locked itself.
    pub fn acquired(&self) -> &[u64] {
        &self.acquired
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        for serial in self.acquired.drain(..).rev() {
            drop(take_guard(serial));
            trace!(serial, "released circuit lock");
        }
    }
}

/// Locks every requested circuit in ascending serial order.
///
/// Duplicate requests merge, with write winning over read. A circuit the
/// current thread already holds is skipped, except that upgrading a held
/// read lock to a write lock is refused with [`MutationError::LockUpgrade`]
/// and nothing stays locked.
pub fn acquire_locks(requests: &[(Circuit, LockMode)]) -> Result<HeldLocks, MutationError> {
    let mut ordered: BTreeMap<u64, (Circuit, LockMode)> = BTreeMap::new();
    for (circuit, mode) in requests {
        let entry = ordered
            .entry(circuit.serial())
            .or_insert_with(|| (circuit.clone(), *mode));
        entry.1 = entry.1.max(*mode);
    }

    let mut held = HeldLocks::default();
    for (serial, (circuit, mode)) in ordered {
        match (held_mode(serial), mode) {
            (Some(LockMode::Write), _) | (Some(LockMode::Read), LockMode::Read) => continue,
            (Some(LockMode::Read), LockMode::Write) => {
                return Err(MutationError::LockUpgrade {
                    circuit: circuit.name(),
                });
            }
            (None, LockMode::Read) => {
                restore_guard(serial, HeldGuard::Read(circuit.contents_lock().read_arc()));
            }
            (None, LockMode::Write) => {
                restore_guard(serial, HeldGuard::Write(circuit.contents_lock().write_arc()));
            }
        }
        trace!(serial, ?mode, "acquired circuit lock");
        held.acquired.push(serial);
    }
    Ok(held)
}
