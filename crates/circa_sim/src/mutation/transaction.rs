//! Transactions: lock, run, repair, notify.

use super::lock::{acquire_locks, held_mode, HeldLocks, LockMode};
use super::{ChangeKind, CircuitChange, CircuitMutator, ReplacementMap};
use crate::attrs::{AttrValue, Attribute};
use crate::circuit::{Circuit, CircuitEvent};
use crate::component::{Component, Element};
use crate::error::MutationError;
use circa_common::{CircaResult, InternalError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, debug_span};

/// A unit of work over a declared set of circuits.
pub trait CircuitTransaction {
    /// Every circuit the transaction reads or writes, with the mode it needs.
    fn accessed_circuits(&self) -> Vec<(Circuit, LockMode)>;

    /// Performs the work. Returning an error rolls back everything done so far.
    fn run(&mut self, mutator: &mut CircuitMutator) -> Result<(), MutationError>;
}

/// What a committed transaction did.
#[derive(Debug)]
pub struct TransactionResult {
    log: Vec<CircuitChange>,
    replacements: BTreeMap<u64, (Circuit, Arc<ReplacementMap>)>,
    modified: Vec<Circuit>,
}

impl TransactionResult {
    /// The executed changes, in order, with old values filled in.
    pub fn log(&self) -> &[CircuitChange] {
        &self.log
    }

    /// Circuits whose contents changed or were re-indexed.
    pub fn modified_circuits(&self) -> &[Circuit] {
        &self.modified
    }

    /// The frozen replacement map for one circuit.
    pub fn replacement_map(&self, circuit: &Circuit) -> Option<Arc<ReplacementMap>> {
        self.replacements
            .get(&circuit.serial())
            .map(|(_, map)| Arc::clone(map))
    }

    /// A mutation that undoes this transaction: the log reversed, each change
    /// replaced by its dual.
    pub fn reverse(&self) -> CircuitMutation {
        CircuitMutation {
            changes: self.log.iter().rev().map(CircuitChange::reverse).collect(),
        }
    }
}

/// Runs a transaction.
///
/// Locks are taken in serial order; the transaction runs; on failure its
/// partial log is undone under the same locks. On success every modified
/// circuit's ports are recomputed, subcircuit instances of circuits whose
/// ports changed are re-indexed, stale bundle networks are rebuilt, the
/// replacement maps are frozen, and only then are the buffered events and
/// one [`CircuitEvent::TransactionDone`] per modified circuit delivered.
pub fn execute_transaction<T: CircuitTransaction + ?Sized>(
    transaction: &mut T,
) -> Result<TransactionResult, MutationError> {
    let span = debug_span!("transaction");
    let _enter = span.enter();
    let _locks = lock_accessed(transaction)?;

    let mut mutator = CircuitMutator::new();
    if let Err(err) = transaction.run(&mut mutator) {
        return Err(abort(&mut mutator, err));
    }

    let changed_ports = match recompute_ports(&mutator) {
        Ok(changed) => changed,
        Err(err) => return Err(abort(&mut mutator, err.into())),
    };
    for child in &changed_ports {
        for parent in child.supercircuits() {
            if held_mode(parent.serial()) != Some(LockMode::Write) {
                let err = MutationError::SupercircuitNotLocked {
                    circuit: child.name(),
                    supercircuit: parent.name(),
                };
                return Err(abort(&mut mutator, err));
            }
        }
    }

    let mut modified: BTreeMap<u64, Circuit> = mutator
        .touched
        .values()
        .map(|(c, _)| (c.serial(), c.clone()))
        .collect();
    let mut invalidations = Vec::new();
    for child in &changed_ports {
        for (parent, id) in child.instances() {
            let Some(instance) = parent.component(id) else {
                continue;
            };
            let ends = instance.ends();
            let reindexed = parent.write_contents(|c| {
                c.points.add_component(&instance, ends);
                c.network_stale = true;
            });
            if reindexed.is_none() {
                let err = InternalError::new(format!(
                    "write lock on '{parent}' lost before re-indexing an instance"
                ));
                return Err(abort(&mut mutator, err.into()));
            }
            modified.insert(parent.serial(), parent.clone());
            invalidations.push((parent, CircuitEvent::Invalidate(instance)));
        }
    }

    for circuit in modified.values() {
        let repaired = circuit.write_contents(|c| {
            if c.network_stale {
                c.rebuild_network();
            }
        });
        if repaired.is_none() {
            let err = InternalError::new(format!(
                "write lock on '{circuit}' lost before network repair"
            ));
            return Err(abort(&mut mutator, err.into()));
        }
    }

    let mut replacements = BTreeMap::new();
    for (serial, (circuit, mut map)) in std::mem::take(&mut mutator.maps) {
        map.freeze();
        replacements.insert(serial, (circuit, Arc::new(map)));
    }

    let events = std::mem::take(&mut mutator.events);
    debug!(
        changes = mutator.log.len(),
        events = events.len(),
        modified = modified.len(),
        "transaction committed"
    );
    for (circuit, event) in events.iter().chain(invalidations.iter()) {
        circuit.fire(event);
    }
    for (serial, circuit) in &modified {
        let map = match replacements.get(serial) {
            Some((_, map)) => Arc::clone(map),
            None => {
                let mut empty = ReplacementMap::new();
                empty.freeze();
                Arc::new(empty)
            }
        };
        circuit.fire(&CircuitEvent::TransactionDone(map));
    }

    Ok(TransactionResult {
        log: std::mem::take(&mut mutator.log),
        replacements,
        modified: modified.into_values().collect(),
    })
}

/// Attempts at locking before a transaction runs with whatever it holds.
const LOCK_ATTEMPTS: usize = 4;

/// Locks the transaction's circuits, then asks again which circuits it
/// needs. Supercircuits can gain instances between the two calls; if the
/// second answer is not covered by the held locks, everything is released
/// and the larger set is requested. After [`LOCK_ATTEMPTS`] the locks held
/// are kept and the supercircuit check after the run catches the rest.
fn lock_accessed<T: CircuitTransaction + ?Sized>(
    transaction: &T,
) -> Result<HeldLocks, MutationError> {
    let mut attempt = 1;
    loop {
        let requests = transaction.accessed_circuits();
        let locks = acquire_locks(&requests)?;
        let missing = transaction
            .accessed_circuits()
            .into_iter()
            .filter(|(circuit, mode)| !covers(held_mode(circuit.serial()), *mode))
            .count();
        if missing == 0 || attempt == LOCK_ATTEMPTS {
            debug!(circuits = requests.len(), attempt, "circuits locked");
            return Ok(locks);
        }
        debug!(missing, attempt, "accessed circuits changed while locking");
        drop(locks);
        attempt += 1;
    }
}

fn covers(held: Option<LockMode>, wanted: LockMode) -> bool {
    matches!(
        (held, wanted),
        (Some(LockMode::Write), _) | (Some(LockMode::Read), LockMode::Read)
    )
}

fn abort(mutator: &mut CircuitMutator, err: MutationError) -> MutationError {
    debug!(%err, changes = mutator.log.len(), "transaction failed, rolling back");
    mutator.rollback();
    err
}

/// Recomputes the ports of every touched circuit and returns those whose
/// ports changed. Every touched circuit is write-locked by this thread.
fn recompute_ports(mutator: &CircuitMutator) -> CircaResult<Vec<Circuit>> {
    let mut changed = Vec::new();
    for (circuit, before) in mutator.touched.values() {
        let after = circuit
            .write_contents(|c| {
                c.ports = c.compute_ports();
                c.ports.clone()
            })
            .ok_or_else(|| {
                InternalError::new(format!("touched circuit '{circuit}' is not write-locked"))
            })?;
        if &after != before {
            changed.push(circuit.clone());
        }
    }
    Ok(changed)
}

/// A list of changes executed as one transaction.
///
/// ```ignore
/// let mut m = CircuitMutation::new();
/// m.add(&circuit, pin).add(&circuit, Wire::new(a, b));
/// let result = m.execute()?;
/// result.reverse().execute()?; // undo
/// ```
#[derive(Clone, Debug, Default)]
pub struct CircuitMutation {
    changes: Vec<CircuitChange>,
}

impl CircuitMutation {
    /// Creates an empty mutation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an arbitrary change.
    pub fn push(&mut self, change: CircuitChange) -> &mut Self {
        self.changes.push(change);
        self
    }

    fn kind(&mut self, circuit: &Circuit, kind: ChangeKind) -> &mut Self {
        self.push(CircuitChange::new(circuit, kind))
    }

    /// Removes everything from `circuit`.
    pub fn clear(&mut self, circuit: &Circuit) -> &mut Self {
        self.kind(circuit, ChangeKind::Clear { removed: Vec::new() })
    }

    /// Adds one element.
    pub fn add(&mut self, circuit: &Circuit, element: impl Into<Element>) -> &mut Self {
        self.kind(circuit, ChangeKind::Add(element.into()))
    }

    /// Adds several elements.
    pub fn add_all(&mut self, circuit: &Circuit, elements: Vec<Element>) -> &mut Self {
        self.kind(circuit, ChangeKind::AddAll(elements))
    }

    /// Removes one element.
    pub fn remove(&mut self, circuit: &Circuit, element: impl Into<Element>) -> &mut Self {
        self.kind(circuit, ChangeKind::Remove(element.into()))
    }

    /// Removes several elements.
    pub fn remove_all(&mut self, circuit: &Circuit, elements: Vec<Element>) -> &mut Self {
        self.kind(circuit, ChangeKind::RemoveAll(elements))
    }

    /// Replaces components according to `map`.
    pub fn replace(&mut self, circuit: &Circuit, map: ReplacementMap) -> &mut Self {
        self.kind(circuit, ChangeKind::Replace(map))
    }

    /// Replaces one component with another.
    pub fn replace_one(&mut self, circuit: &Circuit, old: &Component, new: &Component) -> &mut Self {
        self.replace(circuit, ReplacementMap::single(old.clone(), new.clone()))
    }

    /// Sets a component attribute.
    pub fn set(
        &mut self,
        circuit: &Circuit,
        component: &Component,
        attr: Attribute,
        value: AttrValue,
    ) -> &mut Self {
        self.kind(
            circuit,
            ChangeKind::Set {
                component: component.clone(),
                attr,
                old: None,
                new: Some(value),
            },
        )
    }

    /// Sets a circuit attribute.
    pub fn set_for_circuit(&mut self, circuit: &Circuit, attr: Attribute, value: AttrValue) -> &mut Self {
        self.kind(
            circuit,
            ChangeKind::SetForCircuit {
                attr,
                old: None,
                new: Some(value),
            },
        )
    }

    /// The queued changes.
    pub fn changes(&self) -> &[CircuitChange] {
        &self.changes
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Executes the queued changes as one transaction.
    pub fn execute(&mut self) -> Result<TransactionResult, MutationError> {
        execute_transaction(self)
    }
}

impl CircuitTransaction for CircuitMutation {
    fn accessed_circuits(&self) -> Vec<(Circuit, LockMode)> {
        let mut ret = Vec::new();
        for change in &self.changes {
            ret.push((change.circuit().clone(), LockMode::Write));
            if change.concerns_supercircuit() {
                for parent in change.circuit().supercircuits() {
                    ret.push((parent, LockMode::Write));
                }
            }
            for added in change.added_components() {
                if let Some(child) = added.factory().subcircuit() {
                    ret.push((child.clone(), LockMode::Read));
                }
            }
        }
        ret
    }

    fn run(&mut self, mutator: &mut CircuitMutator) -> Result<(), MutationError> {
        for change in &self.changes {
            change.execute(mutator)?;
        }
        Ok(())
    }
}
