//! Transactional topology mutation.
//!
//! Every edit goes through a [`CircuitTransaction`]: it declares the
//! circuits it touches, [`execute_transaction`] locks them in serial-number
//! order, and the transaction edits them through a [`CircuitMutator`]. The
//! mutator logs each executed [`CircuitChange`] and folds it into a
//! per-circuit [`ReplacementMap`], so a transaction's log can be replayed in
//! reverse (each change swapped for its dual) to undo it exactly, and
//! simulation states can migrate per-component data from replaced to
//! replacing components.

mod change;
pub(crate) mod lock;
mod mutator;
mod replacement;
mod transaction;

pub use change::{ChangeKind, CircuitChange};
pub use lock::{acquire_locks, HeldLocks, LockMode};
pub use mutator::CircuitMutator;
pub use replacement::ReplacementMap;
pub use transaction::{execute_transaction, CircuitMutation, CircuitTransaction, TransactionResult};
