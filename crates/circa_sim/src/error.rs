//! Error types for simulation, mutation, analysis and test vectors.
//!
//! Structural problems in a circuit (width conflicts, conflicting drivers,
//! oscillation) are reported as data and never surface here. These enums
//! cover misuse of the API, invariant violations and analysis failures.

use circa_common::{BitWidth, InternalError, Value};

/// Errors raised by the propagator and the state tree.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A state ID does not refer to a live state in the tree.
    #[error("simulation state {0} not found")]
    StateNotFound(u32),

    /// A pin operation was applied to a component that is not a pin.
    #[error("component '{component}' is not a pin")]
    NotAPin {
        /// Description of the offending component.
        component: String,
    },

    /// A value of the wrong width was supplied for a pin.
    #[error("width mismatch: expected {expected}, found {found}")]
    WidthMismatch {
        /// The pin's width.
        expected: BitWidth,
        /// The supplied value's width.
        found: BitWidth,
    },
}

/// Errors raised while executing a topology transaction.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// A circuit was mutated without holding its write lock.
    #[error("circuit '{circuit}' mutated outside a write-locked transaction")]
    IllegalState {
        /// Name of the circuit.
        circuit: String,
    },

    /// A transaction asked for write access to a circuit it already reads.
    #[error("cannot upgrade the read lock on circuit '{circuit}' to a write lock")]
    LockUpgrade {
        /// Name of the circuit.
        circuit: String,
    },

    /// A change alters a circuit's ports but an instantiating circuit is not write-locked.
    #[error("circuit '{supercircuit}' instantiates '{circuit}' but is not write-locked")]
    SupercircuitNotLocked {
        /// The circuit whose ports change.
        circuit: String,
        /// The circuit instantiating it.
        supercircuit: String,
    },

    /// A frozen replacement map was modified.
    #[error("replacement map is frozen")]
    FrozenReplacementMap,

    /// An internal invariant was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Errors raised by combinational analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    /// Expression extraction did not converge within the iteration bound.
    #[error("circuit contains a combinational cycle")]
    Circular,

    /// A component has no symbolic expression form.
    #[error("cannot analyze component '{0}'")]
    CannotHandle(String),

    /// Too many input bits to enumerate.
    #[error("truth table would need {count} input bits (limit {max})")]
    TooManyInputs {
        /// Total input bits in the circuit.
        count: u32,
        /// Configured limit.
        max: u32,
    },

    /// The circuit has no output pins to analyze.
    #[error("circuit has no output pins")]
    NoOutputs,

    /// Simulation failed while building a table.
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Errors raised while loading or applying a test vector.
#[derive(Debug, thiserror::Error)]
pub enum TestVectorError {
    /// The vector text is malformed.
    #[error("test vector line {line}: {reason}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// A column names a pin that the circuit does not have.
    #[error("no pin labelled '{0}'")]
    UnknownPin(String),

    /// A column's width disagrees with the pin's width.
    #[error("pin '{pin}' has width {found}, vector declares {expected}")]
    WidthMismatch {
        /// Pin label.
        pin: String,
        /// Width declared by the vector.
        expected: BitWidth,
        /// Width of the pin.
        found: BitWidth,
    },

    /// The vector file could not be read.
    #[error("failed to read test vector: {0}")]
    Io(#[from] std::io::Error),

    /// Simulation failed while applying the vector.
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// One output pin that disagreed with its expected value.
#[derive(Clone, Debug, PartialEq)]
pub struct PinMismatch {
    /// Pin label.
    pub pin: String,
    /// Expected value; unknown bits are don't-care.
    pub expected: Value,
    /// Observed value.
    pub actual: Value,
}

/// Why one row of a test vector failed.
#[derive(Debug, thiserror::Error)]
pub enum TestFailure {
    /// The circuit did not settle.
    #[error("circuit oscillated")]
    Oscillation,

    /// One or more outputs disagreed with the expected values.
    #[error("{} output(s) mismatched", .0.len())]
    Mismatch(Vec<PinMismatch>),

    /// The row could not be applied.
    #[error(transparent)]
    Sim(#[from] SimError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_not_found_display() {
        assert_eq!(
            SimError::StateNotFound(7).to_string(),
            "simulation state 7 not found"
        );
    }

    #[test]
    fn width_mismatch_display() {
        let e = SimError::WidthMismatch {
            expected: BitWidth::new(4),
            found: BitWidth::ONE,
        };
        assert_eq!(e.to_string(), "width mismatch: expected 4, found 1");
    }

    #[test]
    fn illegal_state_display() {
        let e = MutationError::IllegalState {
            circuit: "main".into(),
        };
        assert_eq!(
            e.to_string(),
            "circuit 'main' mutated outside a write-locked transaction"
        );
    }

    #[test]
    fn supercircuit_not_locked_display() {
        let e = MutationError::SupercircuitNotLocked {
            circuit: "adder".into(),
            supercircuit: "alu".into(),
        };
        assert_eq!(
            e.to_string(),
            "circuit 'alu' instantiates 'adder' but is not write-locked"
        );
    }

    #[test]
    fn internal_is_transparent() {
        let e: MutationError = InternalError::new("lost guard").into();
        assert_eq!(e.to_string(), "internal simulator error: lost guard");
    }

    #[test]
    fn analyze_display() {
        assert_eq!(
            AnalyzeError::CannotHandle("Clock".into()).to_string(),
            "cannot analyze component 'Clock'"
        );
        assert_eq!(
            AnalyzeError::TooManyInputs { count: 20, max: 12 }.to_string(),
            "truth table would need 20 input bits (limit 12)"
        );
    }

    #[test]
    fn test_vector_parse_display() {
        let e = TestVectorError::Parse {
            line: 3,
            reason: "expected 2 values".into(),
        };
        assert_eq!(e.to_string(), "test vector line 3: expected 2 values");
    }

    #[test]
    fn test_failure_display() {
        let mismatch = PinMismatch {
            pin: "sum".into(),
            expected: Value::TRUE,
            actual: Value::FALSE,
        };
        assert_eq!(TestFailure::Mismatch(vec![mismatch]).to_string(), "1 output(s) mismatched");
        assert_eq!(TestFailure::Oscillation.to_string(), "circuit oscillated");
    }
}
