//! The error raised when the simulator breaks one of its own invariants.

/// Result of an internal step that can only fail through a bug in circa.
pub type CircaResult<T> = Result<T, InternalError>;

/// A broken internal invariant, such as a lost lock guard or a dangling
/// state link. Problems in the circuit itself never produce this.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("internal simulator error: {message}")]
pub struct InternalError {
    /// What was found broken.
    pub message: String,
}

impl InternalError {
    /// Creates an error describing the broken invariant.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
