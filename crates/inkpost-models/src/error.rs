//! Transition errors shared by all record state machines.

use thiserror::Error;

/// Result type for state transitions.
pub type TransitionResult<T> = Result<T, TransitionError>;

/// Errors raised when a state transition is rejected.
///
/// Transitions are validated before any field is written, so a rejected
/// operation leaves the record exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The requested edge does not exist in the transition table.
    #[error("cannot {action} a record in state '{from}'")]
    InvalidState {
        /// State the record was in when the transition was attempted.
        from: &'static str,
        /// The operation that was attempted.
        action: &'static str,
    },

    /// A terminal transition was attempted without its required audit data.
    #[error("missing audit data: {0}")]
    MissingAuditData(&'static str),
}

impl TransitionError {
    pub fn invalid(from: &'static str, action: &'static str) -> Self {
        Self::InvalidState { from, action }
    }
}
