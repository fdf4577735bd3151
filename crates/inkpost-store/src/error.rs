//! Store error types.

use inkpost_models::TransitionError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The stored status no longer matched the expected pre-state: another
    /// writer got there first.
    #[error("concurrent modification: expected status '{expected}', found '{found}'")]
    Conflict { expected: String, found: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Check if the error is worth retrying (transient I/O only; conflicts
    /// and transition violations never are).
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Redis(e) => e.is_io_error() || e.is_timeout(),
            _ => false,
        }
    }
}
