//! Error types reported by units of work.

use thiserror::Error;

/// Failure raised by a participant while beginning, committing, or rolling back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitOfWorkError {
    /// The underlying store rejected the operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A concurrent writer or a validation rule conflicts with the staged work.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation requires an open transaction but none is outstanding.
    #[error("No active transaction")]
    NotActive,

    /// A transaction is already open on this unit.
    #[error("Transaction already active")]
    AlreadyActive,

    /// The resource behind the unit cannot be reached.
    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    /// Timeout.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UnitOfWorkError {
    /// Check if this error is retryable by the caller.
    ///
    /// The coordinator itself never retries; this is advisory for callers
    /// deciding whether to build a fresh coordinator and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UnitOfWorkError::Conflict(_)
                | UnitOfWorkError::Unavailable(_)
                | UnitOfWorkError::Timeout(_)
        )
    }

    /// Get a stable error code for logs and metrics labels.
    pub fn error_code(&self) -> &'static str {
        match self {
            UnitOfWorkError::Storage(_) => "STORAGE",
            UnitOfWorkError::Conflict(_) => "CONFLICT",
            UnitOfWorkError::NotActive => "NOT_ACTIVE",
            UnitOfWorkError::AlreadyActive => "ALREADY_ACTIVE",
            UnitOfWorkError::Unavailable(_) => "UNAVAILABLE",
            UnitOfWorkError::Timeout(_) => "TIMEOUT",
            UnitOfWorkError::Internal(_) => "INTERNAL",
        }
    }
}

/// Result type alias for unit of work operations.
pub type Result<T> = std::result::Result<T, UnitOfWorkError>;
