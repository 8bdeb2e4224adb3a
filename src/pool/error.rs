//! Worker pool error types.

use std::fmt;

/// Errors that can occur during pool operations.
///
/// Requests never fail inside the pool; these cover misconfiguration and
/// unsupported lifecycle transitions only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool was configured without workers.
    InvalidPoolSize(usize),

    /// `start()` was called on a pool that is already running or stopped.
    AlreadyStarted,
}

impl PoolError {
    /// Check if this is a configuration error.
    pub fn is_invalid_pool_size(&self) -> bool {
        matches!(self, PoolError::InvalidPoolSize(_))
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::InvalidPoolSize(size) => {
                write!(f, "invalid pool size {}: at least one worker is required", size)
            }
            PoolError::AlreadyStarted => {
                write!(f, "pool has already been started")
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
