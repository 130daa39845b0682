//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Network-facing failures are caught at the engine boundary and never
/// unwind into the caller that scheduled a push; this type mostly
/// travels between the transport and the engine internals.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote store rejected the record (validation/server error).
    #[error("remote rejected record: {0}")]
    Rejected(String),

    /// Malformed response from the remote store.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A push or pull exceeded its bounded timeout.
    #[error("operation timed out")]
    Timeout,

    /// Record store error during sync bookkeeping.
    #[error("store error: {0}")]
    Store(#[from] curio_core::CoreError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the operation is safe to retry on a later cycle.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            // Retrying a rejected record is idempotent; the periodic
            // pass will attempt it again.
            SyncError::Rejected(_) => true,
            SyncError::Protocol(_) | SyncError::Store(_) => false,
        }
    }
}
