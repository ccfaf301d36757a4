//! Error types for the sync module.

use std::time::Duration;

use thiserror::Error;

/// Failures of a whole batch request.
///
/// Any of these routes every item of the batch through the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The authority could not be reached.
    #[error("authority unreachable: {0}")]
    Unreachable(String),

    /// No response within the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be decoded or does not match the request.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The request was sent but the exchange failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Errors that abort a sync operation as a whole.
///
/// Per-item failures never surface here; they are reported in the pass
/// summary instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed before the pass could start.
    #[error("store error: {0}")]
    Store(#[from] tasksync_store::StoreError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Core primitive rejected its input.
    #[error(transparent)]
    Core(#[from] tasksync_core::CoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
