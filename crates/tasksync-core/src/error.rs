//! Error types for TaskSync Core.

use thiserror::Error;

/// Core errors raised by the pure algorithms and decode boundaries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("batch size must be a positive integer, got {0}")]
    InvalidBatchSize(usize),

    #[error("unknown sync state: {0}")]
    UnknownSyncState(String),

    #[error("unknown operation kind: {0}")]
    UnknownOperation(String),
}

/// Validation errors for local mutation input.
///
/// These are raised synchronously, before anything is written or enqueued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("title exceeds maximum length of {max} characters (got {len})")]
    TitleTooLong { max: usize, len: usize },

    #[error("description exceeds maximum length of {max} characters (got {len})")]
    DescriptionTooLong { max: usize, len: usize },

    #[error("record id must not be empty")]
    EmptyRecordId,

    #[error("update changes no fields")]
    EmptyUpdate,
}
