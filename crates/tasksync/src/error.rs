//! Error types for TaskSync.

use tasksync_core::{RecordId, ValidationError};
use tasksync_store::StoreError;
use tasksync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during TaskSync operations.
#[derive(Debug, Error)]
pub enum TaskSyncError {
    /// Mutation input was rejected. Nothing was written or enqueued.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// No visible task with this id.
    #[error("task not found: {0}")]
    TaskNotFound(RecordId),

    /// A task with this id already exists.
    #[error("task already exists: {0}")]
    TaskExists(RecordId),
}

/// Result type for TaskSync operations.
pub type Result<T> = std::result::Result<T, TaskSyncError>;
