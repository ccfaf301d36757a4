//! # TaskSync
//!
//! Offline-first task records with a durable mutation queue that reconciles
//! with a remote authority.
//!
//! ## Overview
//!
//! - **Local mutations**: create, update and soft-delete work offline; each
//!   one writes the record and queues a full-state snapshot atomically
//! - **Sync passes**: queued operations go out in ordered batches
//! - **Conflicts**: last-write-wins on the modification timestamp, with
//!   ties going to the authority
//! - **Retries**: failed items are retried up to a ceiling, then
//!   dead-lettered until someone intervenes
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasksync::{MemoryAuthority, TaskSync, TaskSyncConfig, TaskUpdate};
//! use tasksync::store::SqliteStore;
//!
//! async fn example() -> tasksync::Result<()> {
//!     let store = SqliteStore::open("tasks.db")?;
//!     let tasks = TaskSync::new(store, MemoryAuthority::new(), TaskSyncConfig::default())?;
//!
//!     let task = tasks.create_task("Buy milk", "").await?;
//!     tasks
//!         .update_task(&task.id, TaskUpdate::default().completed(true))
//!         .await?;
//!
//!     let summary = tasks.sync().await?;
//!     println!("synced {} items", summary.synced_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `tasksync::core` - Data model, batching and conflict resolution
//! - `tasksync::store` - Storage abstraction, SQLite and in-memory stores
//! - `tasksync::sync` - Sync engine, transport and retry policy

pub mod client;
pub mod error;

// Re-export component crates
pub use tasksync_core as core;
pub use tasksync_store as store;
pub use tasksync_sync as sync;

// Re-export main types for convenience
pub use client::{TaskSync, TaskSyncConfig};
pub use error::{Result, TaskSyncError};

// Re-export commonly used types
pub use tasksync_core::{OperationKind, QueueItem, RecordId, RemoteId, SyncState, Task, TaskUpdate};
pub use tasksync_sync::{MemoryAuthority, SyncConfig, SyncStatus, SyncSummary, Transport};
