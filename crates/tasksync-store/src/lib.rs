//! # TaskSync Store
//!
//! Storage abstraction for TaskSync. Provides a trait-based interface for the
//! local record table and the durable mutation queue, with SQLite and
//! in-memory implementations.
//!
//! ## Overview
//!
//! The [`Store`] trait covers three concerns that must share one critical
//! section:
//!
//! - **Records**: keyed task rows with soft-delete and sync state
//! - **Mutation queue**: an append-only log of pending operations
//! - **Sync bookkeeping**: atomic "apply edit to current row + enqueue" for
//!   local edits, and atomic "check for newer work + write" for sync
//!   outcomes and failures
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`SyncedOutcome`] - A reconciled result to apply to a record
//! - [`ApplyResult`] - Whether that result landed or was superseded
//! - [`CommittedMutation`] - A local edit as stored and enqueued
//! - [`RecordedFailure`] - Attempt count and state after a failed send
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasksync_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("tasks.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let pending = store.drain().await.unwrap();
//!     println!("{} queued operations", pending.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Non-destructive drain**: `drain` never removes items; removal happens
//!   only after the authority confirms, so a crash in between re-sends
//!   (at-least-once)
//! - **Queue order**: `(enqueued_at, seq)` ascending; enqueue timestamps are
//!   clamped to be non-decreasing so the two keys never disagree
//! - **Write-after check**: a sync outcome or failure for an item never
//!   overwrites a record that has a later queued mutation

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ApplyResult, CommittedMutation, RecordedFailure, Store, SyncedOutcome};
