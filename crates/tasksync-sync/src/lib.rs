//! # TaskSync Sync
//!
//! The sync engine: drains the mutation queue, transmits it to the remote
//! authority in ordered batches, reconciles every outcome and retries what
//! failed.
//!
//! ## Guarantees
//!
//! - **At-least-once**: queue items are removed only after a confirmed outcome
//! - **Ordered**: batches go out sequentially, in queue order
//! - **No downgrade**: a stale outcome never overwrites a newer local edit
//! - **Bounded retries**: items are dead-lettered after `max_attempts` failures
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasksync_core::SystemClock;
//! use tasksync_store::SqliteStore;
//! use tasksync_sync::{MemoryAuthority, SyncConfig, SyncEngine};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("tasks.db")?);
//!     let engine = SyncEngine::new(
//!         store,
//!         MemoryAuthority::new(),
//!         SyncConfig::default(),
//!         Arc::new(SystemClock),
//!     )?;
//!
//!     let summary = engine.run_pass().await?;
//!     println!("synced {}, failed {}", summary.synced_count, summary.failed_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Pass Flow
//!
//! ```text
//! idle -> checking-connectivity -> draining -> batching
//!      -> transmitting <-> reconciling (per batch) -> reporting -> idle
//! ```

pub mod engine;
pub mod error;
pub mod messages;
pub mod retry;
pub mod transport;

pub use engine::{SyncConfig, SyncEngine, SyncErrorEntry, SyncPhase, SyncStatus, SyncSummary};
pub use error::{Result, SyncError, TransportError};
pub use messages::{BatchItem, BatchRequest, BatchResponse, OutcomeItem, OutcomeStatus};
pub use retry::{FailureVerdict, RetryPolicy};
pub use transport::{memory::MemoryAuthority, Transport};
