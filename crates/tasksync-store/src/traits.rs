//! Store trait: the abstract interface for records and the mutation queue.
//!
//! This trait keeps the sync engine storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use tasksync_core::{
    LocalMutation, QueueItem, QueueItemId, RecordId, RemoteId, SyncState, Task, TaskSnapshot,
};

use crate::error::Result;

/// A reconciled sync result for one queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedOutcome {
    /// The record state to keep (the resolver's winner).
    pub snapshot: TaskSnapshot,
    /// Remote id assigned by the authority, if any.
    pub remote_id: Option<RemoteId>,
    /// When the outcome was applied (Unix ms).
    pub synced_at: i64,
}

/// A local mutation as it was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedMutation {
    /// The record after the mutation, in state `Pending`.
    pub task: Task,
    /// The queue item carrying the record's new state.
    pub item: QueueItem,
}

/// Result of recording a failed transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedFailure {
    /// Attempt count after this failure.
    pub attempts: u32,
    /// State written to the record. `None` when a later item for the record
    /// is queued and the record kept its state.
    pub state: Option<SyncState>,
}

impl RecordedFailure {
    pub fn is_superseded(&self) -> bool {
        self.state.is_none()
    }
}

/// Result of applying a sync outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// The record took the reconciled state and is now `synced`.
    Applied {
        /// Earlier queue items for the same record that were retired.
        retired: usize,
    },
    /// A later mutation for the record is still queued; the record kept its
    /// local fields and state. Only a newly assigned remote id was recorded.
    Superseded { retired: usize },
}

impl ApplyResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyResult::Applied { .. })
    }

    pub fn retired(&self) -> usize {
        match self {
            ApplyResult::Applied { retired } | ApplyResult::Superseded { retired } => *retired,
        }
    }
}

/// The Store trait: async interface for record and queue persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Drain is read-only**: removal is an explicit, separate operation.
/// - **Ordering**: queue items come back ordered by `(enqueued_at, seq)`.
/// - **Atomic bookkeeping**: [`Store::commit_mutation`],
///   [`Store::apply_outcome`] and [`Store::record_failure`] each run in one
///   critical section. A local edit is applied to the row as stored at
///   commit time, and a stale sync result never overwrites a record with a
///   later queued mutation.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a record by id, including soft-deleted records.
    async fn get_task(&self, id: &RecordId) -> Result<Option<Task>>;

    /// List records ordered by `(created_at, id)`.
    async fn list_tasks(&self, exclude_deleted: bool) -> Result<Vec<Task>>;

    /// List records (deleted or not) whose sync state is one of `states`.
    async fn list_by_sync_state(&self, states: &[SyncState]) -> Result<Vec<Task>>;

    /// Insert or replace a record without touching the queue.
    async fn upsert_task(&self, task: &Task) -> Result<()>;

    /// Set a record's sync state.
    ///
    /// Returns `NotFound` if the record does not exist.
    async fn set_sync_state(&self, id: &RecordId, state: SyncState) -> Result<()>;

    /// Hard-delete a record. Returns whether a row was removed.
    async fn purge_task(&self, id: &RecordId) -> Result<bool>;

    /// Latest `last_synced_at` across all records.
    async fn last_synced_at(&self) -> Result<Option<i64>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queue Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an item to the queue.
    ///
    /// Assigns the insertion sequence and clamps `enqueued_at` so it is not
    /// earlier than any item already queued. Returns the stored item.
    async fn enqueue(&self, item: QueueItem) -> Result<QueueItem>;

    /// All queued items in queue order. Nothing is removed.
    async fn drain(&self) -> Result<Vec<QueueItem>>;

    /// Remove one item. Returns whether it existed.
    async fn remove(&self, item_id: &QueueItemId) -> Result<bool>;

    /// Bump an item's attempt count and record the failure message.
    ///
    /// Returns the new attempt count, or `NotFound`.
    async fn increment_attempt(&self, item_id: &QueueItemId, error: &str) -> Result<u32>;

    /// Reset the attempt count of every queued item for a record.
    ///
    /// Returns the number of items reset.
    async fn reset_attempts(&self, record_id: &RecordId) -> Result<usize>;

    /// Queued items for one record, in queue order.
    async fn items_for(&self, record_id: &RecordId) -> Result<Vec<QueueItem>>;

    /// Number of queued items.
    async fn queue_len(&self) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a local mutation to the stored record and enqueue it atomically.
    ///
    /// The mutation is applied to the row as stored at commit time (see
    /// [`LocalMutation::apply`]). The record becomes `Pending` and an item
    /// with id `item_id`, enqueued at `now`, carries its new state.
    ///
    /// Returns `None`, writing nothing, when the mutation does not apply.
    async fn commit_mutation(
        &self,
        id: &RecordId,
        mutation: &LocalMutation,
        item_id: QueueItemId,
        now: i64,
    ) -> Result<Option<CommittedMutation>>;

    /// Apply a confirmed outcome for `item` atomically.
    ///
    /// - If a later item for the same record is queued, the record keeps its
    ///   fields and state; a remote id is recorded if the record had none.
    /// - Otherwise the outcome's snapshot is written, the state becomes
    ///   `Synced` and `last_synced_at` is set.
    ///
    /// In both cases `item` and every earlier item for the same record are
    /// removed from the queue.
    async fn apply_outcome(
        &self,
        item: &QueueItem,
        outcome: &SyncedOutcome,
    ) -> Result<ApplyResult>;

    /// Record a failed transmission of an item atomically.
    ///
    /// Bumps the item's attempt count and stores `error`. Unless a later item
    /// for the same record is queued, the record becomes `Failed` once the
    /// count reaches `max_attempts` and `Error` before that.
    ///
    /// Returns `NotFound` if the item or its record is missing.
    async fn record_failure(
        &self,
        item_id: &QueueItemId,
        error: &str,
        max_attempts: u32,
    ) -> Result<RecordedFailure>;
}
