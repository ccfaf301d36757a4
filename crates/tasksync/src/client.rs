//! TaskSync: unified API for offline task mutation and sync.
//!
//! Local mutations are validated, written and enqueued in one step. Sync
//! passes run through the engine and can overlap with local mutations.

use std::sync::Arc;

use tokio::sync::Mutex;

use tasksync_core::{
    validate_new_task, validate_update, Clock, IdGenerator, LocalMutation, QueueItem, RandomIds,
    RecordId, SyncState, SystemClock, Task, TaskUpdate,
};
use tasksync_store::Store;
use tasksync_sync::{SyncConfig, SyncEngine, SyncStatus, SyncSummary, Transport};

use crate::error::{Result, TaskSyncError};

/// Configuration for TaskSync.
#[derive(Debug, Clone, Default)]
pub struct TaskSyncConfig {
    /// Sync configuration.
    pub sync: SyncConfig,
}

/// The main TaskSync struct.
///
/// Provides a unified API for:
/// - Creating, editing and soft-deleting tasks while offline
/// - Reading tasks (deleted tasks are hidden)
/// - Running sync passes and querying sync status
/// - Clearing dead-lettered queue items
pub struct TaskSync<S: Store, T: Transport> {
    /// The storage backend, shared with the engine.
    store: Arc<S>,
    /// The sync orchestrator.
    engine: SyncEngine<S, T>,
    /// Configuration.
    config: TaskSyncConfig,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    /// Serializes local mutations with dead-letter intervention and
    /// compaction.
    write_lock: Mutex<()>,
}

impl<S: Store, T: Transport> TaskSync<S, T> {
    /// Create a TaskSync instance with random ids and the system clock.
    pub fn new(store: S, transport: T, config: TaskSyncConfig) -> Result<Self> {
        Self::with_capabilities(
            store,
            transport,
            config,
            Arc::new(RandomIds),
            Arc::new(SystemClock),
        )
    }

    /// Create a TaskSync instance with explicit id and time sources.
    pub fn with_capabilities(
        store: S,
        transport: T,
        config: TaskSyncConfig,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = Arc::new(store);
        let engine = SyncEngine::new(
            Arc::clone(&store),
            transport,
            config.sync.clone(),
            Arc::clone(&clock),
        )?;

        Ok(Self {
            store,
            engine,
            config,
            ids,
            clock,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the sync engine.
    pub fn engine(&self) -> &SyncEngine<S, T> {
        &self.engine
    }

    pub fn config(&self) -> &TaskSyncConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a task with a freshly generated id.
    pub async fn create_task(&self, title: &str, description: &str) -> Result<Task> {
        self.create_task_with_id(self.ids.record_id(), title, description).await
    }

    /// Create a task with a caller-chosen id.
    ///
    /// The task starts `pending` with one `create` item queued.
    pub async fn create_task_with_id(
        &self,
        id: RecordId,
        title: &str,
        description: &str,
    ) -> Result<Task> {
        validate_new_task(&id, title, description)?;

        let task = self
            .commit(&id, LocalMutation::create(title, description))
            .await?
            .ok_or(TaskSyncError::TaskExists(id))?;
        tracing::debug!(record = %task.id, "task created");
        Ok(task)
    }

    /// Apply a partial edit to a visible task.
    ///
    /// The edit lands on the record as stored when it commits, so fields and
    /// sync bookkeeping written by a concurrent pass are kept.
    pub async fn update_task(&self, id: &RecordId, update: TaskUpdate) -> Result<Task> {
        validate_update(&update)?;

        let task = self
            .commit(id, LocalMutation::Update(update))
            .await?
            .ok_or_else(|| TaskSyncError::TaskNotFound(id.clone()))?;
        tracing::debug!(record = %task.id, "task updated");
        Ok(task)
    }

    /// Soft-delete a visible task.
    ///
    /// The task disappears from read paths immediately. It stays in the store
    /// until the deletion is synced and [`TaskSync::compact`] runs.
    pub async fn delete_task(&self, id: &RecordId) -> Result<()> {
        self.commit(id, LocalMutation::Delete)
            .await?
            .ok_or_else(|| TaskSyncError::TaskNotFound(id.clone()))?;
        tracing::debug!(record = %id, "task deleted");
        Ok(())
    }

    /// Commit a mutation against the stored record. `None` if it does not
    /// apply to the record's current state.
    async fn commit(&self, id: &RecordId, mutation: LocalMutation) -> Result<Option<Task>> {
        let _guard = self.write_lock.lock().await;
        let committed = self
            .store
            .commit_mutation(id, &mutation, self.ids.queue_item_id(), self.clock.now_millis())
            .await?;
        Ok(committed.map(|c| c.task))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a task by id. Soft-deleted tasks are not returned.
    pub async fn get_task(&self, id: &RecordId) -> Result<Option<Task>> {
        Ok(self.store.get_task(id).await?.filter(Task::is_visible))
    }

    /// List visible tasks, oldest first.
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks(true).await?)
    }

    /// List tasks (including soft-deleted ones) in any of `states`.
    pub async fn tasks_in_state(&self, states: &[SyncState]) -> Result<Vec<Task>> {
        Ok(self.store.list_by_sync_state(states).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one sync pass.
    pub async fn sync(&self) -> Result<SyncSummary> {
        Ok(self.engine.run_pass().await?)
    }

    /// Current sync health.
    pub async fn status(&self) -> Result<SyncStatus> {
        Ok(self.engine.status().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dead-Letter Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue items that reached the retry ceiling.
    pub async fn dead_letters(&self) -> Result<Vec<QueueItem>> {
        let max_attempts = self.config.sync.max_attempts;
        Ok(self
            .store
            .drain()
            .await?
            .into_iter()
            .filter(|item| item.is_dead_lettered(max_attempts))
            .collect())
    }

    /// Give a task's queued items a fresh set of attempts.
    ///
    /// The task goes back to `pending`. Returns the number of items reset.
    pub async fn retry_failed(&self, id: &RecordId) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        if self.store.get_task(id).await?.is_none() {
            return Err(TaskSyncError::TaskNotFound(id.clone()));
        }

        let reset = self.store.reset_attempts(id).await?;
        if reset > 0 {
            self.store.set_sync_state(id, SyncState::Pending).await?;
            tracing::info!(record = %id, items = reset, "dead letters reset for retry");
        }
        Ok(reset)
    }

    /// Drop a task's dead-lettered items without transmitting them.
    ///
    /// The task returns to `pending` if other items are still queued for it,
    /// and to `error` otherwise, since its local state never reached the
    /// authority. Returns the number of items dropped.
    pub async fn discard_failed(&self, id: &RecordId) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        if self.store.get_task(id).await?.is_none() {
            return Err(TaskSyncError::TaskNotFound(id.clone()));
        }

        let max_attempts = self.config.sync.max_attempts;
        let mut discarded = 0;
        for item in self.store.items_for(id).await? {
            if item.is_dead_lettered(max_attempts) && self.store.remove(&item.id).await? {
                discarded += 1;
            }
        }

        if discarded > 0 {
            let remaining = self.store.items_for(id).await?;
            let state = if remaining.is_empty() {
                SyncState::Error
            } else {
                SyncState::Pending
            };
            self.store.set_sync_state(id, state).await?;
            tracing::warn!(record = %id, items = discarded, "dead letters discarded");
        }
        Ok(discarded)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Hard-delete soft-deleted tasks whose deletion the authority confirmed.
    ///
    /// Returns the number of tasks purged.
    pub async fn compact(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut purged = 0;

        for task in self.store.list_by_sync_state(&[SyncState::Synced]).await? {
            if !task.deleted || !self.store.items_for(&task.id).await?.is_empty() {
                continue;
            }
            if self.store.purge_task(&task.id).await? {
                purged += 1;
            }
        }

        if purged > 0 {
            tracing::info!(purged, "compacted deleted tasks");
        }
        Ok(purged)
    }
}
