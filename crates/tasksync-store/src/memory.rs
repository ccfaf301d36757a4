//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use tasksync_core::{LocalMutation, QueueItem, QueueItemId, RecordId, SyncState, Task};

use crate::error::{Result, StoreError};
use crate::traits::{ApplyResult, CommittedMutation, RecordedFailure, Store, SyncedOutcome};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; the
/// record table and the queue share one lock, so the compound operations are
/// atomic.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records indexed by id.
    tasks: HashMap<RecordId, Task>,

    /// Queue items keyed by insertion sequence.
    queue: BTreeMap<u64, QueueItem>,

    /// Item id -> insertion sequence.
    index: HashMap<QueueItemId, u64>,

    /// Last assigned insertion sequence.
    last_seq: u64,
}

impl MemoryStoreInner {
    fn enqueue(&mut self, mut item: QueueItem) -> QueueItem {
        let floor = self
            .queue
            .values()
            .map(|i| i.enqueued_at)
            .max()
            .unwrap_or(i64::MIN);
        item.enqueued_at = item.enqueued_at.max(floor);

        self.last_seq += 1;
        item.seq = self.last_seq;

        self.index.insert(item.id.clone(), item.seq);
        self.queue.insert(item.seq, item.clone());
        item
    }

    fn remove_seq(&mut self, seq: u64) -> Option<QueueItem> {
        let item = self.queue.remove(&seq)?;
        self.index.remove(&item.id);
        Some(item)
    }

    fn ordered_items(&self, filter: impl Fn(&QueueItem) -> bool) -> Vec<QueueItem> {
        let mut items: Vec<QueueItem> =
            self.queue.values().filter(|&i| filter(i)).cloned().collect();
        items.sort_by_key(QueueItem::order_key);
        items
    }

    fn seq_of(&self, item_id: &QueueItemId) -> Result<u64> {
        self.index
            .get(item_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("queue item {}", item_id)))
    }

    fn item_mut(&mut self, seq: u64) -> Result<&mut QueueItem> {
        self.queue
            .get_mut(&seq)
            .ok_or_else(|| StoreError::InvalidData(format!("dangling queue sequence {}", seq)))
    }

    fn has_later_item(&self, record_id: &RecordId, seq: u64) -> bool {
        self.queue
            .range(seq + 1..)
            .any(|(_, i)| &i.record_id == record_id)
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_task(&self, id: &RecordId) -> Result<Option<Task>> {
        let inner = self.read()?;
        Ok(inner.tasks.get(id).cloned())
    }

    async fn list_tasks(&self, exclude_deleted: bool) -> Result<Vec<Task>> {
        let inner = self.read()?;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| !exclude_deleted || !t.deleted)
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn list_by_sync_state(&self, states: &[SyncState]) -> Result<Vec<Task>> {
        let inner = self.read()?;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| states.contains(&t.sync_state))
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn upsert_task(&self, task: &Task) -> Result<()> {
        let mut inner = self.write()?;
        inner.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn set_sync_state(&self, id: &RecordId, state: SyncState) -> Result<()> {
        let mut inner = self.write()?;
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))?;
        task.sync_state = state;
        Ok(())
    }

    async fn purge_task(&self, id: &RecordId) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner.tasks.remove(id).is_some())
    }

    async fn last_synced_at(&self) -> Result<Option<i64>> {
        let inner = self.read()?;
        Ok(inner.tasks.values().filter_map(|t| t.last_synced_at).max())
    }

    async fn enqueue(&self, item: QueueItem) -> Result<QueueItem> {
        let mut inner = self.write()?;
        Ok(inner.enqueue(item))
    }

    async fn drain(&self) -> Result<Vec<QueueItem>> {
        let inner = self.read()?;
        Ok(inner.ordered_items(|_| true))
    }

    async fn remove(&self, item_id: &QueueItemId) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.index.get(item_id).copied() {
            Some(seq) => Ok(inner.remove_seq(seq).is_some()),
            None => Ok(false),
        }
    }

    async fn increment_attempt(&self, item_id: &QueueItemId, error: &str) -> Result<u32> {
        let mut inner = self.write()?;
        let seq = inner.seq_of(item_id)?;
        let item = inner.item_mut(seq)?;
        item.attempts += 1;
        item.last_error = Some(error.to_owned());
        Ok(item.attempts)
    }

    async fn reset_attempts(&self, record_id: &RecordId) -> Result<usize> {
        let mut inner = self.write()?;
        let mut reset = 0;
        for item in inner.queue.values_mut().filter(|i| &i.record_id == record_id) {
            item.attempts = 0;
            item.last_error = None;
            reset += 1;
        }
        Ok(reset)
    }

    async fn items_for(&self, record_id: &RecordId) -> Result<Vec<QueueItem>> {
        let inner = self.read()?;
        Ok(inner.ordered_items(|i| &i.record_id == record_id))
    }

    async fn queue_len(&self) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner.queue.len())
    }

    async fn commit_mutation(
        &self,
        id: &RecordId,
        mutation: &LocalMutation,
        item_id: QueueItemId,
        now: i64,
    ) -> Result<Option<CommittedMutation>> {
        let mut inner = self.write()?;
        let current = inner.tasks.get(id).cloned();
        let Some(task) = mutation.apply(id, current, now) else {
            return Ok(None);
        };

        let item = inner.enqueue(QueueItem::new(
            item_id,
            mutation.operation(),
            task.snapshot(),
            now,
        ));
        inner.tasks.insert(task.id.clone(), task.clone());
        Ok(Some(CommittedMutation { task, item }))
    }

    async fn apply_outcome(
        &self,
        item: &QueueItem,
        outcome: &SyncedOutcome,
    ) -> Result<ApplyResult> {
        let mut inner = self.write()?;

        if !inner.tasks.contains_key(&item.record_id) {
            return Err(StoreError::NotFound(format!("task {}", item.record_id)));
        }

        let superseded = inner.has_later_item(&item.record_id, item.seq);

        let earlier: Vec<u64> = inner
            .queue
            .values()
            .filter(|i| i.record_id == item.record_id && i.seq < item.seq)
            .map(|i| i.seq)
            .collect();
        for seq in &earlier {
            inner.remove_seq(*seq);
        }
        inner.remove_seq(item.seq);

        let task = inner
            .tasks
            .get_mut(&item.record_id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", item.record_id)))?;

        if task.remote_id.is_none() {
            task.remote_id = outcome.remote_id.clone();
        }

        if superseded {
            return Ok(ApplyResult::Superseded {
                retired: earlier.len(),
            });
        }

        task.apply_snapshot(&outcome.snapshot);
        task.sync_state = SyncState::Synced;
        task.last_synced_at = Some(outcome.synced_at);

        Ok(ApplyResult::Applied {
            retired: earlier.len(),
        })
    }

    async fn record_failure(
        &self,
        item_id: &QueueItemId,
        error: &str,
        max_attempts: u32,
    ) -> Result<RecordedFailure> {
        let mut inner = self.write()?;
        let seq = inner.seq_of(item_id)?;
        let record_id = inner.item_mut(seq)?.record_id.clone();
        if !inner.tasks.contains_key(&record_id) {
            return Err(StoreError::NotFound(format!("task {}", record_id)));
        }

        let item = inner.item_mut(seq)?;
        item.attempts += 1;
        item.last_error = Some(error.to_owned());
        let attempts = item.attempts;

        let state = if inner.has_later_item(&record_id, seq) {
            None
        } else {
            Some(SyncState::after_failure(attempts, max_attempts))
        };
        if let (Some(state), Some(task)) = (state, inner.tasks.get_mut(&record_id)) {
            task.sync_state = state;
        }

        Ok(RecordedFailure { attempts, state })
    }
}
