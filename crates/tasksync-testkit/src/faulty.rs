//! Fault injection for storage.
//!
//! [`FaultyStore`] wraps any store and fails selected operations on demand,
//! so tests can check that storage faults surface instead of being
//! swallowed. Operations can also be stalled, to interleave a sync pass with
//! a local mutation that is already in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tasksync_core::{LocalMutation, QueueItem, QueueItemId, RecordId, SyncState, Task};
use tasksync_store::{
    ApplyResult, CommittedMutation, RecordedFailure, Result, Store, StoreError, SyncedOutcome,
};

/// A group of store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Record reads, listings and queue inspection.
    Read,
    /// `drain`.
    Drain,
    /// Record writes and enqueueing, including `commit_mutation`.
    Commit,
    /// `apply_outcome`.
    ApplyOutcome,
    /// `record_failure`, `increment_attempt` and `set_sync_state`.
    RecordFailure,
}

/// Shared switchboard of active faults.
#[derive(Debug, Default)]
pub struct Faults {
    /// Remaining failures per point; `None` fails until healed.
    active: Mutex<HashMap<FaultPoint, Option<u32>>>,
    /// Delay applied before every call at a point.
    stalls: Mutex<HashMap<FaultPoint, Duration>>,
}

impl Faults {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every call at `point` until healed.
    pub fn fail(&self, point: FaultPoint) {
        self.lock().insert(point, None);
    }

    /// Fail the next `times` calls at `point`.
    pub fn fail_times(&self, point: FaultPoint, times: u32) {
        self.lock().insert(point, Some(times));
    }

    /// Delay every call at `point` by `delay` until healed.
    pub fn stall(&self, point: FaultPoint, delay: Duration) {
        self.stall_lock().insert(point, delay);
    }

    /// Clear failures and stalls at `point`.
    pub fn heal(&self, point: FaultPoint) {
        self.lock().remove(&point);
        self.stall_lock().remove(&point);
    }

    pub fn heal_all(&self) {
        self.lock().clear();
        self.stall_lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<FaultPoint, Option<u32>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stall_lock(&self) -> std::sync::MutexGuard<'_, HashMap<FaultPoint, Duration>> {
        self.stalls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait out any stall at `point`, then fail if a fault is active.
    async fn gate(&self, point: FaultPoint) -> Result<()> {
        let delay = self.stall_lock().get(&point).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(point)
    }

    fn check(&self, point: FaultPoint) -> Result<()> {
        let mut active = self.lock();
        let fire = match active.get_mut(&point) {
            None => false,
            Some(None) => true,
            Some(Some(0)) => false,
            Some(Some(remaining)) => {
                *remaining -= 1;
                true
            }
        };
        if fire {
            return Err(StoreError::Unavailable(format!(
                "injected fault at {:?}",
                point
            )));
        }
        Ok(())
    }
}

/// Store wrapper that delegates to `S` unless a fault is active.
pub struct FaultyStore<S: Store> {
    inner: S,
    faults: Arc<Faults>,
}

impl<S: Store> FaultyStore<S> {
    pub fn new(inner: S, faults: Arc<Faults>) -> Self {
        Self { inner, faults }
    }

    pub fn faults(&self) -> &Arc<Faults> {
        &self.faults
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Store> Store for FaultyStore<S> {
    async fn get_task(&self, id: &RecordId) -> Result<Option<Task>> {
        self.faults.gate(FaultPoint::Read).await?;
        self.inner.get_task(id).await
    }

    async fn list_tasks(&self, exclude_deleted: bool) -> Result<Vec<Task>> {
        self.faults.gate(FaultPoint::Read).await?;
        self.inner.list_tasks(exclude_deleted).await
    }

    async fn list_by_sync_state(&self, states: &[SyncState]) -> Result<Vec<Task>> {
        self.faults.gate(FaultPoint::Read).await?;
        self.inner.list_by_sync_state(states).await
    }

    async fn upsert_task(&self, task: &Task) -> Result<()> {
        self.faults.gate(FaultPoint::Commit).await?;
        self.inner.upsert_task(task).await
    }

    async fn set_sync_state(&self, id: &RecordId, state: SyncState) -> Result<()> {
        self.faults.gate(FaultPoint::RecordFailure).await?;
        self.inner.set_sync_state(id, state).await
    }

    async fn purge_task(&self, id: &RecordId) -> Result<bool> {
        self.inner.purge_task(id).await
    }

    async fn last_synced_at(&self) -> Result<Option<i64>> {
        self.faults.gate(FaultPoint::Read).await?;
        self.inner.last_synced_at().await
    }

    async fn enqueue(&self, item: QueueItem) -> Result<QueueItem> {
        self.faults.gate(FaultPoint::Commit).await?;
        self.inner.enqueue(item).await
    }

    async fn drain(&self) -> Result<Vec<QueueItem>> {
        self.faults.gate(FaultPoint::Drain).await?;
        self.inner.drain().await
    }

    async fn remove(&self, item_id: &QueueItemId) -> Result<bool> {
        self.inner.remove(item_id).await
    }

    async fn increment_attempt(&self, item_id: &QueueItemId, error: &str) -> Result<u32> {
        self.faults.gate(FaultPoint::RecordFailure).await?;
        self.inner.increment_attempt(item_id, error).await
    }

    async fn reset_attempts(&self, record_id: &RecordId) -> Result<usize> {
        self.inner.reset_attempts(record_id).await
    }

    async fn items_for(&self, record_id: &RecordId) -> Result<Vec<QueueItem>> {
        self.faults.gate(FaultPoint::Read).await?;
        self.inner.items_for(record_id).await
    }

    async fn queue_len(&self) -> Result<usize> {
        self.faults.gate(FaultPoint::Read).await?;
        self.inner.queue_len().await
    }

    async fn commit_mutation(
        &self,
        id: &RecordId,
        mutation: &LocalMutation,
        item_id: QueueItemId,
        now: i64,
    ) -> Result<Option<CommittedMutation>> {
        self.faults.gate(FaultPoint::Commit).await?;
        self.inner.commit_mutation(id, mutation, item_id, now).await
    }

    async fn apply_outcome(
        &self,
        item: &QueueItem,
        outcome: &SyncedOutcome,
    ) -> Result<ApplyResult> {
        self.faults.gate(FaultPoint::ApplyOutcome).await?;
        self.inner.apply_outcome(item, outcome).await
    }

    async fn record_failure(
        &self,
        item_id: &QueueItemId,
        error: &str,
        max_attempts: u32,
    ) -> Result<RecordedFailure> {
        self.faults.gate(FaultPoint::RecordFailure).await?;
        self.inner.record_failure(item_id, error, max_attempts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_store::MemoryStore;

    #[tokio::test]
    async fn test_fault_fires_limited_times() {
        let faults = Faults::new();
        let store = FaultyStore::new(MemoryStore::new(), Arc::clone(&faults));
        faults.fail_times(FaultPoint::Drain, 2);

        assert!(matches!(store.drain().await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.drain().await, Err(StoreError::Unavailable(_))));
        assert!(store.drain().await.is_ok());
    }

    #[tokio::test]
    async fn test_fault_persists_until_healed() {
        let faults = Faults::new();
        let store = FaultyStore::new(MemoryStore::new(), Arc::clone(&faults));
        faults.fail(FaultPoint::Read);

        for _ in 0..3 {
            assert!(store.queue_len().await.is_err());
        }
        assert!(store.drain().await.is_ok());

        faults.heal(FaultPoint::Read);
        assert_eq!(store.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stall_delays_until_healed() {
        let faults = Faults::new();
        let store = FaultyStore::new(MemoryStore::new(), Arc::clone(&faults));
        faults.stall(FaultPoint::Drain, Duration::from_millis(200));

        let stalled = tokio::time::timeout(Duration::from_millis(20), store.drain()).await;
        assert!(stalled.is_err());
        assert!(store.queue_len().await.is_ok());

        faults.heal(FaultPoint::Drain);
        let healed = tokio::time::timeout(Duration::from_millis(200), store.drain()).await;
        assert!(healed.unwrap().is_ok());
    }
}
