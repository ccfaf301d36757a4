//! Sync pass state machine.
//!
//! One pass checks connectivity, drains the queue, partitions it into
//! batches, transmits them in order, reconciles every outcome and reports a
//! summary. Individual item failures never abort a pass.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use tasksync_core::{
    partition, resolve, AuthorityDecision, Clock, OperationKind, QueueItem, RecordId, SyncState,
};
use tasksync_store::{Store, SyncedOutcome};

use crate::error::{Result, SyncError, TransportError};
use crate::messages::BatchRequest;
use crate::retry::{FailureVerdict, RetryPolicy};
use crate::transport::Transport;

/// Configuration for sync behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum items per batch request.
    pub batch_size: usize,
    /// Failed attempts after which an item is dead-lettered.
    pub max_attempts: u32,
    /// Bound on the pre-flight reachability probe.
    pub connectivity_timeout: Duration,
    /// Bound on one batch request.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 3,
            connectivity_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(SyncError::Config("max_attempts must be positive".into()));
        }
        if self.connectivity_timeout.is_zero() {
            return Err(SyncError::Config("connectivity_timeout must be non-zero".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::Config("request_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Where a pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Idle,
    CheckingConnectivity,
    Draining,
    Batching,
    Transmitting,
    Reconciling,
    Reporting,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::CheckingConnectivity => "checking-connectivity",
            SyncPhase::Draining => "draining",
            SyncPhase::Batching => "batching",
            SyncPhase::Transmitting => "transmitting",
            SyncPhase::Reconciling => "reconciling",
            SyncPhase::Reporting => "reporting",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failure reported by a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorEntry {
    pub record_id: RecordId,
    #[serde(rename = "operationKind")]
    pub operation: OperationKind,
    pub message: String,
    pub timestamp: i64,
}

/// Result of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// True iff no item failed and the authority was reachable.
    pub success: bool,
    /// Items confirmed by the authority (accepted or resolved conflicts).
    pub synced_count: usize,
    /// Items that failed in this pass.
    pub failed_count: usize,
    pub errors: Vec<SyncErrorEntry>,
    /// False when the pass stopped at the connectivity check.
    pub reachable: bool,
    /// Dead-lettered items left untouched.
    pub skipped_count: usize,
}

impl SyncSummary {
    /// Summary of a pass that never got past the connectivity check.
    pub fn unreachable() -> Self {
        Self {
            success: false,
            synced_count: 0,
            failed_count: 0,
            errors: Vec::new(),
            reachable: false,
            skipped_count: 0,
        }
    }

    fn started(skipped_count: usize) -> Self {
        Self {
            success: false,
            synced_count: 0,
            failed_count: 0,
            errors: Vec::new(),
            reachable: true,
            skipped_count,
        }
    }

    fn record_failure(&mut self, item: &QueueItem, message: impl Into<String>, timestamp: i64) {
        self.failed_count += 1;
        self.note_error(item, message, timestamp);
    }

    fn note_error(&mut self, item: &QueueItem, message: impl Into<String>, timestamp: i64) {
        self.errors.push(SyncErrorEntry {
            record_id: item.record_id.clone(),
            operation: item.operation,
            message: message.into(),
            timestamp,
        });
    }
}

/// Point-in-time view of sync health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Records in the `pending` state.
    pub pending_count: usize,
    /// Latest successful sync across records.
    pub last_sync_timestamp: Option<i64>,
    pub is_reachable: bool,
    pub queue_size: usize,
}

/// The sync orchestrator.
///
/// Passes are serialized against each other. Local mutations go straight to
/// the store and are never blocked by a pass in flight.
pub struct SyncEngine<S: Store, T: Transport> {
    store: Arc<S>,
    transport: T,
    config: SyncConfig,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    /// Held for the duration of a pass.
    pass_lock: Mutex<()>,
    phase: RwLock<SyncPhase>,
}

impl<S: Store, T: Transport> SyncEngine<S, T> {
    /// Create an engine. Fails if the configuration is invalid.
    pub fn new(
        store: Arc<S>,
        transport: T,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let retry = RetryPolicy::new(config.max_attempts);

        Ok(Self {
            store,
            transport,
            config,
            retry,
            clock,
            pass_lock: Mutex::new(()),
            phase: RwLock::new(SyncPhase::Idle),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Current phase of the pass in flight, or `Idle`.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write().unwrap_or_else(|e| e.into_inner()) = phase;
        tracing::debug!(phase = %phase, "sync phase");
    }

    /// Probe the authority, bounded by the connectivity timeout.
    ///
    /// A probe that times out counts as unreachable.
    pub async fn is_reachable(&self) -> bool {
        tokio::time::timeout(
            self.config.connectivity_timeout,
            self.transport.check_reachability(),
        )
        .await
        .unwrap_or(false)
    }

    /// Run one full sync pass.
    ///
    /// Returns `Err` only when the pass cannot run at all, e.g. the queue
    /// cannot be read. Item failures are reported in the summary.
    pub async fn run_pass(&self) -> Result<SyncSummary> {
        let _pass = self.pass_lock.lock().await;
        let result = self.run_pass_locked().await;
        self.set_phase(SyncPhase::Idle);
        result
    }

    async fn run_pass_locked(&self) -> Result<SyncSummary> {
        self.set_phase(SyncPhase::CheckingConnectivity);
        if !self.is_reachable().await {
            tracing::warn!("authority unreachable, skipping sync pass");
            self.set_phase(SyncPhase::Reporting);
            return Ok(SyncSummary::unreachable());
        }

        self.set_phase(SyncPhase::Draining);
        let (items, dead): (Vec<QueueItem>, Vec<QueueItem>) = self
            .store
            .drain()
            .await?
            .into_iter()
            .partition(|item| self.retry.should_attempt(item));

        if !dead.is_empty() {
            tracing::debug!(count = dead.len(), "skipping dead-lettered items");
        }

        self.set_phase(SyncPhase::Batching);
        let batches = partition(&items, self.config.batch_size)?;
        let mut summary = SyncSummary::started(dead.len());

        for (index, batch) in batches.into_iter().enumerate() {
            self.process_batch(index, batch, &mut summary).await;
        }

        self.set_phase(SyncPhase::Reporting);
        summary.success = summary.failed_count == 0;
        tracing::info!(
            synced = summary.synced_count,
            failed = summary.failed_count,
            skipped = summary.skipped_count,
            "sync pass complete"
        );
        Ok(summary)
    }

    async fn process_batch(&self, index: usize, batch: &[QueueItem], summary: &mut SyncSummary) {
        self.set_phase(SyncPhase::Transmitting);
        let request = BatchRequest::from_items(batch, self.clock.now_millis());
        tracing::debug!(batch = index, items = request.len(), "sending batch");

        let outcome = self.transmit(&request).await;

        self.set_phase(SyncPhase::Reconciling);
        match outcome {
            Ok(decisions) => {
                for (item, decision) in batch.iter().zip(decisions) {
                    self.reconcile_item(item, decision, summary).await;
                }
            }
            Err(e) => {
                tracing::warn!(batch = index, error = %e, "batch failed, retrying every item");
                let message = e.to_string();
                for item in batch {
                    self.fail_item(item, &message, summary).await;
                }
            }
        }
    }

    /// Send one batch, bounded by the request timeout.
    async fn transmit(
        &self,
        request: &BatchRequest,
    ) -> std::result::Result<Vec<AuthorityDecision>, TransportError> {
        let timeout = self.config.request_timeout;
        let response = tokio::time::timeout(timeout, self.transport.send(request))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        response.into_decisions(request)
    }

    async fn reconcile_item(
        &self,
        item: &QueueItem,
        decision: AuthorityDecision,
        summary: &mut SyncSummary,
    ) {
        let resolution = match resolve(&item.payload, &decision) {
            Some(resolution) => resolution,
            None => {
                let message = match decision {
                    AuthorityDecision::Rejected { message } => message,
                    _ => "item not reconciled".to_string(),
                };
                tracing::warn!(
                    record = %item.record_id,
                    error = %message,
                    "authority rejected item"
                );
                self.fail_item(item, &message, summary).await;
                return;
            }
        };

        let now = self.clock.now_millis();
        let outcome = SyncedOutcome {
            snapshot: resolution.snapshot,
            remote_id: resolution.remote_id,
            synced_at: now,
        };

        match self.store.apply_outcome(item, &outcome).await {
            Ok(applied) => {
                summary.synced_count += 1;
                tracing::debug!(
                    record = %item.record_id,
                    winner = ?resolution.winner,
                    applied = applied.is_applied(),
                    retired = applied.retired(),
                    "item reconciled"
                );
            }
            Err(e) => {
                // The item stays queued untouched for the next pass.
                tracing::error!(
                    record = %item.record_id,
                    error = %e,
                    "failed to apply sync outcome"
                );
                summary.record_failure(item, format!("storage error: {}", e), now);
            }
        }
    }

    async fn fail_item(&self, item: &QueueItem, message: &str, summary: &mut SyncSummary) {
        let now = self.clock.now_millis();
        summary.record_failure(item, message, now);

        match self.retry.on_item_failure(self.store.as_ref(), item, message).await {
            Ok(FailureVerdict::DeadLettered { .. }) | Ok(FailureVerdict::Retry { .. }) => {}
            Err(e) => {
                tracing::error!(
                    record = %item.record_id,
                    error = %e,
                    "failed to record item failure"
                );
                summary.note_error(item, format!("storage error: {}", e), now);
            }
        }
    }

    /// Current sync health, including a bounded reachability probe.
    pub async fn status(&self) -> Result<SyncStatus> {
        let pending_count = self.store.list_by_sync_state(&[SyncState::Pending]).await?.len();
        let last_sync_timestamp = self.store.last_synced_at().await?;
        let queue_size = self.store.queue_len().await?;
        let is_reachable = self.is_reachable().await;

        Ok(SyncStatus {
            pending_count,
            last_sync_timestamp,
            is_reachable,
            queue_size,
        })
    }
}
