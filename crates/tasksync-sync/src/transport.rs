//! Transport abstraction for reaching the remote authority.
//!
//! The transport sends one batch and returns the authority's per-item
//! outcomes. Implementations may use HTTP or any other request/response
//! channel; request mapping and retries of the channel itself are theirs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::messages::{BatchRequest, BatchResponse};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport trait for exchanging batches with the authority.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one batch and wait for the authority's outcomes.
    ///
    /// An `Err` means the whole batch failed.
    async fn send(&self, request: &BatchRequest) -> Result<BatchResponse>;

    /// Cheap pre-flight probe. `false` means the authority is unreachable.
    ///
    /// Callers bound this with a timeout and treat expiry as unreachable.
    async fn check_reachability(&self) -> bool;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &BatchRequest) -> Result<BatchResponse> {
        (**self).send(request).await
    }

    async fn check_reachability(&self) -> bool {
        (**self).check_reachability().await
    }
}

/// An in-memory authority for testing.
///
/// Keeps its own copy of every record and answers batches the way a real
/// authority would, with scriptable outages and rejections. Requests and
/// responses pass through the JSON wire codec.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use tasksync_core::{OperationKind, RecordId, RemoteId, TaskSnapshot};
    use tokio::sync::Mutex;

    use crate::messages::{self, OutcomeItem};

    struct AuthorityRecord {
        remote_id: RemoteId,
        snapshot: TaskSnapshot,
    }

    #[derive(Default)]
    struct AuthorityState {
        records: HashMap<RecordId, AuthorityRecord>,
        reachable: bool,
        /// Number of upcoming sends that fail wholesale.
        outages: u32,
        /// Records the authority refuses, with the reported message.
        rejections: HashMap<RecordId, String>,
        /// Every request received, decoded from the wire.
        received: Vec<BatchRequest>,
        next_remote: u64,
        send_delay: Option<Duration>,
        probe_delay: Option<Duration>,
    }

    impl AuthorityState {
        fn assign_remote_id(&mut self) -> RemoteId {
            self.next_remote += 1;
            RemoteId::new(format!("srv-{}", self.next_remote))
        }

        fn process(&mut self, request: &BatchRequest) -> BatchResponse {
            let processed_items = request
                .items
                .iter()
                .map(|item| {
                    if let Some(message) = self.rejections.get(&item.record_id) {
                        return OutcomeItem::error(item.record_id.clone(), message.clone());
                    }

                    match self.records.get_mut(&item.record_id) {
                        Some(existing)
                            if existing.snapshot.updated_at > item.payload.updated_at =>
                        {
                            OutcomeItem::conflict(
                                item.record_id.clone(),
                                Some(existing.remote_id.clone()),
                                existing.snapshot.clone(),
                            )
                        }
                        Some(existing) => {
                            existing.snapshot = item.payload.clone();
                            // A redelivered create echoes the id it was given.
                            let remote_id = (item.operation == OperationKind::Create)
                                .then(|| existing.remote_id.clone());
                            OutcomeItem::success(item.record_id.clone(), remote_id)
                        }
                        None => {
                            let remote_id = self.assign_remote_id();
                            self.records.insert(
                                item.record_id.clone(),
                                AuthorityRecord {
                                    remote_id: remote_id.clone(),
                                    snapshot: item.payload.clone(),
                                },
                            );
                            OutcomeItem::success(item.record_id.clone(), Some(remote_id))
                        }
                    }
                })
                .collect();

            BatchResponse { processed_items }
        }
    }

    /// In-memory authority implementation.
    pub struct MemoryAuthority {
        state: Mutex<AuthorityState>,
    }

    impl MemoryAuthority {
        /// Create a reachable authority with no records.
        pub fn new() -> Self {
            Self {
                state: Mutex::new(AuthorityState {
                    reachable: true,
                    ..AuthorityState::default()
                }),
            }
        }

        /// Toggle reachability for both probes and sends.
        pub async fn set_reachable(&self, reachable: bool) {
            self.state.lock().await.reachable = reachable;
        }

        /// Fail the next `count` sends wholesale.
        pub async fn fail_next(&self, count: u32) {
            self.state.lock().await.outages = count;
        }

        /// Report `error` for every item of `record_id` until cleared.
        pub async fn reject(&self, record_id: &RecordId, message: impl Into<String>) {
            self.state
                .lock()
                .await
                .rejections
                .insert(record_id.clone(), message.into());
        }

        pub async fn clear_rejection(&self, record_id: &RecordId) {
            self.state.lock().await.rejections.remove(record_id);
        }

        /// Delay every send, to simulate a stalled authority.
        pub async fn set_send_delay(&self, delay: Option<Duration>) {
            self.state.lock().await.send_delay = delay;
        }

        /// Delay every reachability probe.
        pub async fn set_probe_delay(&self, delay: Option<Duration>) {
            self.state.lock().await.probe_delay = delay;
        }

        /// Store the authority's own copy of a record, as if another client
        /// had written it. Returns the record's remote id.
        pub async fn seed_record(&self, snapshot: TaskSnapshot) -> RemoteId {
            let mut state = self.state.lock().await;
            let remote_id = match state.records.get(&snapshot.id) {
                Some(existing) => existing.remote_id.clone(),
                None => state.assign_remote_id(),
            };
            state.records.insert(
                snapshot.id.clone(),
                AuthorityRecord {
                    remote_id: remote_id.clone(),
                    snapshot,
                },
            );
            remote_id
        }

        /// The authority's copy of a record.
        pub async fn record(&self, record_id: &RecordId) -> Option<TaskSnapshot> {
            self.state
                .lock()
                .await
                .records
                .get(record_id)
                .map(|r| r.snapshot.clone())
        }

        /// Every request received so far, including failed ones.
        pub async fn requests(&self) -> Vec<BatchRequest> {
            self.state.lock().await.received.clone()
        }
    }

    impl Default for MemoryAuthority {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for MemoryAuthority {
        async fn send(&self, request: &BatchRequest) -> Result<BatchResponse> {
            let body = messages::encode_request(request)?;

            let delay = self.state.lock().await.send_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let response = {
                let mut state = self.state.lock().await;
                if !state.reachable {
                    return Err(TransportError::Unreachable("memory authority offline".into()));
                }

                let request = messages::decode_request(&body)?;
                state.received.push(request.clone());

                if state.outages > 0 {
                    state.outages -= 1;
                    return Err(TransportError::SendFailed("connection reset".into()));
                }

                state.process(&request)
            };

            messages::decode_response(&messages::encode_response(&response)?)
        }

        async fn check_reachability(&self) -> bool {
            let (reachable, delay) = {
                let state = self.state.lock().await;
                (state.reachable, state.probe_delay)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            reachable
        }
    }
}
