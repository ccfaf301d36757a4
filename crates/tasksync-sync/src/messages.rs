//! Batch request and response messages.
//!
//! These are exchanged with the remote authority, one request per batch.
//! The wire encoding is JSON with camelCase field names.

use serde::{Deserialize, Serialize};

use tasksync_core::{AuthorityDecision, OperationKind, QueueItem, RecordId, RemoteId, TaskSnapshot};

use crate::error::TransportError;

/// One queued operation as transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub record_id: RecordId,
    #[serde(rename = "operationKind")]
    pub operation: OperationKind,
    pub payload: TaskSnapshot,
    #[serde(rename = "enqueueTimestamp")]
    pub enqueued_at: i64,
}

impl From<&QueueItem> for BatchItem {
    fn from(item: &QueueItem) -> Self {
        Self {
            record_id: item.record_id.clone(),
            operation: item.operation,
            payload: item.payload.clone(),
            enqueued_at: item.enqueued_at,
        }
    }
}

/// A batch of queued operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub items: Vec<BatchItem>,
    /// Client clock at send time (Unix ms).
    pub client_timestamp: i64,
}

impl BatchRequest {
    /// Build a request from queue items, preserving their order.
    pub fn from_items(items: &[QueueItem], client_timestamp: i64) -> Self {
        Self {
            items: items.iter().map(BatchItem::from).collect(),
            client_timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-item verdict reported by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Conflict,
    Error,
}

/// The authority's outcome for one transmitted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeItem {
    /// Echo of the originating record id.
    pub record_id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    pub status: OutcomeStatus,
    /// The authority's copy of the record, present on conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_data: Option<TaskSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutcomeItem {
    pub fn success(record_id: RecordId, remote_id: Option<RemoteId>) -> Self {
        Self {
            record_id,
            remote_id,
            status: OutcomeStatus::Success,
            reconciled_data: None,
            error: None,
        }
    }

    pub fn conflict(
        record_id: RecordId,
        remote_id: Option<RemoteId>,
        authority: TaskSnapshot,
    ) -> Self {
        Self {
            record_id,
            remote_id,
            status: OutcomeStatus::Conflict,
            reconciled_data: Some(authority),
            error: None,
        }
    }

    pub fn error(record_id: RecordId, message: impl Into<String>) -> Self {
        Self {
            record_id,
            remote_id: None,
            status: OutcomeStatus::Error,
            reconciled_data: None,
            error: Some(message.into()),
        }
    }

    /// Convert to the resolver's view of the outcome.
    ///
    /// A conflict without the authority's record is malformed.
    pub fn decision(&self) -> Result<AuthorityDecision, TransportError> {
        match self.status {
            OutcomeStatus::Success => Ok(AuthorityDecision::Accepted {
                remote_id: self.remote_id.clone(),
            }),
            OutcomeStatus::Conflict => {
                let authority = self.reconciled_data.clone().ok_or_else(|| {
                    TransportError::Malformed(format!(
                        "conflict for {} carries no reconciled data",
                        self.record_id
                    ))
                })?;
                Ok(AuthorityDecision::Conflict {
                    remote_id: self.remote_id.clone(),
                    authority,
                })
            }
            OutcomeStatus::Error => Ok(AuthorityDecision::Rejected {
                message: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "authority reported an error".to_string()),
            }),
        }
    }
}

/// The authority's response to one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub processed_items: Vec<OutcomeItem>,
}

impl BatchResponse {
    /// Match outcomes to the request's items by position.
    ///
    /// The response must carry exactly one outcome per request item, in
    /// request order, each echoing its item's record id. Anything else makes
    /// the whole response malformed.
    pub fn into_decisions(
        self,
        request: &BatchRequest,
    ) -> Result<Vec<AuthorityDecision>, TransportError> {
        if self.processed_items.len() != request.items.len() {
            return Err(TransportError::Malformed(format!(
                "expected {} outcomes, got {}",
                request.items.len(),
                self.processed_items.len()
            )));
        }

        request
            .items
            .iter()
            .zip(&self.processed_items)
            .map(|(sent, outcome)| {
                if sent.record_id != outcome.record_id {
                    return Err(TransportError::Malformed(format!(
                        "outcome for {} where {} was sent",
                        outcome.record_id, sent.record_id
                    )));
                }
                outcome.decision()
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire codec
// ─────────────────────────────────────────────────────────────────────────────

pub fn encode_request(request: &BatchRequest) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(request)
        .map_err(|e| TransportError::SendFailed(format!("encode request: {}", e)))
}

pub fn decode_request(bytes: &[u8]) -> Result<BatchRequest, TransportError> {
    serde_json::from_slice(bytes)
        .map_err(|e| TransportError::Malformed(format!("decode request: {}", e)))
}

pub fn encode_response(response: &BatchResponse) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(response)
        .map_err(|e| TransportError::SendFailed(format!("encode response: {}", e)))
}

pub fn decode_response(bytes: &[u8]) -> Result<BatchResponse, TransportError> {
    serde_json::from_slice(bytes)
        .map_err(|e| TransportError::Malformed(format!("decode response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_core::QueueItemId;

    fn snapshot(id: &str, updated_at: i64) -> TaskSnapshot {
        TaskSnapshot {
            id: RecordId::new(id),
            title: "A".into(),
            description: String::new(),
            completed: false,
            created_at: 10,
            updated_at,
            deleted: false,
        }
    }

    fn request(ids: &[&str]) -> BatchRequest {
        let items: Vec<QueueItem> = ids
            .iter()
            .enumerate()
            .map(|(n, id)| {
                QueueItem::new(
                    QueueItemId::new(format!("q{}", n)),
                    OperationKind::Create,
                    snapshot(id, 10),
                    n as i64,
                )
            })
            .collect();
        BatchRequest::from_items(&items, 99)
    }

    #[test]
    fn test_request_wire_field_names() {
        let json: serde_json::Value =
            serde_json::from_slice(&encode_request(&request(&["r1"])).unwrap()).unwrap();

        assert_eq!(json["clientTimestamp"], 99);
        let item = &json["items"][0];
        assert_eq!(item["recordId"], "r1");
        assert_eq!(item["operationKind"], "create");
        assert_eq!(item["enqueueTimestamp"], 0);
        assert_eq!(item["payload"]["updatedAt"], 10);
        assert_eq!(item["payload"]["completed"], false);
    }

    #[test]
    fn test_decode_response_with_optional_fields_missing() {
        let body = br#"{"processedItems":[
            {"recordId":"r1","status":"success","remoteId":"srv-1"},
            {"recordId":"r2","status":"error","error":"quota exceeded"}
        ]}"#;

        let response = decode_response(body).unwrap();
        let decisions = response.into_decisions(&request(&["r1", "r2"])).unwrap();

        assert_eq!(
            decisions[0],
            AuthorityDecision::Accepted {
                remote_id: Some(RemoteId::new("srv-1"))
            }
        );
        assert_eq!(
            decisions[1],
            AuthorityDecision::Rejected {
                message: "quota exceeded".into()
            }
        );
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        assert!(matches!(
            decode_response(b"<html>502</html>"),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn test_outcome_count_mismatch_is_malformed() {
        let response = BatchResponse {
            processed_items: vec![OutcomeItem::success(RecordId::new("r1"), None)],
        };
        assert!(matches!(
            response.into_decisions(&request(&["r1", "r2"])),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn test_outcome_out_of_order_is_malformed() {
        let response = BatchResponse {
            processed_items: vec![
                OutcomeItem::success(RecordId::new("r2"), None),
                OutcomeItem::success(RecordId::new("r1"), None),
            ],
        };
        assert!(matches!(
            response.into_decisions(&request(&["r1", "r2"])),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn test_conflict_requires_reconciled_data() {
        let mut outcome = OutcomeItem::conflict(RecordId::new("r1"), None, snapshot("r1", 50));
        assert!(matches!(
            outcome.decision(),
            Ok(AuthorityDecision::Conflict { .. })
        ));

        outcome.reconciled_data = None;
        assert!(matches!(outcome.decision(), Err(TransportError::Malformed(_))));
    }

    #[test]
    fn test_error_without_message_gets_default() {
        let mut outcome = OutcomeItem::error(RecordId::new("r1"), "x");
        outcome.error = None;
        match outcome.decision().unwrap() {
            AuthorityDecision::Rejected { message } => assert!(!message.is_empty()),
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
