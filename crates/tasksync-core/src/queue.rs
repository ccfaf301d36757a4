//! Queue items: pending operations awaiting transmission.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ids::{QueueItemId, RecordId};
use crate::task::TaskSnapshot;

/// The kind of local mutation a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(CoreError::UnknownOperation(other.to_owned())),
        }
    }
}

/// One pending operation in the mutation queue.
///
/// Several items may exist for the same record; they are transmitted in
/// queue order, `(enqueued_at, seq)` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    /// The record this operation originated from.
    pub record_id: RecordId,
    pub operation: OperationKind,
    /// Record state at enqueue time.
    pub payload: TaskSnapshot,
    /// Enqueue time (Unix ms).
    pub enqueued_at: i64,
    /// Insertion sequence, assigned by the queue. Breaks timestamp ties.
    pub seq: u64,
    /// Failed transmission attempts so far.
    pub attempts: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Build a fresh item with zero attempts. The queue assigns `seq`.
    pub fn new(
        id: QueueItemId,
        operation: OperationKind,
        payload: TaskSnapshot,
        enqueued_at: i64,
    ) -> Self {
        Self {
            id,
            record_id: payload.id.clone(),
            operation,
            payload,
            enqueued_at,
            seq: 0,
            attempts: 0,
            last_error: None,
        }
    }

    /// Whether the item has exhausted its attempts under `max_attempts`.
    pub fn is_dead_lettered(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }

    /// Queue ordering key.
    pub fn order_key(&self) -> (i64, u64) {
        (self.enqueued_at, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RecordId;
    use crate::task::Task;

    #[test]
    fn test_new_item_takes_record_id_from_payload() {
        let task = Task::new(RecordId::new("r1"), "A", "", 10);
        let item =
            QueueItem::new(QueueItemId::new("q1"), OperationKind::Create, task.snapshot(), 10);

        assert_eq!(item.record_id, RecordId::new("r1"));
        assert_eq!(item.attempts, 0);
        assert!(item.last_error.is_none());
    }

    #[test]
    fn test_dead_letter_threshold() {
        let task = Task::new(RecordId::new("r1"), "A", "", 10);
        let mut item =
            QueueItem::new(QueueItemId::new("q1"), OperationKind::Update, task.snapshot(), 10);

        item.attempts = 2;
        assert!(!item.is_dead_lettered(3));
        item.attempts = 3;
        assert!(item.is_dead_lettered(3));
    }

    #[test]
    fn test_operation_kind_names() {
        for kind in [OperationKind::Create, OperationKind::Update, OperationKind::Delete] {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!("upsert".parse::<OperationKind>().is_err());
    }
}
