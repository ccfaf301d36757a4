//! Local mutations, applied to the stored record at commit time.
//!
//! A mutation is resolved against whatever the store holds when it commits,
//! not against an earlier read, so a sync outcome written in between is
//! built upon instead of overwritten.

use crate::ids::RecordId;
use crate::queue::OperationKind;
use crate::task::{Task, TaskUpdate};

/// A local create, edit or soft-delete of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMutation {
    Create { title: String, description: String },
    Update(TaskUpdate),
    Delete,
}

impl LocalMutation {
    pub fn create(title: impl Into<String>, description: impl Into<String>) -> Self {
        LocalMutation::Create {
            title: title.into(),
            description: description.into(),
        }
    }

    /// The queue operation this mutation enqueues.
    pub fn operation(&self) -> OperationKind {
        match self {
            LocalMutation::Create { .. } => OperationKind::Create,
            LocalMutation::Update(_) => OperationKind::Update,
            LocalMutation::Delete => OperationKind::Delete,
        }
    }

    /// Apply the mutation to the record's current stored state.
    ///
    /// Returns `None` when it does not apply: a create over an existing
    /// record, or an update or delete of a missing or soft-deleted one.
    /// The returned task is `Pending`; remote id and last sync time carry
    /// over from `current`.
    pub fn apply(&self, id: &RecordId, current: Option<Task>, now: i64) -> Option<Task> {
        match (self, current) {
            (LocalMutation::Create { title, description }, None) => {
                Some(Task::new(id.clone(), title.as_str(), description.as_str(), now))
            }
            (LocalMutation::Update(update), Some(mut task)) if task.is_visible() => {
                task.apply_update(update, now);
                Some(task)
            }
            (LocalMutation::Delete, Some(mut task)) if task.is_visible() => {
                task.mark_deleted(now);
                Some(task)
            }
            _ => None,
        }
    }
}
