//! Task records and their sync bookkeeping.
//!
//! A [`Task`] is the user-visible record. Its [`SyncState`] tracks whether
//! the latest local mutation has been confirmed by the remote authority.
//! A [`TaskSnapshot`] is the full record state captured when a mutation is
//! enqueued; it is what travels over the wire and what the conflict resolver
//! compares.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ids::{RecordId, RemoteId};

/// Per-record synchronization state.
///
/// Transitions:
/// - `Pending -> Synced` when the authority confirms the record
/// - `Pending | Error -> Error` when an attempt fails below the retry ceiling
/// - `Error -> Failed` once the retry ceiling is reached (terminal)
/// - any state `-> Pending` on a new local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Locally mutated, not yet confirmed.
    Pending,
    /// Confirmed by the authority.
    Synced,
    /// Last attempt failed; will be retried.
    Error,
    /// Attempts exhausted; needs external intervention.
    Failed,
}

impl SyncState {
    /// All states, in declaration order.
    pub const ALL: [SyncState; 4] = [
        SyncState::Pending,
        SyncState::Synced,
        SyncState::Error,
        SyncState::Failed,
    ];

    /// Storage/wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Error => "error",
            SyncState::Failed => "failed",
        }
    }

    /// State of a record whose item has failed `attempts` times.
    pub fn after_failure(attempts: u32, max_attempts: u32) -> SyncState {
        if attempts >= max_attempts {
            SyncState::Failed
        } else {
            SyncState::Error
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            "error" => Ok(SyncState::Error),
            "failed" => Ok(SyncState::Failed),
            other => Err(CoreError::UnknownSyncState(other.to_owned())),
        }
    }
}

/// The record state carried by a queue item and by conflict responses.
///
/// Snapshots are whole-record: last-write-wins takes the winner's snapshot
/// wholesale, never field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub completed: bool,
    /// Creation time (Unix ms).
    pub created_at: i64,
    /// Last modification time (Unix ms). Drives last-write-wins.
    pub updated_at: i64,
    pub deleted: bool,
}

/// A task record as held by the local record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
    /// Soft-delete flag. Deleted tasks are hidden from normal reads but stay
    /// addressable by id until reconciled.
    pub deleted: bool,
    pub sync_state: SyncState,
    pub remote_id: Option<RemoteId>,
    /// Last successful sync (Unix ms).
    pub last_synced_at: Option<i64>,
}

impl Task {
    /// Create a fresh, never-synced task.
    pub fn new(
        id: RecordId,
        title: impl Into<String>,
        description: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            completed: false,
            created_at: now,
            updated_at: now,
            deleted: false,
            sync_state: SyncState::Pending,
            remote_id: None,
            last_synced_at: None,
        }
    }

    /// Capture the current record state for the queue.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            completed: self.completed,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted: self.deleted,
        }
    }

    /// Overwrite the record's content with a snapshot.
    ///
    /// Sync bookkeeping (state, remote id, last sync) is left untouched.
    pub fn apply_snapshot(&mut self, snapshot: &TaskSnapshot) {
        self.title = snapshot.title.clone();
        self.description = snapshot.description.clone();
        self.completed = snapshot.completed;
        self.created_at = snapshot.created_at;
        self.updated_at = snapshot.updated_at;
        self.deleted = snapshot.deleted;
    }

    /// Apply a local edit and reset the record to `Pending`.
    ///
    /// The modification timestamp never moves backwards.
    pub fn apply_update(&mut self, update: &TaskUpdate, now: i64) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(completed) = update.completed {
            self.completed = completed;
        }
        self.touch(now);
    }

    /// Soft-delete locally and reset the record to `Pending`.
    pub fn mark_deleted(&mut self, now: i64) {
        self.deleted = true;
        self.touch(now);
    }

    /// Whether normal read paths should return this task.
    pub fn is_visible(&self) -> bool {
        !self.deleted
    }

    fn touch(&mut self, now: i64) {
        self.updated_at = now.max(self.updated_at);
        self.sync_state = SyncState::Pending;
    }
}

/// A partial local edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl TaskUpdate {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// True if the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.completed.is_none()
    }
}
