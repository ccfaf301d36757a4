//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for TaskSync. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.
//!
//! The core data model uses native booleans and typed payloads; the 0/1
//! integer flags and the CBOR payload blob exist only at this boundary.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use tasksync_core::{
    LocalMutation, OperationKind, QueueItem, QueueItemId, RecordId, RemoteId, SyncState, Task,
    TaskSnapshot,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ApplyResult, CommittedMutation, RecordedFailure, Store, SyncedOutcome};

const TASK_COLUMNS: &str = "id, title, description, completed, created_at, updated_at, deleted,
     sync_state, remote_id, last_synced_at";

const QUEUE_COLUMNS: &str =
    "seq, item_id, record_id, operation, payload, enqueued_at, attempts, last_error";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence boundary conversions
// ─────────────────────────────────────────────────────────────────────────────

fn flag_to_sql(flag: bool) -> i64 {
    if flag {
        1
    } else {
        0
    }
}

fn flag_from_sql(value: i64) -> bool {
    value != 0
}

fn encode_payload(snapshot: &TaskSnapshot) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(snapshot, &mut buf)
        .map_err(|e| StoreError::Serialization(format!("encode payload: {}", e)))?;
    Ok(buf)
}

fn conversion_error(col: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, ty, msg.into())
}

// Helper to convert a row to Task
fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let sync_state: String = row.get("sync_state")?;
    let sync_state = sync_state
        .parse::<SyncState>()
        .map_err(|e| conversion_error(7, Type::Text, e.to_string()))?;
    let remote_id: Option<String> = row.get("remote_id")?;

    Ok(Task {
        id: RecordId::new(row.get::<_, String>("id")?),
        title: row.get("title")?,
        description: row.get("description")?,
        completed: flag_from_sql(row.get("completed")?),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted: flag_from_sql(row.get("deleted")?),
        sync_state,
        remote_id: remote_id.map(RemoteId::new),
        last_synced_at: row.get("last_synced_at")?,
    })
}

// Helper to convert a row to QueueItem
fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueItem> {
    let operation: String = row.get("operation")?;
    let operation = operation
        .parse::<OperationKind>()
        .map_err(|e| conversion_error(3, Type::Text, e.to_string()))?;

    let payload: Vec<u8> = row.get("payload")?;
    let payload: TaskSnapshot = ciborium::from_reader(&payload[..])
        .map_err(|e| conversion_error(4, Type::Blob, format!("decode payload: {}", e)))?;

    Ok(QueueItem {
        id: QueueItemId::new(row.get::<_, String>("item_id")?),
        record_id: RecordId::new(row.get::<_, String>("record_id")?),
        operation,
        payload,
        enqueued_at: row.get("enqueued_at")?,
        seq: row.get::<_, i64>("seq")? as u64,
        attempts: row.get::<_, i64>("attempts")? as u32,
        last_error: row.get("last_error")?,
    })
}

fn select_task(conn: &Connection, id: &RecordId) -> Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
        params![id.as_str()],
        row_to_task,
    )
    .optional()
    .map_err(StoreError::from)
}

fn write_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (
            id, title, description, completed, created_at, updated_at, deleted,
            sync_state, remote_id, last_synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            completed = excluded.completed,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            deleted = excluded.deleted,
            sync_state = excluded.sync_state,
            remote_id = excluded.remote_id,
            last_synced_at = excluded.last_synced_at",
        params![
            task.id.as_str(),
            task.title,
            task.description,
            flag_to_sql(task.completed),
            task.created_at,
            task.updated_at,
            flag_to_sql(task.deleted),
            task.sync_state.as_str(),
            task.remote_id.as_ref().map(|r| r.as_str()),
            task.last_synced_at,
        ],
    )?;
    Ok(())
}

fn insert_item(conn: &Connection, mut item: QueueItem) -> Result<QueueItem> {
    let floor: Option<i64> =
        conn.query_row("SELECT MAX(enqueued_at) FROM sync_queue", [], |row| row.get(0))?;
    if let Some(floor) = floor {
        item.enqueued_at = item.enqueued_at.max(floor);
    }

    let payload = encode_payload(&item.payload)?;
    conn.execute(
        "INSERT INTO sync_queue (
            item_id, record_id, operation, payload, enqueued_at, attempts, last_error
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.id.as_str(),
            item.record_id.as_str(),
            item.operation.as_str(),
            payload,
            item.enqueued_at,
            item.attempts as i64,
            item.last_error,
        ],
    )?;
    item.seq = conn.last_insert_rowid() as u64;
    Ok(item)
}

fn has_later_item(conn: &Connection, record_id: &str, seq: i64) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sync_queue WHERE record_id = ?1 AND seq > ?2)",
        params![record_id, seq],
        |row| row.get(0),
    )
    .map_err(StoreError::from)
}

fn query_items(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<QueueItem>> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map(params, row_to_item)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

fn query_tasks(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let tasks = stmt
        .query_map(params, row_to_task)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_task(&self, id: &RecordId) -> Result<Option<Task>> {
        let id = id.clone();
        self.blocking(move |conn| select_task(conn, &id)).await
    }

    async fn list_tasks(&self, exclude_deleted: bool) -> Result<Vec<Task>> {
        self.blocking(move |conn| {
            query_tasks(
                conn,
                &format!(
                    "SELECT {} FROM tasks WHERE (?1 = 0 OR deleted = 0)
                     ORDER BY created_at, id",
                    TASK_COLUMNS
                ),
                params![flag_to_sql(exclude_deleted)],
            )
        })
        .await
    }

    async fn list_by_sync_state(&self, states: &[SyncState]) -> Result<Vec<Task>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<&'static str> = states.iter().map(|s| s.as_str()).collect();

        self.blocking(move |conn| {
            let placeholders = vec!["?"; names.len()].join(", ");
            query_tasks(
                conn,
                &format!(
                    "SELECT {} FROM tasks WHERE sync_state IN ({})
                     ORDER BY created_at, id",
                    TASK_COLUMNS, placeholders
                ),
                params_from_iter(names.iter()),
            )
        })
        .await
    }

    async fn upsert_task(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.blocking(move |conn| write_task(conn, &task)).await
    }

    async fn set_sync_state(&self, id: &RecordId, state: SyncState) -> Result<()> {
        let id = id.clone();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE tasks SET sync_state = ?2 WHERE id = ?1",
                params![id.as_str(), state.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("task {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn purge_task(&self, id: &RecordId) -> Result<bool> {
        let id = id.clone();
        self.blocking(move |conn| {
            let removed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.as_str()])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn last_synced_at(&self) -> Result<Option<i64>> {
        self.blocking(|conn| {
            conn.query_row("SELECT MAX(last_synced_at) FROM tasks", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
        .await
    }

    async fn enqueue(&self, item: QueueItem) -> Result<QueueItem> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let item = insert_item(&tx, item)?;
            tx.commit()?;
            Ok(item)
        })
        .await
    }

    async fn drain(&self) -> Result<Vec<QueueItem>> {
        self.blocking(|conn| {
            query_items(
                conn,
                &format!(
                    "SELECT {} FROM sync_queue ORDER BY enqueued_at, seq",
                    QUEUE_COLUMNS
                ),
                [],
            )
        })
        .await
    }

    async fn remove(&self, item_id: &QueueItemId) -> Result<bool> {
        let item_id = item_id.clone();
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM sync_queue WHERE item_id = ?1",
                params![item_id.as_str()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn increment_attempt(&self, item_id: &QueueItemId, error: &str) -> Result<u32> {
        let item_id = item_id.clone();
        let error = error.to_owned();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE sync_queue SET attempts = attempts + 1, last_error = ?2
                 WHERE item_id = ?1",
                params![item_id.as_str(), error],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("queue item {}", item_id)));
            }
            let attempts: i64 = tx.query_row(
                "SELECT attempts FROM sync_queue WHERE item_id = ?1",
                params![item_id.as_str()],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(attempts as u32)
        })
        .await
    }

    async fn reset_attempts(&self, record_id: &RecordId) -> Result<usize> {
        let record_id = record_id.clone();
        self.blocking(move |conn| {
            let reset = conn.execute(
                "UPDATE sync_queue SET attempts = 0, last_error = NULL WHERE record_id = ?1",
                params![record_id.as_str()],
            )?;
            Ok(reset)
        })
        .await
    }

    async fn items_for(&self, record_id: &RecordId) -> Result<Vec<QueueItem>> {
        let record_id = record_id.clone();
        self.blocking(move |conn| {
            query_items(
                conn,
                &format!(
                    "SELECT {} FROM sync_queue WHERE record_id = ?1
                     ORDER BY enqueued_at, seq",
                    QUEUE_COLUMNS
                ),
                params![record_id.as_str()],
            )
        })
        .await
    }

    async fn queue_len(&self) -> Result<usize> {
        self.blocking(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn commit_mutation(
        &self,
        id: &RecordId,
        mutation: &LocalMutation,
        item_id: QueueItemId,
        now: i64,
    ) -> Result<Option<CommittedMutation>> {
        let id = id.clone();
        let mutation = mutation.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let current = select_task(&tx, &id)?;
            let Some(task) = mutation.apply(&id, current, now) else {
                return Ok(None);
            };

            write_task(&tx, &task)?;
            let item = insert_item(
                &tx,
                QueueItem::new(item_id, mutation.operation(), task.snapshot(), now),
            )?;
            tx.commit()?;
            Ok(Some(CommittedMutation { task, item }))
        })
        .await
    }

    async fn apply_outcome(
        &self,
        item: &QueueItem,
        outcome: &SyncedOutcome,
    ) -> Result<ApplyResult> {
        let record_id = item.record_id.clone();
        let item_id = item.id.clone();
        let seq = item.seq as i64;
        let outcome = outcome.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let mut task = select_task(&tx, &record_id)?
                .ok_or_else(|| StoreError::NotFound(format!("task {}", record_id)))?;

            let superseded = has_later_item(&tx, record_id.as_str(), seq)?;

            let retired = tx.execute(
                "DELETE FROM sync_queue WHERE record_id = ?1 AND seq < ?2",
                params![record_id.as_str(), seq],
            )?;
            tx.execute(
                "DELETE FROM sync_queue WHERE item_id = ?1",
                params![item_id.as_str()],
            )?;

            if task.remote_id.is_none() {
                task.remote_id = outcome.remote_id.clone();
            }

            let result = if superseded {
                ApplyResult::Superseded { retired }
            } else {
                task.apply_snapshot(&outcome.snapshot);
                task.sync_state = SyncState::Synced;
                task.last_synced_at = Some(outcome.synced_at);
                ApplyResult::Applied { retired }
            };

            write_task(&tx, &task)?;
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn record_failure(
        &self,
        item_id: &QueueItemId,
        error: &str,
        max_attempts: u32,
    ) -> Result<RecordedFailure> {
        let item_id = item_id.clone();
        let error = error.to_owned();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let (record_id, seq): (String, i64) = tx
                .query_row(
                    "SELECT record_id, seq FROM sync_queue WHERE item_id = ?1",
                    params![item_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("queue item {}", item_id)))?;

            tx.execute(
                "UPDATE sync_queue SET attempts = attempts + 1, last_error = ?2 WHERE seq = ?1",
                params![seq, error],
            )?;
            let attempts: i64 = tx.query_row(
                "SELECT attempts FROM sync_queue WHERE seq = ?1",
                params![seq],
                |row| row.get(0),
            )?;
            let attempts = attempts as u32;

            let state = if has_later_item(&tx, &record_id, seq)? {
                None
            } else {
                Some(SyncState::after_failure(attempts, max_attempts))
            };

            let record_exists = match state {
                Some(state) => {
                    tx.execute(
                        "UPDATE tasks SET sync_state = ?2 WHERE id = ?1",
                        params![record_id, state.as_str()],
                    )? > 0
                }
                None => select_task(&tx, &RecordId::new(record_id.as_str()))?.is_some(),
            };
            if !record_exists {
                return Err(StoreError::NotFound(format!("task {}", record_id)));
            }

            tx.commit()?;
            Ok(RecordedFailure { attempts, state })
        })
        .await
    }
}
