//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Task records
        CREATE TABLE tasks (
            id TEXT PRIMARY KEY,                   -- client-generated record id
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            completed INTEGER NOT NULL DEFAULT 0,  -- 0/1
            created_at INTEGER NOT NULL,           -- Unix ms
            updated_at INTEGER NOT NULL,           -- Unix ms, drives last-write-wins
            deleted INTEGER NOT NULL DEFAULT 0,    -- 0/1 soft-delete flag
            sync_state TEXT NOT NULL DEFAULT 'pending',
            remote_id TEXT,                        -- assigned by the authority
            last_synced_at INTEGER                 -- Unix ms
        );

        -- Pending mutations awaiting transmission
        CREATE TABLE sync_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT, -- insertion sequence
            item_id TEXT NOT NULL UNIQUE,
            record_id TEXT NOT NULL,
            operation TEXT NOT NULL,               -- create | update | delete
            payload BLOB NOT NULL,                 -- CBOR TaskSnapshot
            enqueued_at INTEGER NOT NULL,          -- Unix ms, non-decreasing
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        );

        CREATE INDEX idx_tasks_sync_state ON tasks(sync_state);
        CREATE INDEX idx_tasks_created ON tasks(created_at, id);
        CREATE INDEX idx_queue_order ON sync_queue(enqueued_at, seq);
        CREATE INDEX idx_queue_record ON sync_queue(record_id, seq);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
