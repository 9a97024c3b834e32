//! Database migrations

use libsql::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run a batch of statements inside one transaction, recording the version.
///
/// libsql has no execute_batch, so each statement runs separately.
async fn apply(conn: &Connection, statements: &[&str], version: i32) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: Initial notes schema
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Notes table; timestamps are fixed-width RFC 3339 text so that
        // ordering by last_edited_at is chronological
        "CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_edited_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_notes_last_edited ON notes(last_edited_at DESC)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    apply(conn, &statements, 1).await
}

/// Migration to version 2: Offline sync bookkeeping
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        // One row per note whose local state is not confirmed remote
        "CREATE TABLE IF NOT EXISTS pending_sync (
            note_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('create', 'update')),
            last_attempt_at TEXT
        )",
        // Deletes still to be propagated to the remote service
        "CREATE TABLE IF NOT EXISTS deleted_notes (
            note_id TEXT PRIMARY KEY,
            deleted_at TEXT NOT NULL
        )",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    apply(conn, &statements, 2).await
}
