//! Database migrations

use crate::error::Result;
use libsql::Connection;

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
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'
            )",
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

/// Migration to version 1: mappings, correlations, ledger and error log
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS field_mappings (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            source_field TEXT NOT NULL,
            source_label TEXT NOT NULL,
            target_property TEXT NOT NULL,
            transform TEXT NOT NULL DEFAULT 'identity',
            transform_config TEXT,
            direction TEXT NOT NULL DEFAULT 'both',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_field_mappings_tenant
            ON field_mappings(tenant_id, is_active)",
        // NULL ids never collide, so unlinked rows can coexist
        "CREATE TABLE IF NOT EXISTS contact_correlations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id TEXT NOT NULL,
            source_contact_id TEXT,
            target_contact_id TEXT,
            email TEXT,
            last_synced_at INTEGER NOT NULL,
            last_sync_direction TEXT NOT NULL,
            last_sync_origin TEXT NOT NULL
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_correlations_source
            ON contact_correlations(tenant_id, source_contact_id)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_correlations_target
            ON contact_correlations(tenant_id, target_contact_id)",
        "CREATE INDEX IF NOT EXISTS idx_correlations_synced
            ON contact_correlations(tenant_id, last_synced_at DESC)",
        "CREATE TABLE IF NOT EXISTS processed_events (
            event_id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            event_type TEXT,
            processed_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_processed_events_expires
            ON processed_events(expires_at)",
        "CREATE TABLE IF NOT EXISTS sync_errors (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            direction TEXT NOT NULL,
            error_class TEXT NOT NULL,
            message TEXT NOT NULL,
            source_data TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            resolved_at INTEGER,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_errors_tenant
            ON sync_errors(tenant_id, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_sync_errors_expires ON sync_errors(expires_at)",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

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

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

/// Migration to version 2: per-platform event ids and mapping edit timestamps
async fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS processed_events_v2 (
            platform TEXT NOT NULL,
            event_id TEXT NOT NULL,
            event_type TEXT,
            processed_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            PRIMARY KEY (platform, event_id)
        )",
        "INSERT OR IGNORE INTO processed_events_v2
            (platform, event_id, event_type, processed_at, expires_at)
         SELECT platform, event_id, event_type, processed_at, expires_at
         FROM processed_events",
        "DROP TABLE processed_events",
        "ALTER TABLE processed_events_v2 RENAME TO processed_events",
        "CREATE INDEX IF NOT EXISTS idx_processed_events_expires
            ON processed_events(expires_at)",
        "ALTER TABLE field_mappings ADD COLUMN updated_at INTEGER",
        "UPDATE field_mappings SET updated_at = created_at WHERE updated_at IS NULL",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

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

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
