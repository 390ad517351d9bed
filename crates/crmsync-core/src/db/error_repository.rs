//! Sync error log repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::time::Duration;

use async_trait::async_trait;
use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{NewSyncError, SyncErrorId, SyncErrorRecord};
use crate::store::ErrorRecorder;
use crate::util::{duration_millis, unix_millis_now};

/// libSQL implementation of `ErrorRecorder`
#[derive(Clone)]
pub struct LibSqlErrorRecorder {
    conn: Connection,
    ttl_ms: i64,
}

impl LibSqlErrorRecorder {
    /// Create a recorder whose rows are kept for `ttl`
    pub fn new(conn: &Connection, ttl: Duration) -> Self {
        Self {
            conn: conn.clone(),
            ttl_ms: duration_millis(ttl),
        }
    }

    fn parse_record(row: &Row) -> Result<SyncErrorRecord> {
        let id: String = row.get(0)?;
        let source_data: String = row.get(5)?;
        Ok(SyncErrorRecord {
            id: id
                .parse::<SyncErrorId>()
                .map_err(|_| Error::Database(format!("Stored sync error has invalid ID: {id}")))?,
            tenant_id: row.get(1)?,
            direction: row.get::<String>(2)?.parse()?,
            error_class: row.get::<String>(3)?.parse()?,
            message: row.get(4)?,
            source_data: serde_json::from_str(&source_data)?,
            retry_count: u32::try_from(row.get::<i64>(6)?).unwrap_or(0),
            max_retries: u32::try_from(row.get::<i64>(7)?).unwrap_or(0),
            resolved_at: row.get(8)?,
            created_at: row.get(9)?,
            expires_at: row.get(10)?,
        })
    }

    pub async fn record_at(&self, error: NewSyncError, now: i64) -> Result<SyncErrorRecord> {
        let record = SyncErrorRecord {
            id: SyncErrorId::new(),
            tenant_id: error.tenant_id,
            direction: error.direction,
            error_class: error.error_class,
            message: error.message,
            source_data: error.source_data,
            retry_count: 0,
            max_retries: error.max_retries,
            resolved_at: None,
            created_at: now,
            expires_at: now.saturating_add(self.ttl_ms),
        };

        self.conn
            .execute(
                "INSERT INTO sync_errors (
                    id, tenant_id, direction, error_class, message, source_data,
                    retry_count, max_retries, resolved_at, created_at, expires_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?10)",
                params![
                    record.id.as_str(),
                    record.tenant_id.as_str(),
                    record.direction.as_str(),
                    record.error_class.as_str(),
                    record.message.as_str(),
                    serde_json::to_string(&record.source_data)?,
                    i64::from(record.retry_count),
                    i64::from(record.max_retries),
                    record.created_at,
                    record.expires_at,
                ],
            )
            .await?;

        Ok(record)
    }

    pub async fn recent_at(
        &self,
        tenant_id: &str,
        limit: usize,
        now: i64,
    ) -> Result<Vec<SyncErrorRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, direction, error_class, message, source_data,
                        retry_count, max_retries, resolved_at, created_at, expires_at
                 FROM sync_errors
                 WHERE tenant_id = ?1 AND expires_at > ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
                params![tenant_id, now, limit as i64],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    pub async fn count_unresolved_at(&self, tenant_id: &str, now: i64) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM sync_errors
                 WHERE tenant_id = ?1 AND resolved_at IS NULL AND expires_at > ?2",
                params![tenant_id, now],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(u64::try_from(row.get::<i64>(0)?).unwrap_or(0)),
            None => Ok(0),
        }
    }

    pub async fn purge_expired_at(&self, now: i64) -> Result<u64> {
        let removed = self
            .conn
            .execute("DELETE FROM sync_errors WHERE expires_at <= ?1", params![now])
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "Purged expired sync errors");
        }
        Ok(removed)
    }
}

#[async_trait]
impl ErrorRecorder for LibSqlErrorRecorder {
    async fn record(&self, error: NewSyncError) -> Result<SyncErrorRecord> {
        self.record_at(error, unix_millis_now()).await
    }

    async fn recent(&self, tenant_id: &str, limit: usize) -> Result<Vec<SyncErrorRecord>> {
        self.recent_at(tenant_id, limit, unix_millis_now()).await
    }

    async fn count_unresolved(&self, tenant_id: &str) -> Result<u64> {
        self.count_unresolved_at(tenant_id, unix_millis_now()).await
    }

    async fn resolve(&self, id: &SyncErrorId) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE sync_errors SET resolved_at = COALESCE(resolved_at, ?1) WHERE id = ?2",
                params![unix_millis_now(), id.as_str()],
            )
            .await?;
        if updated == 0 {
            return Err(Error::NotFound(format!("sync error {id}")));
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        self.purge_expired_at(unix_millis_now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ErrorClass, SyncDirection};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    async fn setup() -> (Database, LibSqlErrorRecorder) {
        let db = Database::open_in_memory().await.unwrap();
        let recorder = LibSqlErrorRecorder::new(db.connection(), TTL);
        (db, recorder)
    }

    fn failure(message: &str) -> NewSyncError {
        NewSyncError {
            tenant_id: "tenant".to_string(),
            direction: SyncDirection::SourceToTarget,
            error_class: ErrorClass::from_message(message),
            message: message.to_string(),
            source_data: json!({"email": "alice@example.com"}),
            max_retries: 3,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_and_list() {
        let (_db, recorder) = setup().await;

        let recorded = recorder.record_at(failure("HTTP 503"), 1_000).await.unwrap();
        assert_eq!(recorded.retry_count, 0);
        assert_eq!(recorded.error_class, ErrorClass::Retryable);
        assert_eq!(recorded.expires_at, 61_000);

        let listed = recorder.recent_at("tenant", 10, 2_000).await.unwrap();
        assert_eq!(listed, vec![recorded]);
        assert_eq!(recorder.count_unresolved_at("tenant", 2_000).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_marks_row() {
        let (_db, recorder) = setup().await;
        let recorded = recorder.record(failure("bad property")).await.unwrap();

        recorder.resolve(&recorded.id).await.unwrap();
        assert_eq!(recorder.count_unresolved("tenant").await.unwrap(), 0);
        let listed = recorder.recent("tenant", 10).await.unwrap();
        assert!(listed[0].resolved_at.is_some());

        assert!(matches!(
            recorder.resolve(&SyncErrorId::new()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expired_rows_are_hidden_and_purged() {
        let (_db, recorder) = setup().await;
        recorder.record_at(failure("old"), 0).await.unwrap();
        recorder.record_at(failure("new"), 30_000).await.unwrap();

        let visible = recorder.recent_at("tenant", 10, 60_000).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].message, "new");
        assert_eq!(recorder.count_unresolved_at("tenant", 60_000).await.unwrap(), 1);

        assert_eq!(recorder.purge_expired_at(60_000).await.unwrap(), 1);
    }
}
