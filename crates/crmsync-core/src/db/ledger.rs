//! Idempotency ledger backed by the `processed_events` table

use std::time::Duration;

use async_trait::async_trait;
use libsql::{params, Connection, Value};

use crate::error::Result;
use crate::models::Platform;
use crate::store::Ledger;
use crate::util::{duration_millis, unix_millis_now};

/// libSQL implementation of `Ledger`
#[derive(Clone)]
pub struct LibSqlLedger {
    conn: Connection,
    ttl_ms: i64,
}

impl LibSqlLedger {
    /// Create a ledger whose entries live for `ttl`
    pub fn new(conn: &Connection, ttl: Duration) -> Self {
        Self {
            conn: conn.clone(),
            ttl_ms: duration_millis(ttl),
        }
    }

    /// Record `event_id` from `platform` as processed at `now` unless a live
    /// entry exists. Ids are scoped per platform.
    ///
    /// A single upsert: a fresh id inserts, an expired row is overwritten,
    /// a live row is left untouched and reports zero changes.
    pub async fn record_if_absent_at(
        &self,
        event_id: &str,
        platform: Platform,
        event_type: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let event_type = event_type.map_or(Value::Null, |kind| Value::Text(kind.to_string()));
        let changed = self
            .conn
            .execute(
                "INSERT INTO processed_events
                    (event_id, platform, event_type, processed_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(platform, event_id) DO UPDATE SET
                    event_type = excluded.event_type,
                    processed_at = excluded.processed_at,
                    expires_at = excluded.expires_at
                 WHERE processed_events.expires_at <= excluded.processed_at",
                params![
                    event_id,
                    platform.as_str(),
                    event_type,
                    now,
                    now.saturating_add(self.ttl_ms)
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn contains_at(&self, event_id: &str, platform: Platform, now: i64) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM processed_events
                    WHERE platform = ?1 AND event_id = ?2 AND expires_at > ?3
                 )",
                params![platform.as_str(), event_id, now],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? != 0),
            None => Ok(false),
        }
    }

    pub async fn purge_expired_at(&self, now: i64) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM processed_events WHERE expires_at <= ?1",
                params![now],
            )
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "Purged expired processed events");
        }
        Ok(removed)
    }
}

#[async_trait]
impl Ledger for LibSqlLedger {
    async fn record_if_absent(
        &self,
        event_id: &str,
        platform: Platform,
        event_type: Option<&str>,
    ) -> Result<bool> {
        self.record_if_absent_at(event_id, platform, event_type, unix_millis_now())
            .await
    }

    async fn contains(&self, event_id: &str, platform: Platform) -> Result<bool> {
        self.contains_at(event_id, platform, unix_millis_now()).await
    }

    async fn forget(&self, event_id: &str, platform: Platform) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM processed_events WHERE platform = ?1 AND event_id = ?2",
                params![platform.as_str(), event_id],
            )
            .await?;
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
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(60);

    async fn setup() -> (Database, LibSqlLedger) {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = LibSqlLedger::new(db.connection(), TTL);
        (db, ledger)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_record_wins() {
        let (_db, ledger) = setup().await;

        assert!(ledger
            .record_if_absent_at("evt-1", Platform::Source, Some("contact/updated"), 1_000)
            .await
            .unwrap());
        assert!(!ledger
            .record_if_absent_at("evt-1", Platform::Source, Some("contact/updated"), 2_000)
            .await
            .unwrap());
        assert!(ledger.contains_at("evt-1", Platform::Source, 2_000).await.unwrap());
        assert!(!ledger.contains_at("evt-2", Platform::Source, 2_000).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expired_entries_behave_as_absent() {
        let (_db, ledger) = setup().await;
        let expiry = 1_000 + 60_000;

        ledger
            .record_if_absent_at("evt-1", Platform::Target, None, 1_000)
            .await
            .unwrap();
        assert!(!ledger.contains_at("evt-1", Platform::Target, expiry).await.unwrap());
        assert!(ledger
            .record_if_absent_at("evt-1", Platform::Target, None, expiry)
            .await
            .unwrap());
        assert!(ledger.contains_at("evt-1", Platform::Target, expiry + 1).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_event_ids_are_scoped_per_platform() {
        let (_db, ledger) = setup().await;

        assert!(ledger
            .record_if_absent_at("42", Platform::Source, Some("webhook"), 1_000)
            .await
            .unwrap());
        assert!(ledger
            .record_if_absent_at("42", Platform::Target, Some("webhook"), 1_000)
            .await
            .unwrap());
        assert!(!ledger
            .record_if_absent_at("42", Platform::Target, Some("webhook"), 2_000)
            .await
            .unwrap());

        ledger.forget("42", Platform::Source).await.unwrap();
        assert!(!ledger.contains_at("42", Platform::Source, 2_000).await.unwrap());
        assert!(ledger.contains_at("42", Platform::Target, 2_000).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_forget_allows_reprocessing() {
        let (_db, ledger) = setup().await;

        assert!(ledger
            .record_if_absent("evt-1", Platform::Source, None)
            .await
            .unwrap());
        ledger.forget("evt-1", Platform::Source).await.unwrap();
        assert!(!ledger.contains("evt-1", Platform::Source).await.unwrap());
        assert!(ledger
            .record_if_absent("evt-1", Platform::Source, None)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_purge_removes_only_expired() {
        let (_db, ledger) = setup().await;

        ledger
            .record_if_absent_at("old", Platform::Source, None, 0)
            .await
            .unwrap();
        ledger
            .record_if_absent_at("new", Platform::Source, None, 50_000)
            .await
            .unwrap();

        assert_eq!(ledger.purge_expired_at(60_000).await.unwrap(), 1);
        assert!(ledger.contains_at("new", Platform::Source, 60_000).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_records_admit_exactly_one() {
        let (_db, ledger) = setup().await;
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .record_if_absent_at("evt-race", Platform::Source, None, 5_000)
                    .await
                    .unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
