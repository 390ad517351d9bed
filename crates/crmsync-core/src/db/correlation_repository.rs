//! Contact correlation repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use async_trait::async_trait;
use libsql::{params, Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::ContactCorrelation;
use crate::store::CorrelationStore;

const SELECT_COLUMNS: &str = "SELECT tenant_id, source_contact_id, target_contact_id, email,
        last_synced_at, last_sync_direction, last_sync_origin
    FROM contact_correlations";

/// libSQL implementation of `CorrelationStore`
#[derive(Clone)]
pub struct LibSqlCorrelationStore {
    conn: Connection,
}

impl LibSqlCorrelationStore {
    /// Create a new repository sharing the given connection
    pub fn new(conn: &Connection) -> Self {
        Self { conn: conn.clone() }
    }

    fn parse_correlation(row: &Row) -> Result<ContactCorrelation> {
        Ok(ContactCorrelation {
            tenant_id: row.get(0)?,
            source_contact_id: row.get(1)?,
            target_contact_id: row.get(2)?,
            email: row.get(3)?,
            last_synced_at: row.get(4)?,
            last_sync_direction: row.get::<String>(5)?.parse()?,
            last_sync_origin: row.get::<String>(6)?.parse()?,
        })
    }

    async fn find_one(
        &self,
        column: &str,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<ContactCorrelation>> {
        let sql = format!("{SELECT_COLUMNS} WHERE tenant_id = ?1 AND {column} = ?2");
        let mut rows = self.conn.query(&sql, params![tenant_id, id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_correlation(&row)?)),
            None => Ok(None),
        }
    }
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

#[async_trait]
impl CorrelationStore for LibSqlCorrelationStore {
    async fn find_by_source(
        &self,
        tenant_id: &str,
        source_contact_id: &str,
    ) -> Result<Option<ContactCorrelation>> {
        self.find_one("source_contact_id", tenant_id, source_contact_id)
            .await
    }

    async fn find_by_target(
        &self,
        tenant_id: &str,
        target_contact_id: &str,
    ) -> Result<Option<ContactCorrelation>> {
        self.find_one("target_contact_id", tenant_id, target_contact_id)
            .await
    }

    async fn upsert(&self, correlation: &ContactCorrelation) -> Result<()> {
        let source = correlation.source_contact_id.as_deref();
        let target = correlation.target_contact_id.as_deref();

        let conflict_column = match (source, target) {
            (Some(source), Some(target)) => {
                // Adopt a row that so far only knew the target side
                self.conn
                    .execute(
                        "UPDATE contact_correlations SET source_contact_id = ?1
                         WHERE tenant_id = ?2 AND target_contact_id = ?3
                           AND source_contact_id IS NULL",
                        params![source, correlation.tenant_id.as_str(), target],
                    )
                    .await
                    .map_err(Error::from_write)?;
                "source_contact_id"
            }
            (Some(_), None) => "source_contact_id",
            (None, Some(_)) => "target_contact_id",
            (None, None) => {
                return Err(Error::InvalidInput(
                    "correlation needs a source or target contact id".to_string(),
                ))
            }
        };

        let sql = format!(
            "INSERT INTO contact_correlations (
                tenant_id, source_contact_id, target_contact_id, email,
                last_synced_at, last_sync_direction, last_sync_origin
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_id, {conflict_column}) DO UPDATE SET
                source_contact_id =
                    COALESCE(excluded.source_contact_id, contact_correlations.source_contact_id),
                target_contact_id =
                    COALESCE(excluded.target_contact_id, contact_correlations.target_contact_id),
                email = COALESCE(excluded.email, contact_correlations.email),
                last_synced_at = excluded.last_synced_at,
                last_sync_direction = excluded.last_sync_direction,
                last_sync_origin = excluded.last_sync_origin"
        );

        self.conn
            .execute(
                &sql,
                params![
                    correlation.tenant_id.as_str(),
                    optional_text(source),
                    optional_text(target),
                    optional_text(correlation.email.as_deref()),
                    correlation.last_synced_at,
                    correlation.last_sync_direction.as_str(),
                    correlation.last_sync_origin.as_str(),
                ],
            )
            .await
            .map_err(Error::from_write)?;
        Ok(())
    }

    async fn count(&self, tenant_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM contact_correlations WHERE tenant_id = ?1",
                [tenant_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(u64::try_from(row.get::<i64>(0)?).unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn recent(&self, tenant_id: &str, limit: usize) -> Result<Vec<ContactCorrelation>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE tenant_id = ?1 ORDER BY last_synced_at DESC, id DESC LIMIT ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![tenant_id, limit as i64])
            .await?;

        let mut correlations = Vec::new();
        while let Some(row) = rows.next().await? {
            correlations.push(Self::parse_correlation(&row)?);
        }
        Ok(correlations)
    }
}
