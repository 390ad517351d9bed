//! Field mapping repository implementation

use std::collections::BTreeMap;

use async_trait::async_trait;
use libsql::{params, Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{
    default_field_mappings, FieldMapping, MappingId, MappingUpdate, SyncDirection,
};
use crate::store::MappingStore;
use crate::util::unix_millis_now;

const MAPPING_COLUMNS: &str = "id, tenant_id, source_field, source_label, target_property,
     transform, transform_config, direction, is_active";

/// libSQL implementation of `MappingStore`
#[derive(Clone)]
pub struct LibSqlMappingStore {
    conn: Connection,
}

impl LibSqlMappingStore {
    /// Create a new repository sharing the given connection
    pub fn new(conn: &Connection) -> Self {
        Self { conn: conn.clone() }
    }

    /// Parse a mapping from a database row
    fn parse_mapping(row: &Row) -> Result<FieldMapping> {
        let id: String = row.get(0)?;
        let config: Option<String> = row.get(6)?;
        let transform_config = config
            .map(|raw| serde_json::from_str::<BTreeMap<String, String>>(&raw))
            .transpose()?;

        Ok(FieldMapping {
            id: id
                .parse::<MappingId>()
                .map_err(|_| Error::Database(format!("Stored mapping has invalid ID: {id}")))?,
            tenant_id: row.get(1)?,
            source_field: row.get(2)?,
            source_label: row.get(3)?,
            target_property: row.get(4)?,
            transform: row.get::<String>(5)?.parse()?,
            transform_config,
            direction: row.get::<String>(7)?.parse()?,
            is_active: row.get::<i64>(8)? != 0,
        })
    }

    fn config_value(mapping: &FieldMapping) -> Result<Value> {
        Ok(match &mapping.transform_config {
            Some(table) => Value::Text(serde_json::to_string(table)?),
            None => Value::Null,
        })
    }

    async fn query_mappings(
        &self,
        sql: &str,
        args: impl libsql::params::IntoParams,
    ) -> Result<Vec<FieldMapping>> {
        let mut rows = self.conn.query(sql, args).await?;
        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push(Self::parse_mapping(&row)?);
        }
        Ok(mappings)
    }

    async fn find(&self, tenant_id: &str, id: &MappingId) -> Result<Option<FieldMapping>> {
        let sql = format!(
            "SELECT {MAPPING_COLUMNS} FROM field_mappings WHERE tenant_id = ?1 AND id = ?2"
        );
        let mut mappings = self
            .query_mappings(&sql, params![tenant_id, id.as_str()])
            .await?;
        Ok(mappings.pop())
    }

    async fn count_for_tenant(&self, tenant_id: &str) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM field_mappings WHERE tenant_id = ?1",
                [tenant_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl MappingStore for LibSqlMappingStore {
    async fn active_mappings(
        &self,
        tenant_id: &str,
        direction: SyncDirection,
    ) -> Result<Vec<FieldMapping>> {
        let sql = format!(
            "SELECT {MAPPING_COLUMNS} FROM field_mappings
             WHERE tenant_id = ?1 AND is_active = 1 AND direction IN (?2, 'both')
             ORDER BY created_at, rowid"
        );
        self.query_mappings(&sql, params![tenant_id, direction.as_str()])
            .await
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<FieldMapping>> {
        let sql = format!(
            "SELECT {MAPPING_COLUMNS} FROM field_mappings
             WHERE tenant_id = ?1
             ORDER BY created_at, rowid"
        );
        self.query_mappings(&sql, [tenant_id]).await
    }

    async fn insert(&self, mapping: &FieldMapping) -> Result<()> {
        mapping.validate()?;
        let config = Self::config_value(mapping)?;
        let now = unix_millis_now();

        self.conn
            .execute(
                "INSERT INTO field_mappings (
                    id, tenant_id, source_field, source_label, target_property,
                    transform, transform_config, direction, is_active, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    mapping.id.as_str(),
                    mapping.tenant_id.as_str(),
                    mapping.source_field.as_str(),
                    mapping.source_label.as_str(),
                    mapping.target_property.as_str(),
                    mapping.transform.as_str(),
                    config,
                    mapping.direction.as_str(),
                    i64::from(mapping.is_active),
                    now,
                ],
            )
            .await
            .map_err(Error::from_write)?;
        Ok(())
    }

    async fn update(
        &self,
        tenant_id: &str,
        id: &MappingId,
        update: MappingUpdate,
    ) -> Result<FieldMapping> {
        let mut mapping = self
            .find(tenant_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("mapping {id}")))?;
        mapping.apply(update);
        mapping.validate()?;

        let config = Self::config_value(&mapping)?;
        let changed = self
            .conn
            .execute(
                "UPDATE field_mappings SET
                    source_field = ?3, source_label = ?4, target_property = ?5,
                    transform = ?6, transform_config = ?7, direction = ?8,
                    is_active = ?9, updated_at = ?10
                 WHERE tenant_id = ?1 AND id = ?2",
                params![
                    tenant_id,
                    id.as_str(),
                    mapping.source_field.as_str(),
                    mapping.source_label.as_str(),
                    mapping.target_property.as_str(),
                    mapping.transform.as_str(),
                    config,
                    mapping.direction.as_str(),
                    i64::from(mapping.is_active),
                    unix_millis_now(),
                ],
            )
            .await
            .map_err(Error::from_write)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("mapping {id}")));
        }

        tracing::info!(tenant = %tenant_id, mapping = %id, "Updated field mapping");
        Ok(mapping)
    }

    async fn delete(&self, tenant_id: &str, id: &MappingId) -> Result<()> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM field_mappings WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id.as_str()],
            )
            .await?;
        if removed == 0 {
            return Err(Error::NotFound(format!("mapping {id}")));
        }

        tracing::info!(tenant = %tenant_id, mapping = %id, "Deleted field mapping");
        Ok(())
    }

    async fn seed_defaults(&self, tenant_id: &str) -> Result<usize> {
        if self.count_for_tenant(tenant_id).await? > 0 {
            return Ok(0);
        }

        let defaults = default_field_mappings(tenant_id);
        for mapping in &defaults {
            self.insert(mapping).await?;
        }
        tracing::info!(
            tenant = %tenant_id,
            count = defaults.len(),
            "Seeded default field mappings"
        );
        Ok(defaults.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{MappingDirection, TransformKind};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_load_round_trip() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());

        let mapping = FieldMapping::new("tenant", "info.extendedFields.title", "salutation")
            .with_label("Title")
            .with_transform(TransformKind::EnumMap)
            .with_config([("mr", "Mr."), ("ms", "Ms.")]);
        store.insert(&mapping).await.unwrap();

        let loaded = store
            .active_mappings("tenant", SyncDirection::SourceToTarget)
            .await
            .unwrap();
        assert_eq!(loaded, vec![mapping]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_active_mappings_filter_direction_tenant_and_state() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());

        let both = FieldMapping::new("tenant", "info.name.first", "firstname");
        let forward = FieldMapping::new("tenant", "info.company", "company")
            .with_direction(MappingDirection::SourceToTarget);
        let backward = FieldMapping::new("tenant", "info.jobTitle", "jobtitle")
            .with_direction(MappingDirection::TargetToSource);
        let disabled = FieldMapping::new("tenant", "info.name.last", "lastname").inactive();
        let other_tenant = FieldMapping::new("other", "info.name.first", "firstname");

        for mapping in [&both, &forward, &backward, &disabled, &other_tenant] {
            store.insert(mapping).await.unwrap();
        }

        let outbound: Vec<String> = store
            .active_mappings("tenant", SyncDirection::SourceToTarget)
            .await
            .unwrap()
            .into_iter()
            .map(|mapping| mapping.target_property)
            .collect();
        assert_eq!(outbound, vec!["firstname", "company"]);

        let inbound: Vec<String> = store
            .active_mappings("tenant", SyncDirection::TargetToSource)
            .await
            .unwrap()
            .into_iter()
            .map(|mapping| mapping.target_property)
            .collect();
        assert_eq!(inbound, vec!["firstname", "jobtitle"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_seed_defaults_only_once() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());

        assert_eq!(store.seed_defaults("tenant").await.unwrap(), 6);
        assert_eq!(store.seed_defaults("tenant").await.unwrap(), 0);

        let mappings = store
            .active_mappings("tenant", SyncDirection::TargetToSource)
            .await
            .unwrap();
        assert_eq!(mappings.len(), 6);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_includes_inactive_rules() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());

        let active = FieldMapping::new("tenant", "info.name.first", "firstname");
        let disabled = FieldMapping::new("tenant", "info.name.last", "lastname").inactive();
        store.insert(&active).await.unwrap();
        store.insert(&disabled).await.unwrap();
        store
            .insert(&FieldMapping::new("other", "info.company", "company"))
            .await
            .unwrap();

        assert_eq!(store.list("tenant").await.unwrap(), vec![active, disabled]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_edits_and_deactivates() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());

        let mapping = FieldMapping::new("tenant", "info.company", "company");
        store.insert(&mapping).await.unwrap();

        let updated = store
            .update(
                "tenant",
                &mapping.id,
                MappingUpdate {
                    target_property: Some("company_name".into()),
                    transform: Some(TransformKind::Uppercase),
                    is_active: Some(false),
                    ..MappingUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.target_property, "company_name");
        assert_eq!(updated.transform, TransformKind::Uppercase);
        assert!(!updated.is_active);

        assert_eq!(store.list("tenant").await.unwrap(), vec![updated]);
        assert!(store
            .active_mappings("tenant", SyncDirection::SourceToTarget)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_rejects_invalid_paths() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());

        let mapping = FieldMapping::new("tenant", "info.company", "company");
        store.insert(&mapping).await.unwrap();

        let result = store
            .update(
                "tenant",
                &mapping.id,
                MappingUpdate {
                    source_field: Some("info[".into()),
                    ..MappingUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.list("tenant").await.unwrap(), vec![mapping]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_and_delete_miss_with_not_found() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());

        let mapping = FieldMapping::new("tenant", "info.company", "company");
        store.insert(&mapping).await.unwrap();

        let foreign = store
            .update("other", &mapping.id, MappingUpdate::default())
            .await;
        assert!(matches!(foreign, Err(Error::NotFound(_))));
        assert!(matches!(
            store.delete("tenant", &MappingId::new()).await,
            Err(Error::NotFound(_))
        ));

        store.delete("tenant", &mapping.id).await.unwrap();
        assert!(store.list("tenant").await.unwrap().is_empty());
        assert!(matches!(
            store.delete("tenant", &mapping.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_corrupt_rows_surface_as_database_errors() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());

        db.connection()
            .execute(
                "INSERT INTO field_mappings (
                    id, tenant_id, source_field, source_label, target_property, created_at
                 ) VALUES ('not-a-uuid', 'tenant', 'info.company', 'Company', 'company', 0)",
                (),
            )
            .await
            .unwrap();

        assert!(matches!(store.list("tenant").await, Err(Error::Database(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_tenant_has_no_mappings() {
        let db = setup().await;
        let store = LibSqlMappingStore::new(db.connection());
        assert!(store
            .active_mappings("nobody", SyncDirection::SourceToTarget)
            .await
            .unwrap()
            .is_empty());
    }
}
