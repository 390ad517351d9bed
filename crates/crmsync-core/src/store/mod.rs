//! Collaborator interfaces the sync engine is built against.
//!
//! The engine holds each of these as `Arc<dyn Trait>` so the api binary can
//! inject libSQL-backed stores and HTTP platform clients, and tests can
//! substitute in-process fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PlatformError, Result};
use crate::models::{
    ContactCorrelation, FieldMapping, MappingId, MappingUpdate, NewSyncError, Platform,
    SyncDirection, SyncErrorId, SyncErrorRecord,
};

/// Per-tenant field mapping rules
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Active rules for `tenant_id` that participate in `direction`
    async fn active_mappings(
        &self,
        tenant_id: &str,
        direction: SyncDirection,
    ) -> Result<Vec<FieldMapping>>;

    /// Every rule of a tenant, active or not, oldest first
    async fn list(&self, tenant_id: &str) -> Result<Vec<FieldMapping>>;

    async fn insert(&self, mapping: &FieldMapping) -> Result<()>;

    /// Apply a partial edit to one rule and return the stored result.
    /// Fails with `Error::NotFound` when the tenant has no such rule.
    async fn update(
        &self,
        tenant_id: &str,
        id: &MappingId,
        update: MappingUpdate,
    ) -> Result<FieldMapping>;

    /// Fails with `Error::NotFound` when the tenant has no such rule.
    async fn delete(&self, tenant_id: &str, id: &MappingId) -> Result<()>;

    /// Install the default mapping set when the tenant has none; returns rows added.
    async fn seed_defaults(&self, tenant_id: &str) -> Result<usize>;
}

/// Idempotency ledger of processed event ids, unique per platform
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Record `event_id` from `platform` unless a live entry exists.
    /// Returns `true` when newly recorded.
    async fn record_if_absent(
        &self,
        event_id: &str,
        platform: Platform,
        event_type: Option<&str>,
    ) -> Result<bool>;

    async fn contains(&self, event_id: &str, platform: Platform) -> Result<bool>;

    async fn forget(&self, event_id: &str, platform: Platform) -> Result<()>;

    /// Delete expired entries; returns the number removed.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Durable links between contacts on the two platforms
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    async fn find_by_source(
        &self,
        tenant_id: &str,
        source_contact_id: &str,
    ) -> Result<Option<ContactCorrelation>>;

    async fn find_by_target(
        &self,
        tenant_id: &str,
        target_contact_id: &str,
    ) -> Result<Option<ContactCorrelation>>;

    /// Insert or update a link. A second row claiming an already-linked
    /// contact id fails with `Error::Conflict`.
    async fn upsert(&self, correlation: &ContactCorrelation) -> Result<()>;

    async fn count(&self, tenant_id: &str) -> Result<u64>;

    /// Most recently synced links, newest first
    async fn recent(&self, tenant_id: &str, limit: usize) -> Result<Vec<ContactCorrelation>>;
}

/// Persistent log of failed propagations
#[async_trait]
pub trait ErrorRecorder: Send + Sync {
    async fn record(&self, error: NewSyncError) -> Result<SyncErrorRecord>;

    /// Unexpired errors for a tenant, newest first
    async fn recent(&self, tenant_id: &str, limit: usize) -> Result<Vec<SyncErrorRecord>>;

    async fn count_unresolved(&self, tenant_id: &str) -> Result<u64>;

    /// Mark an error resolved. Fails with `Error::NotFound` for unknown ids.
    async fn resolve(&self, id: &SyncErrorId) -> Result<()>;

    async fn purge_expired(&self) -> Result<u64>;
}

/// Contact API of one CRM platform
#[async_trait]
pub trait ContactPlatform: Send + Sync {
    /// Create a contact, or update `known_id` when given. Returns the contact id.
    async fn upsert_contact(
        &self,
        tenant_id: &str,
        payload: &Value,
        known_id: Option<&str>,
    ) -> std::result::Result<String, PlatformError>;

    /// Fetch a contact record; `Ok(None)` when it does not exist.
    async fn get_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> std::result::Result<Option<Value>, PlatformError>;

    async fn find_contact_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> std::result::Result<Option<String>, PlatformError>;
}
