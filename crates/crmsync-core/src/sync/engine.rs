//! Propagation engine
//!
//! `SyncEngine::propagate` runs one inbound change through a fixed series
//! of gates (dedup, echo, recency, mapping, change detection) before it
//! writes to the other platform, links the two contacts and marks the
//! write so the destination's own change notification is ignored.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::form::{self, FormOutcome, FormSkipReason, FormSubmission};
use super::locks::KeyedLocks;
use crate::config::SyncSettings;
use crate::db::{
    Database, LibSqlCorrelationStore, LibSqlErrorRecorder, LibSqlLedger, LibSqlMappingStore,
};
use crate::error::{Error, PlatformError, Result};
use crate::mapper::{map_record, MappedPayload};
use crate::models::{
    ContactCorrelation, ErrorClass, NewSyncError, Platform, SyncDirection, SyncOrigin,
};
use crate::store::{ContactPlatform, CorrelationStore, ErrorRecorder, Ledger, MappingStore};
use crate::util::{compact_text, normalize_text_option, unix_millis_now};

/// The contact whose change is being propagated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Contact id on the platform the change came from
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Full contact record as that platform returns it
    pub data: Value,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            email: None,
            data,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// One propagation to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagateRequest {
    pub tenant_id: String,
    pub direction: SyncDirection,
    pub record: SourceRecord,
    /// Identifier used for at-most-once processing
    pub event_id: String,
    pub origin: SyncOrigin,
}

impl PropagateRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        direction: SyncDirection,
        record: SourceRecord,
        event_id: impl Into<String>,
        origin: SyncOrigin,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            direction,
            record,
            event_id: event_id.into(),
            origin,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("tenant_id", &self.tenant_id),
            ("event_id", &self.event_id),
            ("record.id", &self.record.id),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Why a propagation stopped without writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DuplicateEvent,
    EchoSuppressed,
    RecentReverseSync,
    NoActiveMappings,
    NoMappedFields,
    NoChanges,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateEvent => "duplicate_event",
            Self::EchoSuppressed => "echo_suppressed",
            Self::RecentReverseSync => "recent_reverse_sync",
            Self::NoActiveMappings => "no_active_mappings",
            Self::NoMappedFields => "no_mapped_fields",
            Self::NoChanges => "no_changes",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one propagation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Done {
        source_id: String,
        target_id: String,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error_class: ErrorClass,
        error: String,
    },
}

impl SyncOutcome {
    pub const fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub const fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// The persistent collaborators of an engine
#[derive(Clone)]
pub struct SyncStores {
    pub mappings: Arc<dyn MappingStore>,
    pub ledger: Arc<dyn Ledger>,
    pub correlations: Arc<dyn CorrelationStore>,
    pub errors: Arc<dyn ErrorRecorder>,
}

impl SyncStores {
    /// libSQL-backed stores sharing one database connection
    pub fn libsql(db: &Database, settings: &SyncSettings) -> Self {
        let conn = db.connection();
        Self {
            mappings: Arc::new(LibSqlMappingStore::new(conn)),
            ledger: Arc::new(LibSqlLedger::new(conn, settings.event_ttl)),
            correlations: Arc::new(LibSqlCorrelationStore::new(conn)),
            errors: Arc::new(LibSqlErrorRecorder::new(conn, settings.error_ttl)),
        }
    }
}

#[derive(Default)]
struct EngineMetrics {
    done: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncMetricsSnapshot {
    pub done: u64,
    pub skipped: u64,
    pub failed: u64,
    pub aborted: u64,
}

/// Bidirectional contact propagation between a source and a target platform
pub struct SyncEngine {
    stores: SyncStores,
    source: Arc<dyn ContactPlatform>,
    target: Arc<dyn ContactPlatform>,
    settings: SyncSettings,
    locks: KeyedLocks,
    metrics: EngineMetrics,
}

impl SyncEngine {
    pub fn new(
        stores: SyncStores,
        source: Arc<dyn ContactPlatform>,
        target: Arc<dyn ContactPlatform>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            stores,
            source,
            target,
            settings,
            locks: KeyedLocks::new(),
            metrics: EngineMetrics::default(),
        }
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub const fn stores(&self) -> &SyncStores {
        &self.stores
    }

    pub fn platform(&self, platform: Platform) -> &Arc<dyn ContactPlatform> {
        match platform {
            Platform::Source => &self.source,
            Platform::Target => &self.target,
        }
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            done: self.metrics.done.load(Ordering::Relaxed),
            skipped: self.metrics.skipped.load(Ordering::Relaxed),
            failed: self.metrics.failed.load(Ordering::Relaxed),
            aborted: self.metrics.aborted.load(Ordering::Relaxed),
        }
    }

    /// Whether a change on `platform` to `contact_id` is the echo of a recent write.
    pub async fn is_echo(&self, platform: Platform, contact_id: &str) -> Result<bool> {
        self.is_echo_at(platform, contact_id, unix_millis_now())
            .await
    }

    /// Propagate one change notification to the other platform.
    ///
    /// `Err` is reserved for storage failures; platform failures come back
    /// as `SyncOutcome::Failed` after being recorded.
    pub async fn propagate(&self, request: PropagateRequest) -> Result<SyncOutcome> {
        request.validate()?;

        let lock_key = format!(
            "{}:{}:{}",
            request.tenant_id,
            request.direction.origin_platform().as_str(),
            request.record.id
        );
        let _guard = self.locks.lock(&lock_key).await;

        let result = self.run(&request).await;
        self.observe(&request, &result);
        result
    }

    async fn run(&self, request: &PropagateRequest) -> Result<SyncOutcome> {
        let first_delivery = self
            .stores
            .ledger
            .record_if_absent(
                &request.event_id,
                request.direction.origin_platform(),
                Some(request.origin.as_str()),
            )
            .await?;
        if !first_delivery {
            return Ok(SyncOutcome::skipped(SkipReason::DuplicateEvent));
        }

        match self.run_recorded(request).await {
            Err(error) => {
                let forgotten = self
                    .stores
                    .ledger
                    .forget(&request.event_id, request.direction.origin_platform())
                    .await;
                if let Err(forget_error) = forgotten {
                    tracing::warn!(
                        event_id = %request.event_id,
                        "Failed to release event id after engine error: {forget_error}"
                    );
                }
                Err(error)
            }
            outcome => outcome,
        }
    }

    async fn run_recorded(&self, request: &PropagateRequest) -> Result<SyncOutcome> {
        let tenant = request.tenant_id.as_str();
        let direction = request.direction;
        let record = &request.record;
        let now = unix_millis_now();

        if self
            .is_echo_at(direction.origin_platform(), &record.id, now)
            .await?
        {
            return Ok(SyncOutcome::skipped(SkipReason::EchoSuppressed));
        }

        let correlation = match direction {
            SyncDirection::SourceToTarget => {
                self.stores
                    .correlations
                    .find_by_source(tenant, &record.id)
                    .await?
            }
            SyncDirection::TargetToSource => {
                self.stores
                    .correlations
                    .find_by_target(tenant, &record.id)
                    .await?
            }
        };
        if correlation.as_ref().is_some_and(|row| {
            row.is_recent_reverse(direction, now, self.settings.loop_window_ms())
        }) {
            return Ok(SyncOutcome::skipped(SkipReason::RecentReverseSync));
        }

        let mappings = self
            .stores
            .mappings
            .active_mappings(tenant, direction)
            .await?;
        if mappings.is_empty() {
            return Ok(SyncOutcome::skipped(SkipReason::NoActiveMappings));
        }

        let payload = map_record(&record.data, &mappings, direction);
        if payload.is_empty() {
            return Ok(SyncOutcome::skipped(SkipReason::NoMappedFields));
        }

        let destination = self.platform(direction.destination_platform());
        let mut known_id = correlation
            .as_ref()
            .and_then(|row| row.destination_contact_id(direction))
            .map(str::to_string);

        if let Some(contact_id) = known_id.clone() {
            match destination.get_contact(tenant, &contact_id).await {
                Ok(Some(current)) if payload.is_identical_to(&current) => {
                    return Ok(SyncOutcome::skipped(SkipReason::NoChanges));
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::info!(
                        tenant = %tenant,
                        contact = %contact_id,
                        "Correlated contact no longer exists; falling back to lookup"
                    );
                    known_id = None;
                }
                Err(error) => return self.fail_platform(request, &payload, &error).await,
            }
        }

        // Outbound lookups and links use the mapped address
        let mapped_email = payload.top_level("email").map(str::to_string);
        let email = match direction {
            SyncDirection::SourceToTarget => {
                mapped_email.or_else(|| normalize_text_option(record.email.clone()))
            }
            SyncDirection::TargetToSource => {
                normalize_text_option(record.email.clone()).or(mapped_email)
            }
        };

        if known_id.is_none() {
            if let Some(email) = email.as_deref() {
                match destination.find_contact_by_email(tenant, email).await {
                    Ok(found) => known_id = found,
                    Err(error) => return self.fail_platform(request, &payload, &error).await,
                }
            }
        }

        let written_id = match destination
            .upsert_contact(tenant, &payload.to_record(), known_id.as_deref())
            .await
        {
            Ok(contact_id) => contact_id,
            Err(error) => return self.fail_platform(request, &payload, &error).await,
        };

        let (source_id, target_id) = match direction {
            SyncDirection::SourceToTarget => (record.id.clone(), written_id.clone()),
            SyncDirection::TargetToSource => (written_id.clone(), record.id.clone()),
        };

        let synced_at = unix_millis_now();
        let link = ContactCorrelation {
            tenant_id: tenant.to_string(),
            source_contact_id: Some(source_id.clone()),
            target_contact_id: Some(target_id.clone()),
            email,
            last_synced_at: synced_at,
            last_sync_direction: direction,
            last_sync_origin: request.origin,
        };
        if let Err(error) = self.stores.correlations.upsert(&link).await {
            if error.is_conflict() {
                return self
                    .fail(request, ErrorClass::NonRetryable, &error.to_string(), &payload)
                    .await;
            }
            return Err(error);
        }

        self.mark_echo(direction.destination_platform(), &written_id, synced_at)
            .await?;

        Ok(SyncOutcome::Done {
            source_id,
            target_id,
        })
    }

    /// Push a source-side form submission to the target platform.
    pub async fn capture_form(
        &self,
        tenant_id: &str,
        submission: &FormSubmission,
    ) -> Result<FormOutcome> {
        let mappings = self
            .stores
            .mappings
            .active_mappings(tenant_id, SyncDirection::SourceToTarget)
            .await?;
        let properties = form::build_properties(submission, &mappings);

        let Some(email) = properties
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            tracing::warn!(
                tenant = %tenant_id,
                form = %submission.form_id,
                fields = ?submission.fields.keys().collect::<Vec<_>>(),
                "Form submission missing email field"
            );
            return Ok(FormOutcome::Skipped {
                reason: FormSkipReason::MissingEmail,
            });
        };

        let payload = Value::Object(properties);
        let written = match self.target.find_contact_by_email(tenant_id, &email).await {
            Ok(existing) => {
                self.target
                    .upsert_contact(tenant_id, &payload, existing.as_deref())
                    .await
            }
            Err(error) => Err(error),
        };

        let contact_id = match written {
            Ok(contact_id) => contact_id,
            Err(error) => {
                return self
                    .fail_form(tenant_id, submission, &payload, &error.to_string())
                    .await;
            }
        };

        let synced_at = unix_millis_now();
        if let Some(submitter) = normalize_text_option(submission.submitter_contact_id.clone()) {
            let link = ContactCorrelation {
                tenant_id: tenant_id.to_string(),
                source_contact_id: Some(submitter),
                target_contact_id: Some(contact_id.clone()),
                email: Some(email),
                last_synced_at: synced_at,
                last_sync_direction: SyncDirection::SourceToTarget,
                last_sync_origin: SyncOrigin::Form,
            };
            if let Err(error) = self.stores.correlations.upsert(&link).await {
                if error.is_conflict() {
                    return self
                        .fail_form(tenant_id, submission, &payload, &error.to_string())
                        .await;
                }
                return Err(error);
            }
        }
        self.mark_echo(Platform::Target, &contact_id, synced_at)
            .await?;

        tracing::info!(
            tenant = %tenant_id,
            form = %submission.form_id,
            contact = %contact_id,
            "Form submission captured"
        );
        Ok(FormOutcome::Captured { contact_id })
    }

    async fn is_echo_at(&self, platform: Platform, contact_id: &str, now: i64) -> Result<bool> {
        let bucket = self.settings.echo_bucket_at(now);
        for candidate in [bucket, bucket - 1] {
            let key = echo_key(platform, contact_id, candidate);
            if self.stores.ledger.contains(&key, platform).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn mark_echo(&self, platform: Platform, contact_id: &str, now: i64) -> Result<()> {
        let key = echo_key(platform, contact_id, self.settings.echo_bucket_at(now));
        self.stores
            .ledger
            .record_if_absent(&key, platform, Some("echo"))
            .await?;
        Ok(())
    }

    async fn fail_platform(
        &self,
        request: &PropagateRequest,
        payload: &MappedPayload,
        error: &PlatformError,
    ) -> Result<SyncOutcome> {
        self.fail(request, error.class(), &error.to_string(), payload)
            .await
    }

    async fn fail(
        &self,
        request: &PropagateRequest,
        error_class: ErrorClass,
        message: &str,
        payload: &MappedPayload,
    ) -> Result<SyncOutcome> {
        let message = compact_text(message);
        let entry = NewSyncError {
            tenant_id: request.tenant_id.clone(),
            direction: request.direction,
            error_class,
            message: message.clone(),
            source_data: json!({
                "event_id": request.event_id,
                "record_id": request.record.id,
                "origin": request.origin,
                "payload": payload.to_record(),
            }),
            max_retries: self.settings.max_retries,
        };
        if let Err(record_error) = self.stores.errors.record(entry).await {
            tracing::warn!(
                tenant = %request.tenant_id,
                event_id = %request.event_id,
                "Failed to record sync error: {record_error}"
            );
        }

        Ok(SyncOutcome::Failed {
            error_class,
            error: message,
        })
    }

    async fn fail_form(
        &self,
        tenant_id: &str,
        submission: &FormSubmission,
        payload: &Value,
        message: &str,
    ) -> Result<FormOutcome> {
        let message = compact_text(message);
        tracing::warn!(
            tenant = %tenant_id,
            form = %submission.form_id,
            "Failed to capture form submission: {message}"
        );

        let entry = NewSyncError {
            tenant_id: tenant_id.to_string(),
            direction: SyncDirection::SourceToTarget,
            error_class: ErrorClass::NonRetryable,
            message: message.clone(),
            source_data: json!({
                "form": submission,
                "properties": payload,
            }),
            max_retries: 0,
        };
        if let Err(record_error) = self.stores.errors.record(entry).await {
            tracing::warn!(tenant = %tenant_id, "Failed to record sync error: {record_error}");
        }

        Ok(FormOutcome::Failed { error: message })
    }

    fn observe(&self, request: &PropagateRequest, result: &Result<SyncOutcome>) {
        let tenant = request.tenant_id.as_str();
        let direction = request.direction.as_str();
        let event_id = request.event_id.as_str();

        match result {
            Ok(SyncOutcome::Done {
                source_id,
                target_id,
            }) => {
                self.metrics.done.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    tenant,
                    direction,
                    event_id,
                    source_id = %source_id,
                    target_id = %target_id,
                    "Contact propagated"
                );
            }
            Ok(SyncOutcome::Skipped { reason }) => {
                self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    tenant,
                    direction,
                    event_id,
                    reason = reason.as_str(),
                    "Propagation skipped"
                );
            }
            Ok(SyncOutcome::Failed { error_class, error }) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    tenant,
                    direction,
                    event_id,
                    class = error_class.as_str(),
                    "Propagation failed: {error}"
                );
            }
            Err(error) => {
                self.metrics.aborted.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(tenant, direction, event_id, "Propagation aborted: {error}");
            }
        }
    }
}

fn echo_key(platform: Platform, contact_id: &str, bucket: i64) -> String {
    format!("echo:{}:{contact_id}:{bucket}", platform.as_str())
}
