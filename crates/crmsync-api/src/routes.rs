use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use crmsync_core::models::{
    ContactCorrelation, ErrorClass, FieldMapping, MappingDirection, MappingId, MappingUpdate,
    Platform, SyncDirection, SyncErrorId, SyncErrorRecord, SyncOrigin, TransformKind,
};
use crmsync_core::sync::{FormSubmission, SyncMetricsSnapshot};
use crmsync_core::util::normalize_text_option;
use crmsync_core::{PropagateRequest, SourceRecord, SyncEngine, SyncOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{RateLimitMetricsSnapshot, TenantRateLimiter};
use crate::signature::{
    parse_source_envelope, verify_source_key, verify_target_signature, SignedRequest,
    SourceEnvelope,
};

const TARGET_SIGNATURE_V3_HEADER: &str = "x-target-signature-v3";
const TARGET_SIGNATURE_HEADER: &str = "x-target-signature";
const TARGET_TIMESTAMP_HEADER: &str = "x-target-request-timestamp";
const SOURCE_KEY_HEADER: &str = "x-source-webhook-key";

const MAX_TRIGGER_CONTACTS: usize = 100;
const STATUS_RECENT_ERRORS: usize = 10;
const STATUS_RECENT_SYNCS: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    engine: Arc<SyncEngine>,
    rate_limiter: Arc<TenantRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, engine: Arc<SyncEngine>) -> Self {
        Self {
            rate_limiter: Arc::new(TenantRateLimiter::from_config(config.as_ref())),
            engine,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/{tenant}/target", post(target_webhook))
        .route("/{tenant}/source/contact", post(source_contact_webhook))
        .route("/{tenant}/source/form", post(source_form_webhook));

    let admin_routes = Router::new()
        .route("/sync/trigger", post(trigger_sync))
        .route("/sync/status", get(sync_status))
        .route("/sync/errors/{id}/resolve", post(resolve_error))
        .route(
            "/tenants/{tenant}/mappings",
            get(list_mappings).post(create_mapping),
        )
        .route(
            "/tenants/{tenant}/mappings/defaults",
            post(seed_default_mappings),
        )
        .route(
            "/tenants/{tenant}/mappings/{id}",
            put(update_mapping).delete(delete_mapping),
        );

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/webhooks", webhook_routes)
        .nest("/v1", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    sync: SyncMetricsSnapshot,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        sync: state.engine.metrics(),
        rate_limit: state.rate_limiter.metrics_snapshot(),
    })
}

#[derive(Debug, Serialize)]
struct Accepted {
    status: &'static str,
}

const ACCEPTED: Accepted = Accepted { status: "accepted" };

/// One entry of a target platform webhook batch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetEvent {
    event_id: Value,
    object_id: Value,
    #[serde(default)]
    subscription_type: String,
}

impl TargetEvent {
    fn is_contact_change(&self) -> bool {
        matches!(
            self.subscription_type.as_str(),
            "contact.creation" | "contact.propertyChange"
        )
    }
}

async fn target_webhook(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Result<Json<Accepted>, AppError> {
    let tenant = tenant_id(&tenant)?;
    let signature = header_text(&headers, TARGET_SIGNATURE_V3_HEADER)
        .or_else(|| header_text(&headers, TARGET_SIGNATURE_HEADER));
    let signed = SignedRequest {
        method: "POST",
        uri: uri.path(),
        body: &body,
        signature,
        timestamp: header_text(&headers, TARGET_TIMESTAMP_HEADER),
    };
    if let Err(error) = verify_target_signature(
        &state.config.target_webhook_secret,
        &signed,
        Utc::now().timestamp_millis(),
    ) {
        tracing::warn!(tenant = %tenant, "Target webhook rejected: {error}");
        return Err(AppError::unauthorized("Invalid signature"));
    }

    let events: Vec<TargetEvent> = serde_json::from_slice(&body)
        .map_err(|_| AppError::bad_request("Expected an array of events"))?;
    tracing::info!(tenant = %tenant, event_count = events.len(), "Target webhook received");

    for event in events.into_iter().filter(TargetEvent::is_contact_change) {
        let (Some(event_id), Some(contact_id)) =
            (json_id(&event.event_id), json_id(&event.object_id))
        else {
            tracing::warn!(tenant = %tenant, "Target event without eventId or objectId");
            continue;
        };

        let state = state.clone();
        let tenant = tenant.clone();
        tokio::spawn(async move {
            let request_event_id = format!("target-{event_id}");
            if let Err(error) = sync_from_platform(
                &state,
                &tenant,
                SyncDirection::TargetToSource,
                &contact_id,
                request_event_id,
                SyncOrigin::Webhook,
            )
            .await
            {
                tracing::error!(
                    tenant = %tenant,
                    event_id = %event_id,
                    contact = %contact_id,
                    "Target contact sync failed: {error}"
                );
            }
        });
    }

    Ok(Json(ACCEPTED))
}

async fn source_contact_webhook(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Accepted>, AppError> {
    let tenant = tenant_id(&tenant)?;
    let envelope = authenticated_source_envelope(&state, &headers, &body)?;
    let contact_id = envelope
        .contact_id()
        .ok_or_else(|| AppError::bad_request("Missing contact id"))?;

    tracing::info!(
        tenant = %tenant,
        event_type = %envelope.event_type,
        contact = %contact_id,
        "Source contact webhook received"
    );

    let event_id = envelope.event_id.clone().unwrap_or_else(|| {
        format!(
            "source-{contact_id}-{}-{}",
            envelope.event_type,
            Utc::now().timestamp_millis()
        )
    });

    tokio::spawn(async move {
        if let Err(error) = sync_from_platform(
            &state,
            &tenant,
            SyncDirection::SourceToTarget,
            &contact_id,
            event_id,
            SyncOrigin::Webhook,
        )
        .await
        {
            tracing::error!(
                tenant = %tenant,
                contact = %contact_id,
                "Source contact sync failed: {error}"
            );
        }
    });

    Ok(Json(ACCEPTED))
}

async fn source_form_webhook(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Accepted>, AppError> {
    let tenant = tenant_id(&tenant)?;
    let envelope = authenticated_source_envelope(&state, &headers, &body)?;
    let submission = form_submission(&envelope);

    tracing::info!(
        tenant = %tenant,
        form = %submission.form_id,
        field_count = submission.fields.len(),
        "Source form webhook received"
    );

    tokio::spawn(async move {
        if let Err(error) = state.engine.capture_form(&tenant, &submission).await {
            tracing::error!(
                tenant = %tenant,
                form = %submission.form_id,
                "Form capture failed: {error}"
            );
        }
    });

    Ok(Json(ACCEPTED))
}

fn authenticated_source_envelope(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<SourceEnvelope, AppError> {
    if !verify_source_key(
        state.config.source_webhook_key.as_deref(),
        header_text(headers, SOURCE_KEY_HEADER),
    ) {
        return Err(AppError::unauthorized("Invalid signature"));
    }
    parse_source_envelope(body).ok_or_else(|| AppError::bad_request("Invalid payload"))
}

/// Result of fetching one contact and running it through the engine
#[derive(Debug)]
enum FetchedSync {
    Echo,
    Missing,
    Ran(SyncOutcome),
}

async fn sync_from_platform(
    state: &AppState,
    tenant: &str,
    direction: SyncDirection,
    contact_id: &str,
    event_id: String,
    origin: SyncOrigin,
) -> Result<FetchedSync, AppError> {
    let origin_platform = direction.origin_platform();
    if origin != SyncOrigin::Manual && state.engine.is_echo(origin_platform, contact_id).await? {
        tracing::debug!(tenant, contact = contact_id, "Skipping fetch for echoed change");
        return Ok(FetchedSync::Echo);
    }

    let contact = state
        .engine
        .platform(origin_platform)
        .get_contact(tenant, contact_id)
        .await
        .map_err(|error| AppError::external(error.to_string()))?;
    let Some(contact) = contact else {
        tracing::info!(
            tenant,
            contact = contact_id,
            platform = origin_platform.as_str(),
            "Contact no longer exists"
        );
        return Ok(FetchedSync::Missing);
    };

    let mut record = SourceRecord::new(contact_id, contact);
    if let Some(email) = contact_email(&record.data, origin_platform) {
        record = record.with_email(email);
    }

    let outcome = state
        .engine
        .propagate(PropagateRequest::new(
            tenant, direction, record, event_id, origin,
        ))
        .await?;
    Ok(FetchedSync::Ran(outcome))
}

fn contact_email(contact: &Value, platform: Platform) -> Option<String> {
    let email = match platform {
        Platform::Source => contact
            .pointer("/primaryInfo/email")
            .or_else(|| contact.pointer("/info/emails/0/email")),
        Platform::Target => contact
            .get("email")
            .or_else(|| contact.pointer("/properties/email")),
    };
    email
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    tenant_id: String,
    #[serde(default)]
    contact_ids: Vec<String>,
    #[serde(default = "default_trigger_direction")]
    direction: SyncDirection,
}

const fn default_trigger_direction() -> SyncDirection {
    SyncDirection::SourceToTarget
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
struct TriggerResponse {
    tenant_id: String,
    direction: String,
    synced: u32,
    skipped: u32,
    failed: u32,
    not_found: u32,
    errors: u32,
}

async fn trigger_sync(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<TriggerResponse>, AppError> {
    let tenant = tenant_id(&request.tenant_id)?;
    if request.contact_ids.is_empty() {
        return Err(AppError::bad_request("contact_ids must not be empty"));
    }
    if request.contact_ids.len() > MAX_TRIGGER_CONTACTS {
        return Err(AppError::bad_request(format!(
            "at most {MAX_TRIGGER_CONTACTS} contact_ids per trigger"
        )));
    }
    state.rate_limiter.check(&tenant).await?;

    tracing::info!(
        tenant = %tenant,
        direction = request.direction.as_str(),
        contacts = request.contact_ids.len(),
        "Manual sync triggered"
    );

    let platform = request.direction.origin_platform().as_str();
    let mut response = TriggerResponse {
        tenant_id: tenant.clone(),
        direction: request.direction.as_str().to_string(),
        ..TriggerResponse::default()
    };

    for contact_id in request.contact_ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
        let event_id = format!(
            "manual-{platform}-{contact_id}-{}",
            Utc::now().timestamp_millis()
        );
        match sync_from_platform(
            &state,
            &tenant,
            request.direction,
            contact_id,
            event_id,
            SyncOrigin::Manual,
        )
        .await
        {
            Ok(FetchedSync::Ran(SyncOutcome::Done { .. })) => response.synced += 1,
            Ok(FetchedSync::Ran(SyncOutcome::Skipped { .. }) | FetchedSync::Echo) => {
                response.skipped += 1;
            }
            Ok(FetchedSync::Ran(SyncOutcome::Failed { .. })) => response.failed += 1,
            Ok(FetchedSync::Missing) => response.not_found += 1,
            Err(error) => {
                tracing::warn!(
                    tenant = %tenant,
                    contact = contact_id,
                    "Manual sync error: {error}"
                );
                response.errors += 1;
            }
        }
    }

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    tenant_id: String,
}

#[derive(Debug, Serialize)]
struct RecentError {
    id: SyncErrorId,
    direction: SyncDirection,
    error_class: ErrorClass,
    message: String,
    retry_count: u32,
    max_retries: u32,
    created_at: i64,
}

impl From<SyncErrorRecord> for RecentError {
    fn from(record: SyncErrorRecord) -> Self {
        Self {
            id: record.id,
            direction: record.direction,
            error_class: record.error_class,
            message: record.message,
            retry_count: record.retry_count,
            max_retries: record.max_retries,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    tenant_id: String,
    total_synced_contacts: u64,
    unresolved_errors: u64,
    recent_errors: Vec<RecentError>,
    recent_syncs: Vec<ContactCorrelation>,
}

async fn sync_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    let tenant = tenant_id(&query.tenant_id)?;
    let stores = state.engine.stores();

    let total_synced_contacts = stores.correlations.count(&tenant).await?;
    let unresolved_errors = stores.errors.count_unresolved(&tenant).await?;
    let recent_errors = stores
        .errors
        .recent(&tenant, STATUS_RECENT_ERRORS)
        .await?
        .into_iter()
        .map(RecentError::from)
        .collect();
    let recent_syncs = stores
        .correlations
        .recent(&tenant, STATUS_RECENT_SYNCS)
        .await?;

    Ok(Json(StatusResponse {
        tenant_id: tenant,
        total_synced_contacts,
        unresolved_errors,
        recent_errors,
        recent_syncs,
    }))
}

#[derive(Debug, Serialize)]
struct Resolved {
    id: String,
    status: &'static str,
}

async fn resolve_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Resolved>, AppError> {
    let id: SyncErrorId = id
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request("error id must be a UUID"))?;
    state.engine.stores().errors.resolve(&id).await?;
    tracing::info!(error_id = %id, "Sync error resolved");
    Ok(Json(Resolved {
        id: id.to_string(),
        status: "resolved",
    }))
}

#[derive(Debug, Serialize)]
struct Seeded {
    tenant_id: String,
    inserted: usize,
}

async fn seed_default_mappings(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Seeded>, AppError> {
    let tenant = tenant_id(&tenant)?;
    let inserted = state.engine.stores().mappings.seed_defaults(&tenant).await?;
    tracing::info!(tenant = %tenant, inserted, "Default field mappings seeded");
    Ok(Json(Seeded {
        tenant_id: tenant,
        inserted,
    }))
}

#[derive(Debug, Serialize)]
struct MappingList {
    tenant_id: String,
    mappings: Vec<FieldMapping>,
}

async fn list_mappings(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<MappingList>, AppError> {
    let tenant = tenant_id(&tenant)?;
    let mappings = state.engine.stores().mappings.list(&tenant).await?;
    Ok(Json(MappingList {
        tenant_id: tenant,
        mappings,
    }))
}

/// Body of a mapping creation request
#[derive(Debug, Deserialize)]
struct CreateMapping {
    source_field: String,
    #[serde(default)]
    source_label: Option<String>,
    target_property: String,
    #[serde(default)]
    transform: Option<TransformKind>,
    #[serde(default)]
    transform_config: Option<BTreeMap<String, String>>,
    #[serde(default)]
    direction: Option<MappingDirection>,
}

impl CreateMapping {
    fn into_mapping(self, tenant_id: &str) -> FieldMapping {
        let mut mapping = FieldMapping::new(
            tenant_id,
            self.source_field.trim(),
            self.target_property.trim(),
        );
        mapping.apply(MappingUpdate {
            source_label: normalize_text_option(self.source_label),
            transform: self.transform,
            transform_config: self.transform_config,
            direction: self.direction,
            ..MappingUpdate::default()
        });
        mapping
    }
}

async fn create_mapping(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(body): Json<CreateMapping>,
) -> Result<(StatusCode, Json<FieldMapping>), AppError> {
    let tenant = tenant_id(&tenant)?;
    let mapping = body.into_mapping(&tenant);
    state.engine.stores().mappings.insert(&mapping).await?;
    tracing::info!(tenant = %tenant, mapping = %mapping.id, "Field mapping created");
    Ok((StatusCode::CREATED, Json(mapping)))
}

async fn update_mapping(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    Json(update): Json<MappingUpdate>,
) -> Result<Json<FieldMapping>, AppError> {
    let tenant = tenant_id(&tenant)?;
    let id = mapping_id(&id)?;
    let mapping = state
        .engine
        .stores()
        .mappings
        .update(&tenant, &id, update)
        .await?;
    Ok(Json(mapping))
}

#[derive(Debug, Serialize)]
struct Deleted {
    id: String,
    status: &'static str,
}

async fn delete_mapping(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
) -> Result<Json<Deleted>, AppError> {
    let tenant = tenant_id(&tenant)?;
    let id = mapping_id(&id)?;
    state.engine.stores().mappings.delete(&tenant, &id).await?;
    Ok(Json(Deleted {
        id: id.to_string(),
        status: "deleted",
    }))
}

fn mapping_id(raw: &str) -> Result<MappingId, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::bad_request("mapping id must be a UUID"))
}

fn tenant_id(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request("tenant id must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Build a form submission from a decoded source envelope.
fn form_submission(envelope: &SourceEnvelope) -> FormSubmission {
    let data = &envelope.data;
    let form_id = envelope
        .data_text(&["formId", "entityId"])
        .unwrap_or_default();
    let submission_id = envelope.data_text(&["submissionId", "entityId"]);
    let page_url = envelope.data_text(&["pageUrl"]);
    let submitter_contact_id = data
        .get("submitter")
        .and_then(|submitter| submitter.get("contactId"))
        .and_then(json_id)
        .or_else(|| envelope.data_text(&["contactId"]));

    let fields = match data
        .get("submissions")
        .or_else(|| data.get("fieldValues"))
    {
        Some(Value::Object(values)) => field_values(values),
        _ => field_values(data),
    };

    FormSubmission {
        form_id,
        submission_id,
        fields,
        page_url,
        submitter_contact_id,
    }
}

fn field_values(values: &Map<String, Value>) -> BTreeMap<String, String> {
    values
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key.clone(), text.clone())),
            Value::Number(number) => Some((key.clone(), number.to_string())),
            Value::Bool(flag) => Some((key.clone(), flag.to_string())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn only_contact_changes_are_processed() {
        let events: Vec<TargetEvent> = serde_json::from_value(json!([
            {"eventId": 1, "objectId": 10, "subscriptionType": "contact.creation"},
            {"eventId": 2, "objectId": 11, "subscriptionType": "contact.deletion"},
            {"eventId": 3, "objectId": 12, "subscriptionType": "contact.propertyChange"},
            {"eventId": 4, "objectId": 13}
        ]))
        .unwrap();

        let processed: Vec<Option<String>> = events
            .iter()
            .filter(|event| event.is_contact_change())
            .map(|event| json_id(&event.object_id))
            .collect();
        assert_eq!(processed, vec![Some("10".to_string()), Some("12".to_string())]);
    }

    #[test]
    fn form_submission_reads_nested_values() {
        let body = json!({
            "instanceId": "inst",
            "eventType": "form_submitted",
            "data": {
                "formId": "contact-us",
                "submissionId": "sub-1",
                "pageUrl": "https://example.com/?utm_source=ads",
                "submitter": {"contactId": "c-7"},
                "submissions": {"Email": "a@example.com", "Seats": 4, "Notes": null}
            }
        })
        .to_string();
        let envelope = parse_source_envelope(body.as_bytes()).unwrap();

        let submission = form_submission(&envelope);
        assert_eq!(submission.form_id, "contact-us");
        assert_eq!(submission.submission_id.as_deref(), Some("sub-1"));
        assert_eq!(submission.submitter_contact_id.as_deref(), Some("c-7"));
        assert_eq!(
            submission.page_url.as_deref(),
            Some("https://example.com/?utm_source=ads")
        );
        assert_eq!(
            submission.fields,
            BTreeMap::from([
                ("Email".to_string(), "a@example.com".to_string()),
                ("Seats".to_string(), "4".to_string()),
            ])
        );
    }

    #[test]
    fn contact_email_reads_platform_shapes() {
        let source = json!({"primaryInfo": {"email": " a@x.io "}});
        assert_eq!(
            contact_email(&source, Platform::Source).as_deref(),
            Some("a@x.io")
        );
        let target = json!({"properties": {"email": "b@x.io"}});
        assert_eq!(
            contact_email(&target, Platform::Target).as_deref(),
            Some("b@x.io")
        );
        assert_eq!(contact_email(&json!({"email": ""}), Platform::Target), None);
    }

    #[test]
    fn created_mappings_default_label_transform_and_direction() {
        let body: CreateMapping = serde_json::from_value(json!({
            "source_field": " info.company ",
            "source_label": " ",
            "target_property": "company"
        }))
        .unwrap();
        let mapping = body.into_mapping("t-1");
        assert_eq!(mapping.tenant_id, "t-1");
        assert_eq!(mapping.source_field, "info.company");
        assert_eq!(mapping.source_label, "info.company");
        assert_eq!(mapping.transform, TransformKind::Identity);
        assert_eq!(mapping.direction, MappingDirection::Both);
        assert!(mapping.is_active);

        let body: CreateMapping = serde_json::from_value(json!({
            "source_field": "info.extendedFields.tier",
            "source_label": "Tier",
            "target_property": "customer_tier",
            "transform": "enum_map",
            "transform_config": {"gold": "GOLD"},
            "direction": "source_to_target"
        }))
        .unwrap();
        let mapping = body.into_mapping("t-1");
        assert_eq!(mapping.source_label, "Tier");
        assert_eq!(mapping.transform, TransformKind::EnumMap);
        assert_eq!(
            mapping.transform_config,
            Some(BTreeMap::from([("gold".to_string(), "GOLD".to_string())]))
        );
        assert_eq!(mapping.direction, MappingDirection::SourceToTarget);
    }

    #[test]
    fn mapping_ids_must_be_uuids() {
        let id = MappingId::new();
        assert_eq!(mapping_id(&format!(" {id} ")).unwrap(), id);
        assert!(matches!(mapping_id("42"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn tenant_ids_are_trimmed_and_required() {
        assert_eq!(tenant_id(" t-1 ").unwrap(), "t-1");
        assert!(matches!(tenant_id("  "), Err(AppError::BadRequest(_))));
    }
}
