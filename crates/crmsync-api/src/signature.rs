//! Webhook authenticity checks and source envelope parsing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum distance between a signed timestamp and now
pub const MAX_TIMESTAMP_SKEW_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature")]
    Missing,
    #[error("malformed timestamp")]
    MalformedTimestamp,
    #[error("timestamp outside the accepted window")]
    Stale,
    #[error("signature mismatch")]
    Mismatch,
}

/// Signed request as seen by the target webhook route
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    pub body: &'a [u8],
    pub signature: Option<&'a str>,
    pub timestamp: Option<&'a str>,
}

/// Verify a target platform webhook.
///
/// With a timestamp the v3 scheme applies:
/// `base64(HMAC-SHA256(secret, method + uri + body + timestamp))`.
/// Without one the v1 scheme applies: `hex(SHA-256(secret + body))`.
pub fn verify_target_signature(
    secret: &str,
    request: &SignedRequest<'_>,
    now_ms: i64,
) -> Result<(), SignatureError> {
    let signature = request
        .signature
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(SignatureError::Missing)?;

    let expected = match request.timestamp.map(str::trim) {
        Some(timestamp) => {
            let signed_at = timestamp
                .parse::<i64>()
                .map_err(|_| SignatureError::MalformedTimestamp)?;
            if now_ms.abs_diff(signed_at) > MAX_TIMESTAMP_SKEW_MS {
                return Err(SignatureError::Stale);
            }
            sign_v3(secret, request.method, request.uri, request.body, timestamp)
                .ok_or(SignatureError::Mismatch)?
        }
        None => sign_v1(secret, request.body),
    };

    if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

pub fn sign_v3(
    secret: &str,
    method: &str,
    uri: &str,
    body: &[u8],
    timestamp: &str,
) -> Option<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(method.as_bytes());
    mac.update(uri.as_bytes());
    mac.update(body);
    mac.update(timestamp.as_bytes());
    Some(BASE64.encode(mac.finalize().into_bytes()))
}

pub fn sign_v1(secret: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Check the optional shared key on source webhooks.
pub fn verify_source_key(expected: Option<&str>, presented: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => presented
            .map(str::trim)
            .is_some_and(|presented| constant_time_eq(expected.as_bytes(), presented.as_bytes())),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// A source platform webhook with its `data` member decoded
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEnvelope {
    pub event_type: String,
    pub event_id: Option<String>,
    pub data: Map<String, Value>,
}

impl SourceEnvelope {
    /// First non-empty string (or number) among `keys` in `data`.
    pub fn data_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.data.get(*key) {
            Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        })
    }

    /// Contact the event refers to
    pub fn contact_id(&self) -> Option<String> {
        self.data_text(&["entityId", "contactId", "id"])
    }
}

/// Parse a source webhook body.
///
/// Accepted shapes are an object carrying `data`, `eventType` or
/// `instanceId`. `data` may be an object or a JSON string holding one,
/// and may itself wrap the event (`{"eventType", "data": {...}}`).
pub fn parse_source_envelope(body: &[u8]) -> Option<SourceEnvelope> {
    let Value::Object(payload) = serde_json::from_slice::<Value>(body).ok()? else {
        return None;
    };
    if !["data", "eventType", "instanceId"]
        .iter()
        .any(|key| payload.contains_key(*key))
    {
        return None;
    }

    let outer_event_type = text(&payload, "eventType");
    let outer_event_id = text(&payload, "eventId");

    let data = match payload.get("data") {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).ok()?,
        Some(value) => value.clone(),
        None => Value::Object(Map::new()),
    };
    let Value::Object(data) = data else {
        return None;
    };

    let event_type = outer_event_type
        .or_else(|| text(&data, "eventType"))
        .unwrap_or_default();
    let event_id = outer_event_id.or_else(|| text(&data, "eventId"));

    let data = match data.get("data") {
        Some(Value::Object(inner)) if !payload.contains_key("eventType") => inner.clone(),
        _ => data,
    };

    Some(SourceEnvelope {
        event_type,
        event_id,
        data,
    })
}

fn text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const SECRET: &str = "webhook-secret";
    const NOW: i64 = 1_700_000_000_000;

    fn request<'a>(
        body: &'a [u8],
        signature: Option<&'a str>,
        timestamp: Option<&'a str>,
    ) -> SignedRequest<'a> {
        SignedRequest {
            method: "POST",
            uri: "/webhooks/t1/target",
            body,
            signature,
            timestamp,
        }
    }

    #[test]
    fn v3_signature_round_trips() {
        let body = br#"[{"eventId":1}]"#;
        let timestamp = NOW.to_string();
        let signature = sign_v3(SECRET, "POST", "/webhooks/t1/target", body, &timestamp).unwrap();

        let signed = request(body, Some(&signature), Some(&timestamp));
        assert_eq!(verify_target_signature(SECRET, &signed, NOW + 1_000), Ok(()));
        assert_eq!(
            verify_target_signature("other-secret", &signed, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn v3_rejects_stale_and_malformed_timestamps() {
        let body = b"[]";
        let old = (NOW - 300_001).to_string();
        let signature = sign_v3(SECRET, "POST", "/webhooks/t1/target", body, &old).unwrap();
        assert_eq!(
            verify_target_signature(SECRET, &request(body, Some(&signature), Some(&old)), NOW),
            Err(SignatureError::Stale)
        );
        assert_eq!(
            verify_target_signature(SECRET, &request(body, Some("x"), Some("soon")), NOW),
            Err(SignatureError::MalformedTimestamp)
        );
    }

    #[test]
    fn v1_signature_hashes_secret_and_body() {
        let body = b"[]";
        let signature = sign_v1(SECRET, body);
        assert_eq!(signature.len(), 64);
        assert_eq!(
            verify_target_signature(SECRET, &request(body, Some(&signature), None), NOW),
            Ok(())
        );
        assert_eq!(
            verify_target_signature(SECRET, &request(b"[{}]", Some(&signature), None), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn missing_signature_is_rejected() {
        assert_eq!(
            verify_target_signature(SECRET, &request(b"[]", Some("  "), None), NOW),
            Err(SignatureError::Missing)
        );
    }

    #[test]
    fn source_key_is_optional() {
        assert!(verify_source_key(None, None));
        assert!(verify_source_key(Some("k"), Some(" k ")));
        assert!(!verify_source_key(Some("k"), Some("j")));
        assert!(!verify_source_key(Some("k"), None));
    }

    #[test]
    fn envelope_with_object_data() {
        let body = json!({
            "instanceId": "inst-1",
            "eventType": "contact_updated",
            "eventId": "evt-7",
            "data": {"entityId": "c-1"}
        })
        .to_string();

        let envelope = parse_source_envelope(body.as_bytes()).unwrap();
        assert_eq!(envelope.event_type, "contact_updated");
        assert_eq!(envelope.event_id.as_deref(), Some("evt-7"));
        assert_eq!(envelope.contact_id().as_deref(), Some("c-1"));
    }

    #[test]
    fn envelope_with_stringified_nested_data() {
        let inner = json!({"eventType": "contact_created", "data": {"contactId": "c-2"}});
        let body = json!({"data": inner.to_string()}).to_string();

        let envelope = parse_source_envelope(body.as_bytes()).unwrap();
        assert_eq!(envelope.event_type, "contact_created");
        assert_eq!(envelope.event_id, None);
        assert_eq!(envelope.contact_id().as_deref(), Some("c-2"));
    }

    #[test]
    fn envelope_requires_known_members() {
        assert!(parse_source_envelope(br#"{"hello": "world"}"#).is_none());
        assert!(parse_source_envelope(b"[1, 2]").is_none());
        assert!(parse_source_envelope(b"not json").is_none());
        assert!(parse_source_envelope(br#"{"data": "not json"}"#).is_none());
    }
}
