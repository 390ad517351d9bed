//! Value transforms applied when a field crosses platforms
//!
//! Every function here is pure. Missing, null and empty-string inputs map
//! to `None` so a mapping with no value never clobbers a populated field
//! on the other side.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::models::TransformKind;

/// Substitution table attached to an `EnumMap` mapping.
pub type TransformConfig = BTreeMap<String, String>;

/// Convert a source value into its target representation.
pub fn apply(
    value: Option<&Value>,
    kind: TransformKind,
    config: Option<&TransformConfig>,
) -> Option<String> {
    let value = stringify(value)?;

    let transformed = match kind {
        TransformKind::Identity => value,
        TransformKind::Lowercase => value.to_lowercase(),
        TransformKind::Uppercase => value.to_uppercase(),
        TransformKind::DateFormat => parse_date_millis(&value).map_or(value, |ms| ms.to_string()),
        TransformKind::EnumMap => config
            .and_then(|table| table.get(&value).cloned())
            .unwrap_or(value),
    };
    Some(transformed)
}

/// Convert a target value back into its source representation.
///
/// Case transforms are one-way; their reverse passes the value through.
/// An `EnumMap` reverse lookup that matches several keys returns the
/// lexicographically smallest one.
pub fn reverse(
    value: Option<&Value>,
    kind: TransformKind,
    config: Option<&TransformConfig>,
) -> Option<String> {
    let value = stringify(value)?;

    let reversed = match kind {
        TransformKind::Identity | TransformKind::Lowercase | TransformKind::Uppercase => value,
        TransformKind::DateFormat => value
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map_or(value, |date| date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        TransformKind::EnumMap => config
            .and_then(|table| {
                table
                    .iter()
                    .find(|(_, mapped)| **mapped == value)
                    .map(|(key, _)| key.clone())
            })
            .unwrap_or(value),
    };
    Some(reversed)
}

/// Render a scalar as text; `None` for missing, null or empty values.
fn stringify(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

/// Parse an RFC 3339 timestamp, a naive date-time or a bare date (UTC).
fn parse_date_millis(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.timestamp_millis());
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(date.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc().timestamp_millis())
}
