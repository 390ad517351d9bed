//! Form submission capture
//!
//! Turns a source-side form submission into target contact properties.
//! Field names are resolved against the tenant's mapping labels first,
//! then against a fixed table of common form labels. UTM parameters on the
//! page URL are carried along as properties of their own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::models::{FieldMapping, MappingDirection};
use crate::transform;

/// Query parameters copied from the submitting page's URL
pub const UTM_PARAMS: [&str; 5] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
];

const FIELD_HEURISTICS: &[(&str, &str)] = &[
    ("first name", "firstname"),
    ("first_name", "firstname"),
    ("firstname", "firstname"),
    ("last name", "lastname"),
    ("last_name", "lastname"),
    ("lastname", "lastname"),
    ("email", "email"),
    ("email address", "email"),
    ("phone", "phone"),
    ("phone number", "phone"),
    ("telephone", "phone"),
    ("company", "company"),
    ("company name", "company"),
    ("organization", "company"),
    ("job title", "jobtitle"),
    ("jobtitle", "jobtitle"),
    ("position", "jobtitle"),
    ("address", "address"),
    ("street", "address"),
    ("city", "city"),
    ("state", "state"),
    ("zip", "zip"),
    ("zip code", "zip"),
    ("postal code", "zip"),
    ("country", "country"),
    ("website", "website"),
    ("url", "website"),
    ("message", "message"),
];

/// A submitted form on the source platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub form_id: String,
    #[serde(default)]
    pub submission_id: Option<String>,
    /// Field label to submitted value
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub page_url: Option<String>,
    /// Source contact id of the submitter, when the platform knows it
    #[serde(default)]
    pub submitter_contact_id: Option<String>,
}

/// Why a submission was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormSkipReason {
    MissingEmail,
}

/// Result of capturing one form submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FormOutcome {
    Captured { contact_id: String },
    Skipped { reason: FormSkipReason },
    Failed { error: String },
}

/// Target property for a common form label, if one is known.
pub fn heuristic_property(field_name: &str) -> Option<&'static str> {
    let normalized = field_name.trim().to_lowercase();
    FIELD_HEURISTICS
        .iter()
        .find(|(label, _)| *label == normalized)
        .map(|(_, property)| *property)
}

/// UTM query parameters present on `page_url`; empty for unparseable URLs.
pub fn extract_utm_params(page_url: Option<&str>) -> BTreeMap<String, String> {
    let Some(url) = page_url.and_then(|raw| Url::parse(raw.trim()).ok()) else {
        return BTreeMap::new();
    };

    url.query_pairs()
        .filter(|(key, value)| UTM_PARAMS.contains(&key.as_ref()) && !value.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Build target properties for a submission.
///
/// `mappings` should be the tenant's active source-to-target rules. A rule
/// whose label matches a field name (case-insensitively) wins over the
/// heuristic table, and its transform is applied. Unmatched fields are
/// dropped.
pub fn build_properties(
    submission: &FormSubmission,
    mappings: &[FieldMapping],
) -> Map<String, Value> {
    let by_label: BTreeMap<String, &FieldMapping> = mappings
        .iter()
        .filter(|mapping| {
            mapping.is_active && mapping.direction != MappingDirection::TargetToSource
        })
        .map(|mapping| (mapping.source_label.trim().to_lowercase(), mapping))
        .collect();

    let mut properties = Map::new();
    for (field_name, raw_value) in &submission.fields {
        let value = raw_value.trim();
        if value.is_empty() {
            continue;
        }

        if let Some(mapping) = by_label.get(&field_name.trim().to_lowercase()) {
            let input = Value::String(value.to_string());
            if let Some(mapped) = transform::apply(
                Some(&input),
                mapping.transform,
                mapping.transform_config.as_ref(),
            ) {
                properties.insert(mapping.target_property.clone(), Value::String(mapped));
            }
            continue;
        }

        if let Some(property) = heuristic_property(field_name) {
            properties.insert(property.to_string(), Value::String(value.to_string()));
            continue;
        }

        tracing::debug!(form = %submission.form_id, field = %field_name, "Unmapped form field");
    }

    for (key, value) in extract_utm_params(submission.page_url.as_deref()) {
        properties.insert(key, Value::String(value));
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransformKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn submission(fields: &[(&str, &str)], page_url: Option<&str>) -> FormSubmission {
        FormSubmission {
            form_id: "contact-us".to_string(),
            fields: fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            page_url: page_url.map(str::to_string),
            ..FormSubmission::default()
        }
    }

    #[test]
    fn heuristics_ignore_case_and_padding() {
        assert_eq!(heuristic_property("  Email Address "), Some("email"));
        assert_eq!(heuristic_property("Postal Code"), Some("zip"));
        assert_eq!(heuristic_property("favourite colour"), None);
    }

    #[test]
    fn utm_params_are_extracted() {
        let params = extract_utm_params(Some(
            "https://shop.example.com/landing?utm_source=google&utm_medium=cpc&ref=abc&utm_term=",
        ));
        let expected: BTreeMap<String, String> = [("utm_medium", "cpc"), ("utm_source", "google")]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        assert_eq!(params, expected);
        assert!(extract_utm_params(Some("not a url")).is_empty());
        assert!(extract_utm_params(None).is_empty());
    }

    #[test]
    fn mapping_labels_win_over_heuristics() {
        let mappings = vec![
            FieldMapping::new("t", "primaryInfo.email", "work_email")
                .with_label("Email")
                .with_transform(TransformKind::Lowercase),
        ];
        let form = submission(&[("email", "Ann@Example.COM"), ("Phone Number", "555")], None);
        let properties = build_properties(&form, &mappings);
        assert_eq!(
            Value::Object(properties),
            json!({"work_email": "ann@example.com", "phone": "555"})
        );
    }

    #[test]
    fn empty_and_unknown_fields_are_dropped() {
        let form = submission(
            &[("First Name", "Ann"), ("Last Name", "  "), ("Shoe size", "42")],
            Some("https://example.com/?utm_campaign=spring"),
        );
        let properties = build_properties(&form, &[]);
        assert_eq!(
            Value::Object(properties),
            json!({"firstname": "Ann", "utm_campaign": "spring"})
        );
    }

    #[test]
    fn target_only_mappings_are_not_used_for_forms() {
        let mappings = vec![FieldMapping::new("t", "info.company", "account")
            .with_label("Company")
            .with_direction(MappingDirection::TargetToSource)];
        let form = submission(&[("Company", "Acme")], None);
        let properties = build_properties(&form, &mappings);
        assert_eq!(Value::Object(properties), json!({"company": "Acme"}));
    }
}
