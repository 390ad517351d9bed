//! Field mapper: applies mapping rules to a record for one direction

use serde_json::{Map, Value};

use crate::models::{FieldMapping, SyncDirection};
use crate::path::{FieldPath, PathSegment};
use crate::transform;

/// A destination field and the value the engine intends to write there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub path: FieldPath,
    pub value: String,
}

/// The destination-shaped result of mapping one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedPayload {
    assignments: Vec<Assignment>,
}

impl MappedPayload {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Build the nested record written to the destination platform.
    pub fn to_record(&self) -> Value {
        let mut record = Value::Object(Map::new());
        for assignment in &self.assignments {
            assignment
                .path
                .set(&mut record, Value::String(assignment.value.clone()));
        }
        record
    }

    /// Value assigned to a top-level key, if any (last assignment wins).
    pub fn top_level(&self, key: &str) -> Option<&str> {
        self.assignments
            .iter()
            .rev()
            .find(|assignment| {
                matches!(assignment.path.segments(), [PathSegment::Key(name)] if name == key)
            })
            .map(|assignment| assignment.value.as_str())
    }

    /// Whether `current` already holds every assigned value.
    pub fn is_identical_to(&self, current: &Value) -> bool {
        is_data_identical(&self.assignments, current)
    }
}

/// Map `record` through every active rule that participates in `direction`.
///
/// Source to target reads each rule's source path and writes its flat
/// target property; target to source does the opposite through the
/// reverse transform. Rules with an unparseable source path are skipped.
pub fn map_record(
    record: &Value,
    mappings: &[FieldMapping],
    direction: SyncDirection,
) -> MappedPayload {
    let mut assignments = Vec::new();

    for mapping in mappings {
        if !mapping.is_active || !mapping.direction.applies_to(direction) {
            continue;
        }

        let source_path = match FieldPath::parse(&mapping.source_field) {
            Ok(path) => path,
            Err(error) => {
                tracing::warn!(
                    mapping = %mapping.id,
                    tenant = %mapping.tenant_id,
                    "Skipping mapping with invalid source path: {error}"
                );
                continue;
            }
        };
        let target_path = FieldPath::key(mapping.target_property.clone());
        let config = mapping.transform_config.as_ref();

        let (value, destination) = match direction {
            SyncDirection::SourceToTarget => (
                transform::apply(source_path.get(record), mapping.transform, config),
                target_path,
            ),
            SyncDirection::TargetToSource => (
                transform::reverse(target_path.get(record), mapping.transform, config),
                source_path,
            ),
        };

        if let Some(value) = value {
            assignments.push(Assignment {
                path: destination,
                value,
            });
        }
    }

    MappedPayload { assignments }
}

/// Flat target properties for a source record.
pub fn map_source_to_target(record: &Value, mappings: &[FieldMapping]) -> Map<String, Value> {
    match map_record(record, mappings, SyncDirection::SourceToTarget).to_record() {
        Value::Object(properties) => properties,
        _ => Map::new(),
    }
}

/// Nested source record for a set of target properties.
pub fn map_target_to_source(record: &Value, mappings: &[FieldMapping]) -> Value {
    map_record(record, mappings, SyncDirection::TargetToSource).to_record()
}

/// Compare intended assignments against the destination's current values.
///
/// Empty strings, nulls and absent fields are all treated as "no value".
pub fn is_data_identical(assignments: &[Assignment], current: &Value) -> bool {
    assignments.iter().all(|assignment| {
        let existing = assignment.path.get(current).and_then(|value| match value {
            Value::Null => None,
            Value::String(text) if text.is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        });
        match existing {
            Some(existing) => existing == assignment.value,
            None => assignment.value.is_empty(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MappingDirection, TransformKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mappings() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("t", "info.name.first", "firstname"),
            FieldMapping::new("t", "info.name.last", "lastname"),
            FieldMapping::new("t", "primaryInfo.email", "email")
                .with_transform(TransformKind::Lowercase),
        ]
    }

    #[test]
    fn maps_nested_source_field_to_flat_property() {
        let mapping = vec![FieldMapping::new("t", "info.name.first", "firstname")];
        let record = json!({"info": {"name": {"first": "Alice"}}});
        let properties = map_source_to_target(&record, &mapping);
        assert_eq!(Value::Object(properties), json!({"firstname": "Alice"}));
    }

    #[test]
    fn skips_missing_and_empty_fields() {
        let record = json!({"info": {"name": {"first": "Alice", "last": ""}}});
        let payload = map_record(&record, &mappings(), SyncDirection::SourceToTarget);
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.to_record(), json!({"firstname": "Alice"}));
    }

    #[test]
    fn honours_direction_and_active_flag() {
        let rules = vec![
            FieldMapping::new("t", "info.company", "company")
                .with_direction(MappingDirection::TargetToSource),
            FieldMapping::new("t", "info.jobTitle", "jobtitle").inactive(),
            FieldMapping::new("t", "info.name.first", "firstname")
                .with_direction(MappingDirection::SourceToTarget),
        ];
        let record = json!({
            "info": {"company": "Acme", "jobTitle": "CTO", "name": {"first": "Alice"}}
        });
        let forward = map_record(&record, &rules, SyncDirection::SourceToTarget);
        assert_eq!(forward.to_record(), json!({"firstname": "Alice"}));

        let target = json!({"company": "Acme", "jobtitle": "CTO", "firstname": "Alice"});
        let backward = map_record(&target, &rules, SyncDirection::TargetToSource);
        assert_eq!(backward.to_record(), json!({"info": {"company": "Acme"}}));
    }

    #[test]
    fn maps_target_properties_back_into_nested_record() {
        let target = json!({"firstname": "Bob", "lastname": "Smith", "email": "BOB@X.IO"});
        let record = map_target_to_source(&target, &mappings());
        assert_eq!(
            record,
            json!({
                "info": {"name": {"first": "Bob", "last": "Smith"}},
                "primaryInfo": {"email": "BOB@X.IO"}
            })
        );
    }

    #[test]
    fn top_level_finds_flat_assignment() {
        let record = json!({"primaryInfo": {"email": "Alice@Example.com"}});
        let payload = map_record(&record, &mappings(), SyncDirection::SourceToTarget);
        assert_eq!(payload.top_level("email"), Some("alice@example.com"));
        assert_eq!(payload.top_level("phone"), None);
    }

    #[test]
    fn identical_data_is_detected() {
        let record = json!({"info": {"name": {"first": "Alice"}}});
        let payload = map_record(&record, &mappings(), SyncDirection::SourceToTarget);
        assert!(payload.is_identical_to(&json!({"firstname": "Alice", "other": "x"})));
        assert!(!payload.is_identical_to(&json!({"firstname": "Alicia"})));
        assert!(!payload.is_identical_to(&json!({})));
    }

    #[test]
    fn empty_and_absent_are_equivalent() {
        let assignments = vec![Assignment {
            path: FieldPath::key("phone"),
            value: String::new(),
        }];
        assert!(is_data_identical(&assignments, &json!({})));
        assert!(is_data_identical(&assignments, &json!({"phone": null})));
        assert!(is_data_identical(&assignments, &json!({"phone": ""})));
        assert!(!is_data_identical(&assignments, &json!({"phone": "555"})));
    }

    #[test]
    fn numeric_current_values_compare_as_text() {
        let assignments = vec![Assignment {
            path: FieldPath::key("employees"),
            value: "42".to_string(),
        }];
        assert!(is_data_identical(&assignments, &json!({"employees": 42})));
    }
}
