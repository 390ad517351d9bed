//! Field mapping model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::MappingDirection;
use crate::error::Error;
use crate::path::FieldPath;

/// A unique identifier for a field mapping, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingId(Uuid);

impl MappingId {
    /// Create a new unique mapping ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MappingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MappingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Value conversion applied when a field crosses platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    #[default]
    Identity,
    Lowercase,
    Uppercase,
    /// Calendar date to Unix millisecond timestamp
    DateFormat,
    /// Substitution through the mapping's config table
    EnumMap,
}

impl TransformKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Lowercase => "lowercase",
            Self::Uppercase => "uppercase",
            Self::DateFormat => "date_format",
            Self::EnumMap => "enum_map",
        }
    }
}

impl FromStr for TransformKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Self::Identity),
            "lowercase" => Ok(Self::Lowercase),
            "uppercase" => Ok(Self::Uppercase),
            "date_format" => Ok(Self::DateFormat),
            "enum_map" => Ok(Self::EnumMap),
            other => Err(Error::InvalidInput(format!("unknown transform: {other}"))),
        }
    }
}

/// A rule linking one source field to one target property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Unique identifier
    pub id: MappingId,
    /// Tenant that owns the rule
    pub tenant_id: String,
    /// Dot/bracket path into the nested source record (e.g. `info.emails[0].email`)
    pub source_field: String,
    /// Human label of the source field, matched against form field names
    pub source_label: String,
    /// Flat property key on the target platform
    pub target_property: String,
    pub transform: TransformKind,
    /// Substitution table for `EnumMap`; ordered so reverse lookups are deterministic
    pub transform_config: Option<BTreeMap<String, String>>,
    pub direction: MappingDirection,
    pub is_active: bool,
}

impl FieldMapping {
    /// Create an active identity mapping that participates in both directions
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        source_field: impl Into<String>,
        target_property: impl Into<String>,
    ) -> Self {
        let source_field = source_field.into();
        Self {
            id: MappingId::new(),
            tenant_id: tenant_id.into(),
            source_label: source_field.clone(),
            source_field,
            target_property: target_property.into(),
            transform: TransformKind::Identity,
            transform_config: None,
            direction: MappingDirection::Both,
            is_active: true,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = label.into();
        self
    }

    #[must_use]
    pub const fn with_transform(mut self, transform: TransformKind) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn with_config<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.transform_config = Some(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    #[must_use]
    pub const fn with_direction(mut self, direction: MappingDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Check that the rule can be applied: a parseable source path and a
    /// non-empty target property.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tenant_id.trim().is_empty() {
            return Err(Error::InvalidInput("tenant_id must not be empty".into()));
        }
        FieldPath::parse(&self.source_field)?;
        if self.target_property.trim().is_empty() {
            return Err(Error::InvalidInput("target_property must not be empty".into()));
        }
        Ok(())
    }

    /// Apply a partial edit; fields left as `None` keep their value.
    pub fn apply(&mut self, update: MappingUpdate) {
        if let Some(source_field) = update.source_field {
            self.source_field = source_field;
        }
        if let Some(source_label) = update.source_label {
            self.source_label = source_label;
        }
        if let Some(target_property) = update.target_property {
            self.target_property = target_property;
        }
        if let Some(transform) = update.transform {
            self.transform = transform;
        }
        if let Some(transform_config) = update.transform_config {
            self.transform_config = Some(transform_config);
        }
        if let Some(direction) = update.direction {
            self.direction = direction;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
    }
}

/// Editable fields of a mapping rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingUpdate {
    #[serde(default)]
    pub source_field: Option<String>,
    #[serde(default)]
    pub source_label: Option<String>,
    #[serde(default)]
    pub target_property: Option<String>,
    #[serde(default)]
    pub transform: Option<TransformKind>,
    #[serde(default)]
    pub transform_config: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub direction: Option<MappingDirection>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// The mapping set a freshly connected tenant starts with.
pub fn default_field_mappings(tenant_id: &str) -> Vec<FieldMapping> {
    [
        ("info.name.first", "First Name", "firstname", TransformKind::Identity),
        ("info.name.last", "Last Name", "lastname", TransformKind::Identity),
        ("primaryInfo.email", "Email", "email", TransformKind::Lowercase),
        ("primaryInfo.phone", "Phone", "phone", TransformKind::Identity),
        ("info.company", "Company", "company", TransformKind::Identity),
        ("info.jobTitle", "Job Title", "jobtitle", TransformKind::Identity),
    ]
    .into_iter()
    .map(|(field, label, property, transform)| {
        FieldMapping::new(tenant_id, field, property)
            .with_label(label)
            .with_transform(transform)
    })
    .collect()
}
