//! Field path parsing and traversal
//!
//! Mapping rules address fields inside a nested contact record with
//! dot-separated keys and bracketed sequence indices.
//!
//! # Path Syntax
//!
//! - Dot-separated keys: `info.name.first`
//! - Sequence indexing: `info.emails[0].email`
//! - Numeric dot segments are indices too: `items.0.value`
//!
//! # Examples
//!
//! ```
//! use crmsync_core::path::{FieldPath, PathSegment};
//! use serde_json::json;
//!
//! let path = FieldPath::parse("info.emails[1].email").unwrap();
//! assert_eq!(path.segments()[2], PathSegment::Index(1));
//!
//! let record = json!({"info": {"emails": [{"email": "a@x.io"}, {"email": "b@x.io"}]}});
//! assert_eq!(path.get(&record), Some(&json!("b@x.io")));
//! ```

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Largest sequence index a path may address; writes pad up to it.
const MAX_INDEX: usize = 10_000;

/// A segment of a path - either a map key or a sequence index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A key in a map (e.g. `name` in `info.name`)
    Key(String),
    /// An index in a sequence (e.g. `0` in `emails[0]`)
    Index(usize),
}

/// A parsed, validated field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse a dot/bracket path string into segments.
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        if path.is_empty() {
            return Err(invalid(path, "path must not be empty"));
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut after_bracket = false;
        let mut chars = path.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '.' => {
                    if current.is_empty() && !after_bracket {
                        return Err(invalid(path, "empty key segment"));
                    }
                    if chars.peek().is_none() {
                        return Err(invalid(path, "path must not end with '.'"));
                    }
                    if !current.is_empty() {
                        segments.push(key_segment(std::mem::take(&mut current), path)?);
                    }
                    after_bracket = false;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(key_segment(std::mem::take(&mut current), path)?);
                    }
                    let mut digits = String::new();
                    let mut closed = false;
                    for ch in chars.by_ref() {
                        if ch == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(ch);
                    }
                    if !closed {
                        return Err(invalid(path, "unterminated '['"));
                    }
                    let index = digits
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| {
                            invalid(path, "bracket index must be a non-negative integer")
                        })?;
                    segments.push(index_segment(index, path)?);
                    after_bracket = true;
                }
                ']' => return Err(invalid(path, "unexpected ']'")),
                _ => {
                    if after_bracket {
                        return Err(invalid(path, "expected '.' or '[' after ']'"));
                    }
                    current.push(ch);
                }
            }
        }

        if !current.is_empty() {
            segments.push(key_segment(current, path)?);
        }

        Ok(Self { segments })
    }

    /// A single-key path, used for flat target property names.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Key(key.into())],
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Read the value at this path, or `None` when any segment is missing.
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key),
                (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
                (PathSegment::Index(index), Value::Object(map)) => map.get(&index.to_string()),
                _ => None,
            })
    }

    /// Write `new_value` at this path, creating intermediate containers.
    ///
    /// Missing or scalar intermediates become a map, or a sequence when the
    /// next segment is an index. Sequences are padded with nulls.
    pub fn set(&self, value: &mut Value, new_value: Value) {
        set_in(value, &self.segments, new_value);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if position == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn set_in(value: &mut Value, segments: &[PathSegment], new_value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *value = new_value;
        return;
    };

    match first {
        PathSegment::Key(key) => {
            if let Value::Object(map) = value {
                let slot = map.entry(key.clone()).or_insert(Value::Null);
                set_in(slot, rest, new_value);
            } else {
                let mut slot = Value::Null;
                set_in(&mut slot, rest, new_value);
                let mut map = Map::new();
                map.insert(key.clone(), slot);
                *value = Value::Object(map);
            }
        }
        PathSegment::Index(index) => match value {
            Value::Array(items) => {
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                set_in(&mut items[*index], rest, new_value);
            }
            Value::Object(map) => {
                let slot = map.entry(index.to_string()).or_insert(Value::Null);
                set_in(slot, rest, new_value);
            }
            _ => {
                let mut items = vec![Value::Null; index + 1];
                set_in(&mut items[*index], rest, new_value);
                *value = Value::Array(items);
            }
        },
    }
}

fn key_segment(key: String, path: &str) -> Result<PathSegment> {
    if key.chars().all(|ch| ch.is_ascii_digit()) {
        let index = key
            .parse::<usize>()
            .map_err(|_| invalid(path, "index out of range"))?;
        return index_segment(index, path);
    }
    Ok(PathSegment::Key(key))
}

fn index_segment(index: usize, path: &str) -> Result<PathSegment> {
    if index > MAX_INDEX {
        return Err(invalid(path, "index exceeds the supported maximum"));
    }
    Ok(PathSegment::Index(index))
}

fn invalid(path: &str, reason: &str) -> Error {
    Error::InvalidInput(format!("invalid field path '{path}': {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn key(name: &str) -> PathSegment {
        PathSegment::Key(name.to_string())
    }

    #[test]
    fn test_parse_dotted() {
        let path = FieldPath::parse("info.name.first").unwrap();
        assert_eq!(path.segments(), &[key("info"), key("name"), key("first")]);
    }

    #[test]
    fn test_parse_bracket_and_numeric_dot_segments() {
        let bracket = FieldPath::parse("a.b[2].c").unwrap();
        assert_eq!(
            bracket.segments(),
            &[key("a"), key("b"), PathSegment::Index(2), key("c")]
        );

        let dotted = FieldPath::parse("a.b.2.c").unwrap();
        assert_eq!(dotted, bracket);
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        for bad in ["", "  ", ".a", "a.", "a..b", "a[", "a[x]", "a[-1]", "a]", "a[0]b"] {
            assert!(FieldPath::parse(bad).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn test_parse_rejects_huge_index() {
        assert!(FieldPath::parse("items[99999999]").is_err());
    }

    #[test]
    fn test_display_renders_canonical_form() {
        let path = FieldPath::parse("items.0.value").unwrap();
        assert_eq!(path.to_string(), "items[0].value");
    }

    #[test]
    fn test_get_nested_and_indexed() {
        let record = json!({
            "info": {"name": {"first": "Alice"}},
            "emails": [{"email": "a@b.com"}, {"email": "c@d.com"}]
        });
        let first = FieldPath::parse("info.name.first").unwrap();
        let second_email = FieldPath::parse("emails[1].email").unwrap();
        assert_eq!(first.get(&record), Some(&json!("Alice")));
        assert_eq!(second_email.get(&record), Some(&json!("c@d.com")));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let record = json!({"a": 1, "n": null});
        assert_eq!(FieldPath::parse("b.c.d").unwrap().get(&record), None);
        assert_eq!(FieldPath::parse("n.b").unwrap().get(&record), None);
        assert_eq!(FieldPath::parse("a[0]").unwrap().get(&record), None);
    }

    #[test]
    fn test_set_autovivifies_maps() {
        let mut record = json!({});
        FieldPath::parse("info.name.first")
            .unwrap()
            .set(&mut record, json!("Bob"));
        assert_eq!(record, json!({"info": {"name": {"first": "Bob"}}}));
    }

    #[test]
    fn test_set_autovivifies_sequences_for_indices() {
        let mut record = json!({});
        FieldPath::parse("items.1.value")
            .unwrap()
            .set(&mut record, json!("test"));
        assert_eq!(record, json!({"items": [null, {"value": "test"}]}));
    }

    #[test]
    fn test_set_overwrites_existing_and_keeps_siblings() {
        let mut record = json!({"info": {"name": {"first": "Alice", "last": "Smith"}}});
        FieldPath::parse("info.name.first")
            .unwrap()
            .set(&mut record, json!("Bob"));
        assert_eq!(
            record,
            json!({"info": {"name": {"first": "Bob", "last": "Smith"}}})
        );
    }

    #[test]
    fn test_set_replaces_scalar_in_the_way() {
        let mut record = json!({"info": "flat"});
        FieldPath::parse("info.company")
            .unwrap()
            .set(&mut record, json!("Acme"));
        assert_eq!(record, json!({"info": {"company": "Acme"}}));
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let paths = [
            "a",
            "a.b",
            "a[0]",
            "a.b[2].c",
            "a[1][0].d",
            "x.y.z.w",
            "list[3].inner[1]",
            "0.a",
        ];
        for raw in paths {
            let path = FieldPath::parse(raw).unwrap();
            for seed in [json!({}), json!(null), json!({"a": {"b": "scalar"}})] {
                let mut record = seed;
                path.set(&mut record, json!("value"));
                assert_eq!(path.get(&record), Some(&json!("value")), "path {raw}");
            }
        }
    }
}
