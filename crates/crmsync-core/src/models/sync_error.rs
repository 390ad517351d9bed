//! Sync failure record

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::SyncDirection;
use crate::error::Error;

/// A unique identifier for a sync error row, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncErrorId(Uuid);

impl SyncErrorId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncErrorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncErrorId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Whether an external scheduler should try the propagation again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

impl ErrorClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::NonRetryable => "non_retryable",
        }
    }

    /// Classify a failure message by its transient signatures.
    pub fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        let transient = ["timeout", "timed out", "rate limit", "429", "502", "503", "504"];
        if transient.iter().any(|needle| message.contains(needle)) {
            Self::Retryable
        } else {
            Self::NonRetryable
        }
    }
}

impl FromStr for ErrorClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retryable" => Ok(Self::Retryable),
            "non_retryable" => Ok(Self::NonRetryable),
            other => Err(Error::InvalidInput(format!("unknown error class: {other}"))),
        }
    }
}

/// A failed propagation, kept for inspection and out-of-process retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    pub id: SyncErrorId,
    pub tenant_id: String,
    pub direction: SyncDirection,
    pub error_class: ErrorClass,
    pub message: String,
    /// Payload that failed to propagate
    pub source_data: Value,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Resolution timestamp (Unix ms), set administratively
    pub resolved_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Expiry timestamp (Unix ms)
    pub expires_at: i64,
}

/// Fields supplied by the engine when recording a failure
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncError {
    pub tenant_id: String,
    pub direction: SyncDirection,
    pub error_class: ErrorClass,
    pub message: String,
    pub source_data: Value,
    pub max_retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_messages_are_retryable() {
        assert_eq!(ErrorClass::from_message("request timeout"), ErrorClass::Retryable);
        assert_eq!(ErrorClass::from_message("Rate limit hit"), ErrorClass::Retryable);
        assert_eq!(ErrorClass::from_message("HTTP 503"), ErrorClass::Retryable);
        assert_eq!(ErrorClass::from_message("status 429"), ErrorClass::Retryable);
    }

    #[test]
    fn test_validation_messages_are_not_retryable() {
        assert_eq!(
            ErrorClass::from_message("Property 'foo' does not exist"),
            ErrorClass::NonRetryable
        );
        assert_eq!(ErrorClass::from_message("HTTP 400"), ErrorClass::NonRetryable);
    }
}
