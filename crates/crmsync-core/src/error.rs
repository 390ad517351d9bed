//! Error types for crmsync-core

use thiserror::Error;

use crate::models::ErrorClass;

/// Result type alias using crmsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in crmsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Unique constraint violation (e.g. a second correlation row for the same contact)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Map a libSQL error, surfacing unique constraint violations as `Conflict`.
    pub(crate) fn from_write(error: libsql::Error) -> Self {
        let message = error.to_string();
        if message.contains("UNIQUE constraint failed") {
            Self::Conflict(message)
        } else {
            Self::LibSql(error)
        }
    }

    /// Whether this error is a uniqueness conflict rather than a storage failure.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Failure reported by a CRM platform collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The platform asked us to slow down
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The platform answered with something we cannot use
    #[error("Invalid response: {0}")]
    Invalid(String),
}

impl PlatformError {
    /// Classify for the error log; transient failures are retryable.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout(_) | Self::RateLimited(_) => ErrorClass::Retryable,
            Self::Http { status, .. } if matches!(status, 429 | 502 | 503 | 504) => {
                ErrorClass::Retryable
            }
            Self::Http { message, .. } | Self::Transport(message) => {
                ErrorClass::from_message(message)
            }
            Self::Invalid(_) => ErrorClass::NonRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_errors_classify_by_kind_and_status() {
        assert_eq!(
            PlatformError::Timeout("30s".into()).class(),
            ErrorClass::Retryable
        );
        assert_eq!(
            PlatformError::RateLimited("slow down".into()).class(),
            ErrorClass::Retryable
        );
        for status in [429, 502, 503, 504] {
            let error = PlatformError::Http {
                status,
                message: "upstream".into(),
            };
            assert_eq!(error.class(), ErrorClass::Retryable, "status {status}");
        }
        let invalid_property = PlatformError::Http {
            status: 400,
            message: "Property 'foo' does not exist".into(),
        };
        assert_eq!(invalid_property.class(), ErrorClass::NonRetryable);
        assert_eq!(
            PlatformError::Invalid("not json".into()).class(),
            ErrorClass::NonRetryable
        );
    }

    #[test]
    fn platform_errors_fall_back_to_message_scan() {
        assert_eq!(
            PlatformError::Transport("connection timed out".into()).class(),
            ErrorClass::Retryable
        );
        assert_eq!(
            PlatformError::Http {
                status: 500,
                message: "gateway returned 503 upstream".into()
            }
            .class(),
            ErrorClass::Retryable
        );
        assert_eq!(
            PlatformError::Transport("dns failure".into()).class(),
            ErrorClass::NonRetryable
        );
    }

    #[test]
    fn unique_violations_become_conflicts() {
        let error = Error::Conflict("UNIQUE constraint failed".into());
        assert!(error.is_conflict());
        assert!(!Error::NotFound("x".into()).is_conflict());
    }
}
