//! Idempotency ledger entry

use serde::{Deserialize, Serialize};

use super::Platform;

/// An event identifier that has already been handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub event_id: String,
    /// Platform the event belongs to
    pub platform: Platform,
    pub event_type: Option<String>,
    /// Processing timestamp (Unix ms)
    pub processed_at: i64,
    /// Expiry timestamp (Unix ms); the id may be reused afterwards
    pub expires_at: i64,
}

impl ProcessedEvent {
    pub const fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}
