//! Engine tuning knobs.
//!
//! Provides `SyncSettings`, the timing and retention values the sync engine
//! and its stores read on every call. The api binary builds one from the
//! environment; tests build one directly.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::duration_millis;

const DEFAULT_ECHO_BUCKET: Duration = Duration::from_secs(5);
const DEFAULT_LOOP_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_EVENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_ERROR_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Timing and retention settings for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Width of one echo-suppression bucket
    pub echo_bucket: Duration,
    /// How long after a write the opposite direction is ignored for a contact
    pub loop_window: Duration,
    /// How long a processed event id stays in the ledger
    pub event_ttl: Duration,
    /// How long a recorded sync error is kept
    pub error_ttl: Duration,
    /// Retry budget recorded with retryable webhook failures
    pub max_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            echo_bucket: DEFAULT_ECHO_BUCKET,
            loop_window: DEFAULT_LOOP_WINDOW,
            event_ttl: DEFAULT_EVENT_TTL,
            error_ttl: DEFAULT_ERROR_TTL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn with_echo_bucket(mut self, echo_bucket: Duration) -> Self {
        self.echo_bucket = echo_bucket;
        self
    }

    #[must_use]
    pub const fn with_loop_window(mut self, loop_window: Duration) -> Self {
        self.loop_window = loop_window;
        self
    }

    #[must_use]
    pub const fn with_event_ttl(mut self, event_ttl: Duration) -> Self {
        self.event_ttl = event_ttl;
        self
    }

    #[must_use]
    pub const fn with_error_ttl(mut self, error_ttl: Duration) -> Self {
        self.error_ttl = error_ttl;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Reject settings the engine cannot work with.
    ///
    /// The echo bucket must be at least one millisecond; every TTL must be
    /// non-zero. A zero loop window disables the recency gate.
    pub fn validate(&self) -> Result<()> {
        if self.echo_bucket_ms() < 1 {
            return Err(Error::InvalidInput(
                "echo bucket must be at least 1ms".to_string(),
            ));
        }
        if self.event_ttl.is_zero() {
            return Err(Error::InvalidInput("event TTL must be non-zero".to_string()));
        }
        if self.error_ttl.is_zero() {
            return Err(Error::InvalidInput("error TTL must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn echo_bucket_ms(&self) -> i64 {
        duration_millis(self.echo_bucket)
    }

    pub fn loop_window_ms(&self) -> i64 {
        duration_millis(self.loop_window)
    }

    pub fn event_ttl_ms(&self) -> i64 {
        duration_millis(self.event_ttl)
    }

    pub fn error_ttl_ms(&self) -> i64 {
        duration_millis(self.error_ttl)
    }

    /// Echo bucket index for a timestamp.
    pub fn echo_bucket_at(&self, now_ms: i64) -> i64 {
        now_ms.div_euclid(self.echo_bucket_ms().max(1))
    }
}
