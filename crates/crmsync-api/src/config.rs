use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use crmsync_core::SyncSettings;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub source_api_url: String,
    pub source_api_token: String,
    pub target_api_url: String,
    pub target_api_token: String,
    /// Shared secret for target platform webhook signatures
    pub target_webhook_secret: String,
    /// When set, source webhooks must present it in `x-source-webhook-key`
    pub source_webhook_key: Option<String>,
    pub platform_http_timeout: Duration,
    pub echo_bucket: Duration,
    pub loop_window: Duration,
    pub event_ttl: Duration,
    pub error_ttl: Duration,
    pub rate_limit_window: Duration,
    pub manual_sync_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("source_api_url", &self.source_api_url)
            .field("source_api_token", &"[REDACTED]")
            .field("target_api_url", &self.target_api_url)
            .field("target_api_token", &"[REDACTED]")
            .field("target_webhook_secret", &"[REDACTED]")
            .field(
                "source_webhook_key",
                &self.source_webhook_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("platform_http_timeout", &self.platform_http_timeout)
            .field("echo_bucket", &self.echo_bucket)
            .field("loop_window", &self.loop_window)
            .field("event_ttl", &self.event_ttl)
            .field("error_ttl", &self.error_ttl)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "manual_sync_rate_limit_per_window",
                &self.manual_sync_rate_limit_per_window,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "CRMSYNC_BIND_ADDR", "127.0.0.1:8080");
        let database_path = value_or_default(&lookup, "CRMSYNC_DATABASE_PATH", ":memory:");

        let source_api_url = required_http_url(&lookup, "SOURCE_PLATFORM_API_URL")?;
        let target_api_url = required_http_url(&lookup, "TARGET_PLATFORM_API_URL")?;
        let source_api_token = required_trimmed(&lookup, "SOURCE_PLATFORM_API_TOKEN")?;
        let target_api_token = required_trimmed(&lookup, "TARGET_PLATFORM_API_TOKEN")?;
        let target_webhook_secret = required_trimmed(&lookup, "TARGET_WEBHOOK_SECRET")?;
        let source_webhook_key = optional_trimmed(&lookup, "SOURCE_WEBHOOK_KEY");

        let platform_http_timeout_secs =
            bounded(&lookup, "PLATFORM_HTTP_TIMEOUT_SECS", "30", 1, 120)?;
        let echo_bucket_ms = bounded(&lookup, "SYNC_ECHO_BUCKET_MS", "5000", 1_000, 60_000)?;
        let loop_window_ms = bounded(&lookup, "SYNC_LOOP_WINDOW_MS", "5000", 0, 60_000)?;
        let event_ttl_secs = bounded(&lookup, "EVENT_TTL_SECS", "86400", 60, 2_592_000)?;
        let error_ttl_secs = bounded(&lookup, "SYNC_ERROR_TTL_SECS", "604800", 3_600, 7_776_000)?;
        let rate_limit_window_secs = bounded(&lookup, "RATE_LIMIT_WINDOW_SECS", "60", 10, 3_600)?;
        let manual_sync_rate_limit_per_window =
            bounded(&lookup, "MANUAL_SYNC_RATE_LIMIT_PER_WINDOW", "10", 1, 1_000)?;
        let manual_sync_rate_limit_per_window = u32::try_from(manual_sync_rate_limit_per_window)
            .map_err(|_| {
                ConfigError::Invalid(
                    "MANUAL_SYNC_RATE_LIMIT_PER_WINDOW must be in [1, 1000]".to_string(),
                )
            })?;

        Ok(Self {
            bind_addr,
            database_path,
            source_api_url,
            source_api_token,
            target_api_url,
            target_api_token,
            target_webhook_secret,
            source_webhook_key,
            platform_http_timeout: Duration::from_secs(platform_http_timeout_secs),
            echo_bucket: Duration::from_millis(echo_bucket_ms),
            loop_window: Duration::from_millis(loop_window_ms),
            event_ttl: Duration::from_secs(event_ttl_secs),
            error_ttl: Duration::from_secs(error_ttl_secs),
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            manual_sync_rate_limit_per_window,
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings::default()
            .with_echo_bucket(self.echo_bucket)
            .with_loop_window(self.loop_window)
            .with_event_ttl(self.event_ttl)
            .with_error_ttl(self.error_ttl)
    }
}

fn bounded(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let value = value_or_default(lookup, name, default)
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]"))
        })?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(value)
}

fn required_http_url(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    let value = required_trimmed(lookup, name)?;
    if !is_http_url(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must start with http:// or https://"
        )));
    }
    Ok(trim_trailing(&value).to_string())
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}
