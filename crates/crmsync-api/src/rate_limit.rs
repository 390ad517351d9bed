use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window limiter for manual sync triggers, keyed by tenant
#[derive(Clone)]
pub struct TenantRateLimiter {
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
    window: Duration,
    limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Default)]
struct RateLimitMetrics {
    allowed: AtomicU64,
    limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub manual_sync_allowed: u64,
    pub manual_sync_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl TenantRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.manual_sync_rate_limit_per_window,
        )
    }

    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, tenant_id: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        guard.retain(|_, window| now.duration_since(window.started_at) < self.window);

        let entry = guard.entry(tenant_id.to_string()).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if entry.count >= self.limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs()
                .max(1);
            self.metrics.limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                tenant = %tenant_id,
                retry_after_secs,
                "Manual sync rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                "Manual sync rate limit exceeded for tenant",
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            manual_sync_allowed: self.metrics.allowed.load(Ordering::Relaxed),
            manual_sync_limited: self.metrics.limited.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = TenantRateLimiter::new(Duration::from_secs(60), 2);

        limiter.check("tenant-a").await.unwrap();
        limiter.check("tenant-a").await.unwrap();

        let err = limiter.check("tenant-a").await.unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, secs) if secs >= 1));

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.manual_sync_allowed, 2);
        assert_eq!(metrics.manual_sync_limited, 1);
    }

    #[tokio::test]
    async fn rate_limiter_tracks_tenants_separately() {
        let limiter = TenantRateLimiter::new(Duration::from_secs(60), 1);

        limiter.check("tenant-a").await.unwrap();
        limiter.check("tenant-b").await.unwrap();
        assert!(limiter.check("tenant-a").await.is_err());
    }

    #[tokio::test]
    async fn rate_limiter_resets_after_window() {
        let limiter = TenantRateLimiter::new(Duration::from_millis(20), 1);

        limiter.check("tenant-a").await.unwrap();
        assert!(limiter.check("tenant-a").await.is_err());

        tokio::time::sleep(Duration::from_millis(40)).await;
        limiter.check("tenant-a").await.unwrap();
    }
}
