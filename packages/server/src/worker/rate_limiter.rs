//! Sliding-window rate limiter over the shared store.
//!
//! Fails open: when the store cannot be reached the call is admitted and a
//! warning is logged.

use std::sync::Arc;

use utage_shared::time::Clock;

use crate::{config::RateLimitConfig, domain::RateLimitStore};

use super::metrics::WorkerMetrics;

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    metrics: Arc<WorkerMetrics>,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            metrics,
        }
    }

    /// `true` when `key` already used up its window; otherwise records this
    /// attempt and returns `false`.
    pub async fn is_limited(&self, key: &str) -> bool {
        let window_key = format!("ratelimit:{}", key);
        let now = self.clock.now_millis();
        let window_millis = i64::try_from(self.config.window.as_millis()).unwrap_or(i64::MAX);
        // 窓の開始時刻ちょうどに記録されたエントリも期限切れとして扱う
        let window_start = now.saturating_sub(window_millis).saturating_add(1);

        match self.check(&window_key, window_start, now).await {
            Ok(limited) => {
                if limited {
                    self.metrics.record_event("rate_limit_exceeded");
                    tracing::warn!(key, "Rate limit exceeded");
                }
                limited
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Rate limiter store error, failing open");
                false
            }
        }
    }

    async fn check(
        &self,
        window_key: &str,
        window_start: i64,
        now: i64,
    ) -> Result<bool, crate::domain::StoreError> {
        self.store.prune_window(window_key, window_start).await?;
        let count = self.store.count_window(window_key).await?;
        if count >= self.config.max_requests {
            return Ok(true);
        }
        self.store.record_in_window(window_key, now).await?;
        Ok(false)
    }
}
