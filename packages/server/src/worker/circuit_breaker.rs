//! Circuit breaker guarding the metadata provider.
//!
//! ```text
//! CLOSED --(failure_threshold consecutive failures)--> OPEN
//! OPEN --(reset_timeout elapsed)--> HALF_OPEN
//! HALF_OPEN --(success)--> CLOSED
//! HALF_OPEN --(failure)--> OPEN
//! ```
//!
//! State is per worker; it is never shared through the store.

use std::{future::Future, sync::Arc, sync::Mutex};

use utage_shared::time::Clock;

use crate::{config::CircuitBreakerConfig, domain::MetadataError};

use super::metrics::WorkerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Whether an error counts against the guarded dependency
pub trait TripsBreaker {
    fn trips_breaker(&self) -> bool;
}

impl TripsBreaker for MetadataError {
    fn trips_breaker(&self) -> bool {
        // 存在しない動画はプロバイダの障害ではない
        !matches!(self, MetadataError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure_time: i64,
    half_open_attempts: u32,
}

pub struct CircuitBreaker {
    clock: Arc<dyn Clock>,
    config: CircuitBreakerConfig,
    metrics: Arc<WorkerMetrics>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(
        clock: Arc<dyn Clock>,
        config: CircuitBreakerConfig,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self {
            clock,
            config,
            metrics,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_time: 0,
                half_open_attempts: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// `false` while OPEN and the reset timeout has not elapsed yet.
    pub fn allows_requests(&self) -> bool {
        let inner = self.lock();
        inner.state != BreakerState::Open || self.reset_elapsed(&inner)
    }

    /// Run `operation` unless the breaker rejects it.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        E: TripsBreaker,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;
        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                if e.trips_breaker() {
                    self.on_failure();
                } else {
                    self.on_success();
                }
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn admit<E>(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.lock();
        if inner.state == BreakerState::Open {
            if !self.reset_elapsed(&inner) {
                self.metrics.record_event("circuit_breaker_rejected");
                return Err(BreakerError::Open);
            }
            inner.state = BreakerState::HalfOpen;
            inner.half_open_attempts = 0;
            tracing::info!("Circuit breaker entering half-open state");
            self.metrics.record_event("circuit_breaker_half_open");
        }
        if inner.state == BreakerState::HalfOpen {
            if inner.half_open_attempts >= self.config.half_open_max_attempts {
                self.metrics.record_event("circuit_breaker_rejected");
                return Err(BreakerError::Open);
            }
            inner.half_open_attempts += 1;
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            tracing::info!("Circuit breaker closed");
            self.metrics.record_event("circuit_breaker_closed");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.half_open_attempts = 0;
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure_time = self.clock.now_millis();
        if inner.state == BreakerState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold
        {
            if inner.state != BreakerState::Open {
                tracing::warn!(failure_count = inner.failure_count, "Circuit breaker opened");
                self.metrics.record_event("circuit_breaker_opened");
            }
            inner.state = BreakerState::Open;
        }
    }

    fn reset_elapsed(&self, inner: &BreakerInner) -> bool {
        let reset_millis = i64::try_from(self.config.reset_timeout.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_millis() - inner.last_failure_time >= reset_millis
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
