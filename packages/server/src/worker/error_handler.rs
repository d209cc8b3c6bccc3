//! Worker failure taxonomy and severity policy.
//!
//! | severity | policy |
//! |---|---|
//! | LOW / MEDIUM | retry with exponential backoff, terminal ERROR when exhausted |
//! | HIGH | requeue stuck in-flight jobs, verify connectivity, continue |
//! | CRITICAL | pause intake, save diagnostics, alert, stop the worker |

use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    config::ErrorPolicyConfig,
    domain::{Job, MetadataError, RepositoryError, StoreError, TransitionError},
};

use super::{circuit_breaker::BreakerError, metrics::WorkerMetrics};

/// Message stored on an item whose retries ran out
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "Failed to process queue item";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// Business-rule rejection; terminal and visible to the room
    #[error("validation failed: {0}")]
    Validation(String),
    /// Retryable infrastructure hiccup
    #[error("transient failure: {0}")]
    Transient(String),
    /// Store or downstream connectivity degraded
    #[error("resource degraded: {0}")]
    Resource(String),
    /// Invariant violation
    #[error("invariant violated: {0}")]
    State(String),
    /// Input that can never be processed
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("{0}")]
    Unclassified(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

const CRITICAL_KEYWORDS: [&str; 4] = ["store", "database", "connection", "redis"];

impl WorkerError {
    pub fn severity(&self) -> Severity {
        match self {
            WorkerError::Validation(_) => Severity::Low,
            WorkerError::Transient(_) => Severity::Medium,
            WorkerError::Resource(_) | WorkerError::Malformed(_) => Severity::High,
            WorkerError::State(_) => Severity::Critical,
            WorkerError::Unclassified(message) => {
                let message = message.to_lowercase();
                if CRITICAL_KEYWORDS.iter().any(|k| message.contains(k)) {
                    Severity::Critical
                } else {
                    Severity::Medium
                }
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Transient(_) | WorkerError::Unclassified(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Validation(_) => "validation",
            WorkerError::Transient(_) => "transient",
            WorkerError::Resource(_) => "resource",
            WorkerError::State(_) => "state",
            WorkerError::Malformed(_) => "malformed",
            WorkerError::Unclassified(_) => "unclassified",
        }
    }
}

impl From<StoreError> for WorkerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(_) => WorkerError::Resource(error.to_string()),
            StoreError::Serialization(_) => WorkerError::Malformed(error.to_string()),
        }
    }
}

impl From<RepositoryError> for WorkerError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Unavailable(_) => WorkerError::Resource(error.to_string()),
            other => WorkerError::Unclassified(other.to_string()),
        }
    }
}

impl From<TransitionError> for WorkerError {
    fn from(error: TransitionError) -> Self {
        WorkerError::State(error.to_string())
    }
}

impl From<MetadataError> for WorkerError {
    fn from(error: MetadataError) -> Self {
        match error {
            MetadataError::NotFound(_) => WorkerError::Validation("Video not found".to_string()),
            MetadataError::Timeout | MetadataError::Unavailable(_) => {
                WorkerError::Transient(error.to_string())
            }
            MetadataError::Malformed(_) => WorkerError::Malformed(error.to_string()),
        }
    }
}

impl From<BreakerError<MetadataError>> for WorkerError {
    fn from(error: BreakerError<MetadataError>) -> Self {
        match error {
            BreakerError::Open => WorkerError::Transient("circuit breaker is open".to_string()),
            BreakerError::Inner(inner) => inner.into(),
        }
    }
}

/// What the worker loop does next with a failed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorAction {
    /// Wait `delay`, then requeue `job` (its attempt counter already bumped)
    Retry { job: Job, delay: Duration },
    /// Persist a terminal ERROR on the item
    Fail { job: Job, message: String },
    /// No job in hand: wait before the next iteration
    Backoff(Duration),
    /// HIGH: requeue stuck jobs and verify connectivity
    Recover,
    /// CRITICAL: pause intake and stop this worker
    Halt,
}

pub struct ErrorHandler {
    config: ErrorPolicyConfig,
    metrics: Arc<WorkerMetrics>,
}

impl ErrorHandler {
    pub fn new(config: ErrorPolicyConfig, metrics: Arc<WorkerMetrics>) -> Self {
        Self { config, metrics }
    }

    /// `base_delay * 2^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Classify `error` and choose the follow-up for `job` (if a job was in hand).
    pub fn handle(&self, error: &WorkerError, job: Option<&Job>) -> ErrorAction {
        let severity = error.severity();
        tracing::error!(
            severity = %severity,
            kind = error.kind(),
            item_id = job.map(|j| j.item_id.as_str()),
            attempt = job.map(|j| j.attempt),
            "Worker error: {}",
            error
        );
        self.metrics.record_event(&format!("error_severity_{}", severity));

        match severity {
            Severity::Critical => ErrorAction::Halt,
            Severity::High => {
                self.metrics.record_event("high_severity_error");
                ErrorAction::Recover
            }
            Severity::Low | Severity::Medium => {
                let Some(job) = job else {
                    return ErrorAction::Backoff(self.backoff(0));
                };
                if error.is_retryable() && job.attempt < self.config.max_retries {
                    let delay = self.backoff(job.attempt);
                    tracing::info!(
                        item_id = job.item_id.as_str(),
                        "Retrying after {:?} (attempt {})",
                        delay,
                        job.attempt + 1
                    );
                    self.metrics.record_event("job_retry");
                    ErrorAction::Retry {
                        job: job.next_attempt(),
                        delay,
                    }
                } else {
                    let message = match error {
                        WorkerError::Validation(message) => message.clone(),
                        _ => RETRIES_EXHAUSTED_MESSAGE.to_string(),
                    };
                    ErrorAction::Fail {
                        job: job.clone(),
                        message,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemId, RoomId, VideoId};
    use utage_shared::time::ManualClock;

    fn job(attempt: u32) -> Job {
        Job {
            item_id: ItemId::new("item-1".to_string()).unwrap(),
            room_id: RoomId::new("room-1".to_string()).unwrap(),
            video_id: VideoId::new("vid".to_string()).unwrap(),
            attempt,
        }
    }

    fn create_test_handler() -> ErrorHandler {
        let metrics = Arc::new(WorkerMetrics::new(Arc::new(ManualClock::new(0))));
        ErrorHandler::new(ErrorPolicyConfig::default(), metrics)
    }

    #[test]
    fn test_classification_heuristics() {
        // テスト項目: 分類ヒューリスティクス（不正入力は HIGH、ストア系キーワードは CRITICAL、既定は MEDIUM）
        assert_eq!(
            WorkerError::Malformed("bad json".to_string()).severity(),
            Severity::High
        );
        assert_eq!(
            WorkerError::Unclassified("Redis connection reset".to_string()).severity(),
            Severity::Critical
        );
        assert_eq!(
            WorkerError::Unclassified("database is locked".to_string()).severity(),
            Severity::Critical
        );
        assert_eq!(
            WorkerError::Unclassified("something odd".to_string()).severity(),
            Severity::Medium
        );
        assert_eq!(
            WorkerError::State("PLAYING twice".to_string()).severity(),
            Severity::Critical
        );
    }

    #[test]
    fn test_backoff_is_exponential() {
        // テスト項目: バックオフは base_delay * 2^attempt
        let handler = create_test_handler();
        assert_eq!(handler.backoff(0), Duration::from_secs(1));
        assert_eq!(handler.backoff(1), Duration::from_secs(2));
        assert_eq!(handler.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_transient_is_retried_until_exhausted() {
        // テスト項目: 一時的なエラーは max_retries まで再試行され、その後 ERROR になる
        // given (前提条件):
        let handler = create_test_handler();
        let error = WorkerError::Transient("timeout".to_string());

        // when (操作):
        let first = handler.handle(&error, Some(&job(0)));
        let last = handler.handle(&error, Some(&job(3)));

        // then (期待する結果):
        assert_eq!(
            first,
            ErrorAction::Retry {
                job: job(1),
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            last,
            ErrorAction::Fail {
                job: job(3),
                message: RETRIES_EXHAUSTED_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_severity_routes_to_recovery_and_halt() {
        // テスト項目: HIGH は Recover、CRITICAL は Halt になる
        let handler = create_test_handler();
        assert_eq!(
            handler.handle(&WorkerError::Resource("store down".to_string()), Some(&job(0))),
            ErrorAction::Recover
        );
        assert_eq!(
            handler.handle(&WorkerError::State("bad".to_string()), Some(&job(0))),
            ErrorAction::Halt
        );
    }

    #[test]
    fn test_metadata_errors_are_classified() {
        // テスト項目: メタデータ取得エラーが分類される
        assert_eq!(
            WorkerError::from(MetadataError::NotFound("v".to_string())),
            WorkerError::Validation("Video not found".to_string())
        );
        assert!(WorkerError::from(MetadataError::Timeout).is_retryable());
        assert_eq!(
            WorkerError::from(BreakerError::<MetadataError>::Open).severity(),
            Severity::Medium
        );
    }
}
