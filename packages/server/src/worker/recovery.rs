//! Tiered recovery actions.
//!
//! - HIGH: requeue this worker's stuck in-flight jobs and verify the store.
//! - CRITICAL: pause intake for every worker, persist diagnostics, raise an
//!   alert. The caller then stops the worker and the supervisor restarts it.
//! - Consecutive errors above the threshold: snapshot state, clear transient
//!   keys, reset counters.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use utage_shared::time::Clock;

use crate::{
    config::ErrorPolicyConfig,
    domain::{ControlStore, Job, JobQueue, StoreError, WorkerId, WorkerRegistry},
};

use super::{error_handler::WorkerError, metrics::WorkerMetrics};

/// Outcome of a HIGH-severity recovery
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StuckJobs {
    pub requeued: usize,
    pub exhausted: Vec<Job>,
}

const RECOVERY_STATE_TTL: Duration = Duration::from_secs(3600);
const DIAGNOSTICS_TTL: Duration = Duration::from_secs(86_400);

pub struct Recovery {
    worker_id: WorkerId,
    queue: Arc<dyn JobQueue>,
    registry: Arc<dyn WorkerRegistry>,
    control: Arc<dyn ControlStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<WorkerMetrics>,
    config: ErrorPolicyConfig,
    consecutive_errors: AtomicU32,
}

impl Recovery {
    pub fn new(
        worker_id: WorkerId,
        queue: Arc<dyn JobQueue>,
        registry: Arc<dyn WorkerRegistry>,
        control: Arc<dyn ControlStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<WorkerMetrics>,
        config: ErrorPolicyConfig,
    ) -> Self {
        Self {
            worker_id,
            queue,
            registry,
            control,
            clock,
            metrics,
            config,
            consecutive_errors: AtomicU32::new(0),
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Relaxed)
    }

    pub fn record_success(&self) {
        self.consecutive_errors.store(0, Ordering::Relaxed);
    }

    /// Count an error; runs a full recovery cycle once the threshold is reached.
    pub async fn record_error(&self) -> Result<bool, StoreError> {
        let count = self.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
        if count < self.config.error_threshold {
            return Ok(false);
        }
        self.full_recovery(count).await?;
        Ok(true)
    }

    /// HIGH: put this worker's in-flight jobs back on the queue and ping the store.
    ///
    /// Each requeue spends one attempt of the job's retry budget; jobs whose
    /// budget is spent are returned in [`StuckJobs::exhausted`] for a terminal ERROR.
    pub async fn recover_stuck(&self) -> Result<StuckJobs, StoreError> {
        tracing::warn!(worker_id = self.worker_id.as_str(), "High priority recovery");
        let mut stuck = StuckJobs::default();
        for job in self.registry.take_in_flight(&self.worker_id).await? {
            if job.attempt >= self.config.max_retries {
                tracing::warn!(
                    worker_id = self.worker_id.as_str(),
                    item_id = job.item_id.as_str(),
                    attempt = job.attempt,
                    "Stuck job ran out of retries"
                );
                stuck.exhausted.push(job);
                continue;
            }
            tracing::info!(
                worker_id = self.worker_id.as_str(),
                item_id = job.item_id.as_str(),
                "Requeueing stuck job"
            );
            self.queue.enqueue(job.next_attempt()).await?;
            stuck.requeued += 1;
        }
        self.control.ping().await?;
        self.metrics.record_event("high_priority_recovery_attempted");
        Ok(stuck)
    }

    /// CRITICAL: pause intake, persist diagnostics and raise an alert.
    pub async fn recover_critical(&self, error: &WorkerError) -> Result<(), StoreError> {
        self.control.pause_intake(self.config.pause_duration).await?;
        self.metrics.record_event("queue_processing_paused");

        let now = self.clock.now_millis();
        let key = format!("worker:diagnostics:{}:{}", self.worker_id.as_str(), now);
        let diagnostics = serde_json::json!({
            "workerId": self.worker_id.as_str(),
            "error": {
                "kind": error.kind(),
                "message": error.to_string(),
            },
            "consecutiveErrors": self.consecutive_errors(),
            "state": self.control.get_snapshot(&self.state_key()).await?,
            "metrics": self.metrics.to_json(),
            "timestamp": now,
        });
        self.control
            .put_snapshot(&key, diagnostics, DIAGNOSTICS_TTL)
            .await?;

        tracing::error!(
            alert = true,
            worker_id = self.worker_id.as_str(),
            severity = "critical",
            diagnostics = key.as_str(),
            "Worker alert: {}",
            error
        );
        self.metrics.record_event("alert_sent");
        self.metrics.record_event("critical_recovery_attempted");
        Ok(())
    }

    async fn full_recovery(&self, count: u32) -> Result<(), StoreError> {
        tracing::warn!(
            worker_id = self.worker_id.as_str(),
            error_count = count,
            threshold = self.config.error_threshold,
            "Initiating worker recovery"
        );
        let state = serde_json::json!({
            "workerId": self.worker_id.as_str(),
            "timestamp": self.clock.now_millis(),
            "errorCount": count,
            "metrics": self.metrics.to_json(),
        });
        self.control
            .put_snapshot(&self.state_key(), state, RECOVERY_STATE_TTL)
            .await?;
        self.control.clear_transient().await?;
        self.metrics.reset();
        self.consecutive_errors.store(0, Ordering::Relaxed);
        self.metrics.record_event("recovery_initiated");
        Ok(())
    }

    fn state_key(&self) -> String {
        format!("worker:recovery:state:{}", self.worker_id.as_str())
    }
}
