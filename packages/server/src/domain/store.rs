//! Shared coordination store interfaces.
//!
//! These traits are the only surface the queue workers share: the durable job
//! queue, worker heartbeats and in-flight tracking, rate-limit windows and the
//! control keys used by recovery. Workers hold no other shared state.

use std::time::Duration;

use async_trait::async_trait;

use super::{Job, ItemId, StoreError, WorkerId, WorkerRecord};

/// Durable FIFO of pending validation work (at-least-once).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job. Never blocks.
    async fn enqueue(&self, job: Job) -> Result<(), StoreError>;

    /// Pop the oldest job, waiting up to `timeout` for one to arrive.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, StoreError>;

    /// Number of jobs waiting.
    async fn length(&self) -> Result<usize, StoreError>;
}

/// Worker heartbeat records and per-worker in-flight jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Insert or refresh a record; it expires after `ttl` unless refreshed.
    async fn put_worker(&self, record: WorkerRecord, ttl: Duration) -> Result<(), StoreError>;

    async fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<WorkerRecord>, StoreError>;

    async fn remove_worker(&self, worker_id: &WorkerId) -> Result<(), StoreError>;

    /// All unexpired records.
    async fn list_workers(&self) -> Result<Vec<WorkerRecord>, StoreError>;

    /// Remember that `worker_id` is processing `job`.
    async fn track_in_flight(&self, worker_id: &WorkerId, job: &Job) -> Result<(), StoreError>;

    async fn clear_in_flight(&self, worker_id: &WorkerId, item_id: &ItemId)
    -> Result<(), StoreError>;

    /// Atomically remove and return every in-flight job of `worker_id`.
    async fn take_in_flight(&self, worker_id: &WorkerId) -> Result<Vec<Job>, StoreError>;

    /// Workers that currently own in-flight jobs.
    async fn in_flight_owners(&self) -> Result<Vec<WorkerId>, StoreError>;
}

/// Sliding-window entries keyed by operation name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Drop entries recorded strictly before `before_millis`.
    async fn prune_window(&self, key: &str, before_millis: i64) -> Result<(), StoreError>;

    async fn count_window(&self, key: &str) -> Result<usize, StoreError>;

    async fn record_in_window(&self, key: &str, at_millis: i64) -> Result<(), StoreError>;
}

/// Control keys used by error recovery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlStore: Send + Sync {
    /// Pause queue intake for every worker for `ttl`.
    async fn pause_intake(&self, ttl: Duration) -> Result<(), StoreError>;

    async fn is_intake_paused(&self) -> Result<bool, StoreError>;

    /// Store a JSON document under `key` for `ttl`.
    async fn put_snapshot(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn get_snapshot(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Drop transient keys (rate-limit windows, expired entries).
    async fn clear_transient(&self) -> Result<(), StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}
