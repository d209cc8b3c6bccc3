//! Leaderless worker coordination through heartbeat records.
//!
//! Each worker registers a record with a TTL and refreshes it every heartbeat.
//! `should_process_work` compares the fair share of the backlog with this
//! worker's own processing rate. On a separate, shorter interval the worker
//! requeues the in-flight jobs of siblings whose heartbeat has gone stale, so a
//! crashed worker's claims are released within one heartbeat timeout.

use std::sync::{Arc, Weak};

use tokio::{sync::Mutex, task::JoinHandle};
use utage_shared::time::Clock;

use crate::{
    config::CoordinatorConfig,
    domain::{JobQueue, StoreError, Timestamp, WorkerId, WorkerRecord, WorkerRegistry, WorkerStatus},
};

use super::metrics::WorkerMetrics;

pub struct WorkerCoordinator {
    worker_id: WorkerId,
    registry: Arc<dyn WorkerRegistry>,
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
    metrics: Arc<WorkerMetrics>,
    config: CoordinatorConfig,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerCoordinator {
    pub fn new(
        worker_id: WorkerId,
        registry: Arc<dyn WorkerRegistry>,
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
        metrics: Arc<WorkerMetrics>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            worker_id,
            registry,
            queue,
            clock,
            metrics,
            config,
            heartbeat_task: Mutex::new(None),
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    fn heartbeat_timeout_millis(&self) -> i64 {
        millis(self.config.heartbeat_timeout)
    }

    /// Heartbeat age after which a sibling's claims are reclaimed.
    ///
    /// One reap interval earlier than the liveness timeout, but never at or
    /// below the heartbeat interval of a healthy sibling.
    fn reap_after_millis(&self) -> i64 {
        let cutoff = self
            .config
            .heartbeat_timeout
            .saturating_sub(self.config.reap_interval);
        if cutoff > self.config.heartbeat_interval {
            millis(cutoff)
        } else {
            self.heartbeat_timeout_millis()
        }
    }

    /// Register this worker and start the periodic heartbeat and reaping.
    pub async fn start(self: &Arc<Self>) -> Result<(), StoreError> {
        let record = WorkerRecord::new(self.worker_id.clone(), self.now());
        self.registry
            .put_worker(record, self.config.record_ttl)
            .await?;

        let coordinator: Weak<Self> = Arc::downgrade(self);
        let (heartbeat_period, reap_period) =
            (self.config.heartbeat_interval, self.config.reap_interval);
        let handle = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(heartbeat_period);
            let mut reap = tokio::time::interval(reap_period);
            // 最初の tick は即座に完了するので読み捨てる
            heartbeat.tick().await;
            reap.tick().await;
            loop {
                let reaping = tokio::select! {
                    _ = heartbeat.tick() => false,
                    _ = reap.tick() => true,
                };
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                if reaping {
                    coordinator.reap().await;
                } else if let Err(e) = coordinator.heartbeat().await {
                    tracing::error!(
                        worker_id = coordinator.worker_id.as_str(),
                        "Heartbeat update failed: {}",
                        e
                    );
                }
            }
        });
        *self.heartbeat_task.lock().await = Some(handle);

        tracing::info!(worker_id = self.worker_id.as_str(), "Worker coordinator started");
        Ok(())
    }

    /// Stop heartbeats, mark the record stopped and deregister.
    pub async fn stop(&self) -> Result<(), StoreError> {
        if let Some(handle) = self.heartbeat_task.lock().await.take() {
            handle.abort();
        }
        if let Some(mut record) = self.registry.get_worker(&self.worker_id).await? {
            record.status = WorkerStatus::Stopped;
            self.registry
                .put_worker(record, self.config.record_ttl)
                .await?;
        }
        self.registry.remove_worker(&self.worker_id).await?;
        tracing::info!(worker_id = self.worker_id.as_str(), "Worker coordinator stopped");
        Ok(())
    }

    /// Mark the record draining so siblings stop counting this worker.
    pub async fn drain(&self) -> Result<(), StoreError> {
        if let Some(mut record) = self.registry.get_worker(&self.worker_id).await? {
            record.status = WorkerStatus::Draining;
            self.registry
                .put_worker(record, self.config.record_ttl)
                .await?;
        }
        Ok(())
    }

    /// Refresh the record with the current metrics.
    pub async fn heartbeat(&self) -> Result<(), StoreError> {
        let now = self.now();
        let mut record = match self.registry.get_worker(&self.worker_id).await? {
            Some(record) => record,
            // 期限切れで消えていた場合は登録し直す
            None => WorkerRecord::new(self.worker_id.clone(), now),
        };
        record.last_heartbeat = now;
        record.metrics = self.metrics.snapshot();
        self.registry
            .put_worker(record, self.config.record_ttl)
            .await
    }

    async fn reap(&self) {
        match self.reap_dead_workers().await {
            Ok(0) => {}
            Ok(reaped) => tracing::warn!(
                worker_id = self.worker_id.as_str(),
                requeued = reaped,
                "Requeued in-flight jobs of dead workers"
            ),
            Err(e) => tracing::error!(
                worker_id = self.worker_id.as_str(),
                "Dead worker scan failed: {}",
                e
            ),
        }
    }

    /// Requeue the in-flight jobs of workers whose record expired or went stale.
    pub async fn reap_dead_workers(&self) -> Result<usize, StoreError> {
        let now = self.now();
        let timeout = self.reap_after_millis();
        let mut requeued = 0;
        for owner in self.registry.in_flight_owners().await? {
            if owner == self.worker_id {
                continue;
            }
            let alive = self
                .registry
                .get_worker(&owner)
                .await?
                .is_some_and(|record| record.is_live(now, timeout));
            if alive {
                continue;
            }
            // take_in_flight は原子的なので、同時に刈り取っても二重には積まれない
            for job in self.registry.take_in_flight(&owner).await? {
                tracing::info!(
                    dead_worker = owner.as_str(),
                    item_id = job.item_id.as_str(),
                    "Requeueing job of dead worker"
                );
                self.queue.enqueue(job).await?;
                requeued += 1;
            }
            self.metrics.record_event("dead_worker_reaped");
        }
        Ok(requeued)
    }

    /// Workers whose heartbeat is fresher than the heartbeat timeout.
    pub async fn active_workers(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        let now = self.now();
        let timeout = self.heartbeat_timeout_millis();
        Ok(self
            .registry
            .list_workers()
            .await?
            .into_iter()
            .filter(|record| record.is_live(now, timeout))
            .collect())
    }

    /// Whether this worker should pull the next job.
    ///
    /// Returns `false` on store errors.
    pub async fn should_process_work(&self) -> bool {
        match self.evaluate_load().await {
            Ok(should) => should,
            Err(e) => {
                tracing::error!(
                    worker_id = self.worker_id.as_str(),
                    "Error checking work status: {}",
                    e
                );
                false
            }
        }
    }

    async fn evaluate_load(&self) -> Result<bool, StoreError> {
        let Some(record) = self.registry.get_worker(&self.worker_id).await? else {
            return Ok(false);
        };
        if record.status != WorkerStatus::Active {
            return Ok(false);
        }
        let active = self.active_workers().await?.len().max(1);
        let queue_length = self.queue.length().await?;
        self.metrics.update_queue_length(queue_length);

        let worker_load = queue_length as f64 / active as f64;
        Ok(self.metrics.processing_rate() < worker_load)
    }
}

fn millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
