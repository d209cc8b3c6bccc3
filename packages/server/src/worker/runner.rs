//! Worker loop and supervisor.
//!
//! Every worker is an independent task with its own coordinator, limiter,
//! breaker, error policy and recovery state. Workers share nothing but the
//! store and the persistence / broadcast collaborators. A worker that stops
//! after a CRITICAL error (or panics) is restarted by the supervisor with a
//! fresh identity.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use utage_shared::time::Clock;

use crate::{
    config::ServerConfig,
    domain::{ControlStore, Job, JobQueue, RateLimitStore, Timestamp, WorkerId, WorkerRegistry},
};

use super::{
    circuit_breaker::CircuitBreaker,
    coordinator::WorkerCoordinator,
    error_handler::{ErrorAction, ErrorHandler, RETRIES_EXHAUSTED_MESSAGE, WorkerError},
    metrics::{MetricsRegistry, WorkerMetrics},
    processor::{ProcessOutcome, ProcessorContext, QueueProcessor},
    rate_limiter::RateLimiter,
    recovery::Recovery,
};

/// Rate-limit key for the worker loop itself
const QUEUE_PROCESSING_RATE_KEY: &str = "queue_processing";

/// Handles of the shared coordination store
#[derive(Clone)]
pub struct WorkerStores {
    pub queue: Arc<dyn JobQueue>,
    pub registry: Arc<dyn WorkerRegistry>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub control: Arc<dyn ControlStore>,
}

/// Why a worker returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Shutdown,
    Halted(WorkerError),
}

/// Result of one loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing was dequeued
    Idle,
    /// A job was handled (successfully or not)
    Handled,
    Halt(WorkerError),
}

/// Builds workers with fresh identities
#[derive(Clone)]
pub struct WorkerFactory {
    stores: WorkerStores,
    context: ProcessorContext,
    clock: Arc<dyn Clock>,
    config: ServerConfig,
    metrics: Arc<MetricsRegistry>,
}

impl WorkerFactory {
    pub fn new(
        stores: WorkerStores,
        context: ProcessorContext,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            stores,
            context,
            clock,
            config,
            metrics,
        }
    }

    pub fn build(&self) -> Worker {
        let worker_id = WorkerId::generate(Timestamp::new(self.clock.now_millis()));
        let metrics = Arc::new(self.metrics.worker(&worker_id, self.clock.clone()));
        let limiter = Arc::new(RateLimiter::new(
            self.stores.rate_limits.clone(),
            self.clock.clone(),
            self.config.rate_limit,
            metrics.clone(),
        ));
        let breaker = Arc::new(CircuitBreaker::new(
            self.clock.clone(),
            self.config.circuit_breaker,
            metrics.clone(),
        ));
        let coordinator = Arc::new(WorkerCoordinator::new(
            worker_id.clone(),
            self.stores.registry.clone(),
            self.stores.queue.clone(),
            self.clock.clone(),
            metrics.clone(),
            self.config.coordinator,
        ));
        let recovery = Recovery::new(
            worker_id.clone(),
            self.stores.queue.clone(),
            self.stores.registry.clone(),
            self.stores.control.clone(),
            self.clock.clone(),
            metrics.clone(),
            self.config.error_policy,
        );
        Worker {
            id: worker_id,
            stores: self.stores.clone(),
            coordinator,
            limiter: limiter.clone(),
            breaker: breaker.clone(),
            processor: QueueProcessor::new(self.context.clone(), limiter, breaker),
            error_handler: ErrorHandler::new(self.config.error_policy, metrics.clone()),
            recovery,
            metrics,
            settings: self.config.worker,
        }
    }
}

pub struct Worker {
    id: WorkerId,
    stores: WorkerStores,
    coordinator: Arc<WorkerCoordinator>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    processor: QueueProcessor,
    error_handler: ErrorHandler,
    recovery: Recovery,
    metrics: Arc<WorkerMetrics>,
    settings: crate::config::WorkerConfig,
}

impl Worker {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    pub fn coordinator(&self) -> &Arc<WorkerCoordinator> {
        &self.coordinator
    }

    /// Register, then loop until shutdown or a CRITICAL error.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> WorkerExit {
        if let Err(e) = self.coordinator.start().await {
            let error = WorkerError::from(e);
            tracing::error!(worker_id = self.id.as_str(), "Worker startup failed: {}", error);
            return WorkerExit::Halted(error);
        }
        tracing::info!(worker_id = self.id.as_str(), "Queue worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            // 処理中のジョブは中断しない（dequeue は dequeue_timeout で戻る）
            if let Tick::Halt(error) = self.tick().await {
                if let Err(e) = self.coordinator.stop().await {
                    tracing::warn!(worker_id = self.id.as_str(), "Failed to deregister: {}", e);
                }
                tracing::error!(worker_id = self.id.as_str(), "Worker halted: {}", error);
                return WorkerExit::Halted(error);
            }
            if !self.pause(self.settings.idle_delay, &mut shutdown).await {
                break;
            }
        }

        tracing::info!(worker_id = self.id.as_str(), "Worker shutting down...");
        if let Err(e) = self.coordinator.drain().await {
            tracing::warn!(worker_id = self.id.as_str(), "Failed to drain: {}", e);
        }
        if let Err(e) = self.coordinator.stop().await {
            tracing::warn!(worker_id = self.id.as_str(), "Failed to deregister: {}", e);
        }
        WorkerExit::Shutdown
    }

    /// Sleep for `delay`; `false` when shutdown was requested meanwhile.
    async fn pause(&self, delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.changed() => false,
        }
    }

    /// One iteration of the worker loop.
    pub async fn tick(&self) -> Tick {
        match self.stores.control.is_intake_paused().await {
            Ok(true) => {
                tracing::debug!(worker_id = self.id.as_str(), "Queue intake paused");
                tokio::time::sleep(self.settings.backoff_delay).await;
                return Tick::Idle;
            }
            Ok(false) => {}
            Err(e) => return self.on_error(WorkerError::from(e), None).await,
        }

        if !self.coordinator.should_process_work().await {
            tokio::time::sleep(self.settings.backoff_delay).await;
            return Tick::Idle;
        }

        if self.limiter.is_limited(QUEUE_PROCESSING_RATE_KEY).await {
            tracing::warn!(worker_id = self.id.as_str(), "Queue processing rate limited");
            tokio::time::sleep(self.settings.backoff_delay).await;
            return Tick::Idle;
        }

        // OPEN の間は何も取り出さない
        if !self.breaker.allows_requests() {
            tokio::time::sleep(self.settings.backoff_delay).await;
            return Tick::Idle;
        }

        let job = match self.stores.queue.dequeue(self.settings.dequeue_timeout).await {
            Ok(Some(job)) => job,
            Ok(None) => return Tick::Idle,
            Err(e) => return self.on_error(WorkerError::from(e), None).await,
        };

        if let Err(e) = self.stores.registry.track_in_flight(&self.id, &job).await {
            // 取り出したジョブを失わないよう先にキューへ戻す
            if let Err(requeue) = self.stores.queue.enqueue(job.clone()).await {
                tracing::error!(item_id = job.item_id.as_str(), "Failed to requeue job: {}", requeue);
            }
            return self.on_error(WorkerError::from(e), None).await;
        }

        let tick = match self.processor.process(&job).await {
            Ok(outcome) => {
                if outcome != ProcessOutcome::Skipped {
                    self.metrics.record_success();
                }
                self.recovery.record_success();
                self.clear_in_flight(&job).await;
                Tick::Handled
            }
            Err(error) => self.on_error(error, Some(&job)).await,
        };

        match self.stores.queue.length().await {
            Ok(length) => self.metrics.update_queue_length(length),
            Err(e) => tracing::debug!("Failed to read queue length: {}", e),
        }
        tick
    }

    async fn on_error(&self, error: WorkerError, job: Option<&Job>) -> Tick {
        self.metrics.record_failure();
        let action = self.error_handler.handle(&error, job);
        match self.recovery.record_error().await {
            Ok(true) => tracing::warn!(worker_id = self.id.as_str(), "Recovery cycle completed"),
            Ok(false) => {}
            Err(e) => tracing::error!(worker_id = self.id.as_str(), "Recovery failed: {}", e),
        }

        match action {
            ErrorAction::Retry { job: retry, delay } => {
                tokio::time::sleep(delay).await;
                match self.stores.queue.enqueue(retry.clone()).await {
                    Ok(()) => self.clear_in_flight(&retry).await,
                    Err(e) => tracing::error!(
                        item_id = retry.item_id.as_str(),
                        "Failed to requeue job for retry: {}",
                        e
                    ),
                }
                Tick::Handled
            }
            ErrorAction::Fail { job: failed, message } => {
                if let Err(e) = self.processor.reject(&failed, &message).await {
                    tracing::error!(
                        item_id = failed.item_id.as_str(),
                        "Failed to persist ERROR status: {}",
                        e
                    );
                }
                self.clear_in_flight(&failed).await;
                Tick::Handled
            }
            ErrorAction::Backoff(delay) => {
                tokio::time::sleep(delay).await;
                Tick::Idle
            }
            ErrorAction::Recover => {
                match self.recovery.recover_stuck().await {
                    Ok(stuck) => {
                        for exhausted in &stuck.exhausted {
                            if let Err(e) =
                                self.processor.reject(exhausted, RETRIES_EXHAUSTED_MESSAGE).await
                            {
                                tracing::error!(
                                    item_id = exhausted.item_id.as_str(),
                                    "Failed to persist ERROR status: {}",
                                    e
                                );
                            }
                        }
                        tracing::info!(
                            worker_id = self.id.as_str(),
                            requeued = stuck.requeued,
                            exhausted = stuck.exhausted.len(),
                            "High severity recovery finished"
                        );
                    }
                    Err(e) => tracing::error!(
                        worker_id = self.id.as_str(),
                        "Failed to verify connections: {}",
                        e
                    ),
                }
                Tick::Handled
            }
            ErrorAction::Halt => {
                if let Err(e) = self.recovery.recover_critical(&error).await {
                    tracing::error!(worker_id = self.id.as_str(), "Critical recovery failed: {}", e);
                }
                Tick::Halt(error)
            }
        }
    }

    async fn clear_in_flight(&self, job: &Job) {
        if let Err(e) = self
            .stores
            .registry
            .clear_in_flight(&self.id, &job.item_id)
            .await
        {
            tracing::warn!(item_id = job.item_id.as_str(), "Failed to clear in-flight job: {}", e);
        }
    }
}

/// Keeps `count` workers running until shutdown.
pub struct WorkerSupervisor {
    shutdown: watch::Sender<bool>,
    slots: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerSupervisor {
    pub fn start(factory: WorkerFactory, count: usize, restart_delay: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        let slots = (0..count)
            .map(|slot| {
                let factory = factory.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(supervise_slot(slot, factory, shutdown, restart_delay))
            })
            .collect();
        tracing::info!(workers = count, "Worker supervisor started");
        Self {
            shutdown,
            slots: Mutex::new(slots),
        }
    }

    /// Stop intake on every worker and wait for them to deregister.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let slots = std::mem::take(&mut *self.slots.lock().await);
        for slot in slots {
            if let Err(e) = slot.await {
                tracing::warn!("Worker slot ended abnormally: {}", e);
            }
        }
        tracing::info!("Worker supervisor stopped");
    }
}

async fn supervise_slot(
    slot: usize,
    factory: WorkerFactory,
    mut shutdown: watch::Receiver<bool>,
    restart_delay: Duration,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let worker = factory.build();
        let worker_id = worker.id().clone();
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        match handle.await {
            Ok(WorkerExit::Shutdown) => break,
            Ok(WorkerExit::Halted(error)) => {
                tracing::warn!(slot, worker_id = worker_id.as_str(), "Worker halted ({}), restarting", error);
            }
            Err(e) => {
                tracing::error!(slot, worker_id = worker_id.as_str(), "Worker crashed ({}), restarting", e);
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(restart_delay) => {}
            _ = shutdown.changed() => break,
        }
    }
}
