//! In-memory shared store.
//!
//! Implements the durable job queue, the worker registry, the rate-limit
//! windows and the recovery control keys behind one lock. Expiry is evaluated
//! lazily against the injected [`Clock`], so tests can expire heartbeats by
//! advancing a `ManualClock`.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use utage_shared::time::Clock;

use crate::domain::{
    ControlStore, ItemId, Job, JobQueue, RateLimitStore, StoreError, WorkerId, WorkerRecord,
    WorkerRegistry,
};

/// URL scheme accepted by [`InMemoryStore::connect`]
pub const MEMORY_STORE_SCHEME: &str = "memory://";

struct Expiring<T> {
    value: T,
    expires_at: i64,
}

impl<T> Expiring<T> {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct StoreState {
    jobs: VecDeque<Job>,
    workers: HashMap<WorkerId, Expiring<WorkerRecord>>,
    in_flight: HashMap<WorkerId, Vec<Job>>,
    windows: HashMap<String, Vec<i64>>,
    paused_until: Option<i64>,
    snapshots: HashMap<String, Expiring<serde_json::Value>>,
}

/// インメモリの共有ストア
pub struct InMemoryStore {
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
    job_arrived: Notify,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(StoreState::default()),
            job_arrived: Notify::new(),
        }
    }

    /// Open the store named by `url`. Only `memory://` is bundled.
    pub fn connect(url: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        if !url.starts_with(MEMORY_STORE_SCHEME) {
            return Err(StoreError::Unavailable(format!(
                "unsupported store url '{url}'"
            )));
        }
        Ok(Self::new(clock))
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl JobQueue for InMemoryStore {
    async fn enqueue(&self, job: Job) -> Result<(), StoreError> {
        self.state.lock().await.jobs.push_back(job);
        self.job_arrived.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.job_arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.state.lock().await.jobs.pop_front() {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn length(&self) -> Result<usize, StoreError> {
        Ok(self.state.lock().await.jobs.len())
    }
}

#[async_trait]
impl WorkerRegistry for InMemoryStore {
    async fn put_worker(&self, record: WorkerRecord, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.now().saturating_add(ttl_millis(ttl));
        let mut state = self.state.lock().await;
        state.workers.insert(
            record.id.clone(),
            Expiring {
                value: record,
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<WorkerRecord>, StoreError> {
        let now = self.now();
        let state = self.state.lock().await;
        Ok(state
            .workers
            .get(worker_id)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn remove_worker(&self, worker_id: &WorkerId) -> Result<(), StoreError> {
        self.state.lock().await.workers.remove(worker_id);
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        let now = self.now();
        let mut state = self.state.lock().await;
        state.workers.retain(|_, entry| entry.is_live(now));
        let mut records: Vec<WorkerRecord> =
            state.workers.values().map(|e| e.value.clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn track_in_flight(&self, worker_id: &WorkerId, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let jobs = state.in_flight.entry(worker_id.clone()).or_default();
        jobs.retain(|j| j.item_id != job.item_id);
        jobs.push(job.clone());
        Ok(())
    }

    async fn clear_in_flight(
        &self,
        worker_id: &WorkerId,
        item_id: &ItemId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(jobs) = state.in_flight.get_mut(worker_id) {
            jobs.retain(|j| &j.item_id != item_id);
            if jobs.is_empty() {
                state.in_flight.remove(worker_id);
            }
        }
        Ok(())
    }

    async fn take_in_flight(&self, worker_id: &WorkerId) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .in_flight
            .remove(worker_id)
            .unwrap_or_default())
    }

    async fn in_flight_owners(&self) -> Result<Vec<WorkerId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .in_flight
            .iter()
            .filter(|(_, jobs)| !jobs.is_empty())
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn prune_window(&self, key: &str, before_millis: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(entries) = state.windows.get_mut(key) {
            entries.retain(|at| *at >= before_millis);
        }
        Ok(())
    }

    async fn count_window(&self, key: &str) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state.windows.get(key).map_or(0, Vec::len))
    }

    async fn record_in_window(&self, key: &str, at_millis: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .windows
            .entry(key.to_string())
            .or_default()
            .push(at_millis);
        Ok(())
    }
}

#[async_trait]
impl ControlStore for InMemoryStore {
    async fn pause_intake(&self, ttl: Duration) -> Result<(), StoreError> {
        let until = self.now().saturating_add(ttl_millis(ttl));
        self.state.lock().await.paused_until = Some(until);
        Ok(())
    }

    async fn is_intake_paused(&self) -> Result<bool, StoreError> {
        let now = self.now();
        let state = self.state.lock().await;
        Ok(state.paused_until.is_some_and(|until| until > now))
    }

    async fn put_snapshot(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = self.now().saturating_add(ttl_millis(ttl));
        let mut state = self.state.lock().await;
        state
            .snapshots
            .insert(key.to_string(), Expiring { value, expires_at });
        Ok(())
    }

    async fn get_snapshot(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let now = self.now();
        let state = self.state.lock().await;
        Ok(state
            .snapshots
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn clear_transient(&self) -> Result<(), StoreError> {
        let now = self.now();
        let mut state = self.state.lock().await;
        state.windows.clear();
        state.workers.retain(|_, entry| entry.is_live(now));
        state.snapshots.retain(|_, entry| entry.is_live(now));
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
