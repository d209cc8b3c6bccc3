//! Worker metrics backed by a process-wide Prometheus registry.
//!
//! Every worker gets a [`WorkerMetrics`] handle whose series carry its
//! `worker` label. The coordinator publishes a [`WorkerMetricsSnapshot`] with
//! every heartbeat so the health endpoint can aggregate across processes, and
//! `GET /metrics` exports the registry in the Prometheus text format.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder, core::Collector,
};
use utage_shared::time::Clock;

use crate::domain::{WorkerId, WorkerMetricsSnapshot};

/// Rolling window used for the processing rate
const RATE_WINDOW_MILLIS: i64 = 60_000;

const WORKER_LABEL: &str = "worker";
const EVENT_LABEL: &str = "event";

/// Registry and metric families shared by all workers of the process
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    jobs_processed: IntCounterVec,
    jobs_failed: IntCounterVec,
    queue_length: IntGaugeVec,
    processing_rate: GaugeVec,
    error_rate: GaugeVec,
    events: IntCounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let jobs_processed = IntCounterVec::new(
            Opts::new("utage_jobs_processed_total", "Jobs processed successfully"),
            &[WORKER_LABEL],
        )?;
        let jobs_failed = IntCounterVec::new(
            Opts::new("utage_jobs_failed_total", "Job attempts that ended in an error"),
            &[WORKER_LABEL],
        )?;
        let queue_length = IntGaugeVec::new(
            Opts::new("utage_queue_length", "Job queue depth last observed by the worker"),
            &[WORKER_LABEL],
        )?;
        let processing_rate = GaugeVec::new(
            Opts::new(
                "utage_processing_rate",
                "Jobs per second completed over the last minute",
            ),
            &[WORKER_LABEL],
        )?;
        let error_rate = GaugeVec::new(
            Opts::new("utage_error_rate", "Failed share of job attempts since the last reset"),
            &[WORKER_LABEL],
        )?;
        let events = IntCounterVec::new(
            Opts::new(
                "utage_worker_events_total",
                "Named worker events (breaker transitions, rate limiting, recoveries)",
            ),
            &[WORKER_LABEL, EVENT_LABEL],
        )?;

        registry.register(Box::new(jobs_processed.clone()))?;
        registry.register(Box::new(jobs_failed.clone()))?;
        registry.register(Box::new(queue_length.clone()))?;
        registry.register(Box::new(processing_rate.clone()))?;
        registry.register(Box::new(error_rate.clone()))?;
        registry.register(Box::new(events.clone()))?;

        Ok(Self {
            registry,
            jobs_processed,
            jobs_failed,
            queue_length,
            processing_rate,
            error_rate,
            events,
        })
    }

    /// Metrics handle of one worker
    pub fn worker(&self, worker_id: &WorkerId, clock: Arc<dyn Clock>) -> WorkerMetrics {
        let worker = worker_id.as_str();
        WorkerMetrics {
            clock,
            worker: worker.to_string(),
            processed: self.jobs_processed.with_label_values(&[worker]),
            failed: self.jobs_failed.with_label_values(&[worker]),
            queue_length: self.queue_length.with_label_values(&[worker]),
            processing_rate: self.processing_rate.with_label_values(&[worker]),
            error_rate: self.error_rate.with_label_values(&[worker]),
            registry: self.clone(),
            baseline: Mutex::new(Baseline::default()),
            completions: Mutex::new(VecDeque::new()),
        }
    }

    /// Every registered family in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    fn worker_events(&self, worker: &str) -> BTreeMap<String, u64> {
        let mut events = BTreeMap::new();
        for family in self.events.collect() {
            for metric in family.get_metric() {
                let labels = metric.get_label();
                let owned = labels
                    .iter()
                    .any(|l| l.get_name() == WORKER_LABEL && l.get_value() == worker);
                let name = labels.iter().find(|l| l.get_name() == EVENT_LABEL);
                if let (true, Some(name)) = (owned, name) {
                    events.insert(
                        name.get_value().to_string(),
                        metric.get_counter().get_value() as u64,
                    );
                }
            }
        }
        events
    }

    /// Drop every series of a worker that has gone away
    fn forget_worker(&self, worker: &str) {
        let _ = self.jobs_processed.remove_label_values(&[worker]);
        let _ = self.jobs_failed.remove_label_values(&[worker]);
        let _ = self.queue_length.remove_label_values(&[worker]);
        let _ = self.processing_rate.remove_label_values(&[worker]);
        let _ = self.error_rate.remove_label_values(&[worker]);
        for name in self.worker_events(worker).keys() {
            let _ = self.events.remove_label_values(&[worker, name.as_str()]);
        }
    }
}

/// Counter values at the last [`WorkerMetrics::reset`]
#[derive(Debug, Default, Clone, Copy)]
struct Baseline {
    processed: u64,
    failed: u64,
}

pub struct WorkerMetrics {
    clock: Arc<dyn Clock>,
    worker: String,
    processed: IntCounter,
    failed: IntCounter,
    queue_length: IntGauge,
    processing_rate: Gauge,
    error_rate: Gauge,
    registry: MetricsRegistry,
    baseline: Mutex<Baseline>,
    /// Completion timestamps inside the rolling window
    completions: Mutex<VecDeque<i64>>,
}

impl WorkerMetrics {
    /// Handle on a private registry
    #[cfg(test)]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let worker_id = WorkerId::new("worker:test".to_string()).expect("valid worker id");
        MetricsRegistry::new()
            .expect("metric families register")
            .worker(&worker_id, clock)
    }

    pub fn record_success(&self) {
        self.processed.inc();
        let now = self.clock.now_millis();
        let mut completions = self.completions.lock().unwrap_or_else(|e| e.into_inner());
        completions.push_back(now);
        Self::evict(&mut completions, now);
    }

    pub fn record_failure(&self) {
        self.failed.inc();
    }

    pub fn update_queue_length(&self, length: usize) {
        self.queue_length
            .set(i64::try_from(length).unwrap_or(i64::MAX));
    }

    pub fn record_event(&self, name: &str) {
        self.registry
            .events
            .with_label_values(&[self.worker.as_str(), name])
            .inc();
    }

    pub fn event_count(&self, name: &str) -> u64 {
        self.registry
            .events
            .with_label_values(&[self.worker.as_str(), name])
            .get()
    }

    /// Jobs per second over the last minute
    pub fn processing_rate(&self) -> f64 {
        let now = self.clock.now_millis();
        let mut completions = self.completions.lock().unwrap_or_else(|e| e.into_inner());
        Self::evict(&mut completions, now);
        let rate = completions.len() as f64 / (RATE_WINDOW_MILLIS as f64 / 1000.0);
        self.processing_rate.set(rate);
        rate
    }

    pub fn error_rate(&self) -> f64 {
        let (processed, failed) = self.since_reset();
        let attempted = processed + failed;
        let rate = if attempted == 0 {
            0.0
        } else {
            failed as f64 / attempted as f64
        };
        self.error_rate.set(rate);
        rate
    }

    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            queue_length: usize::try_from(self.queue_length.get()).unwrap_or(0),
            processing_rate: self.processing_rate(),
            error_rate: self.error_rate(),
        }
    }

    /// All counters and events as JSON (diagnostic snapshots)
    pub fn to_json(&self) -> serde_json::Value {
        let (processed, failed) = self.since_reset();
        serde_json::json!({
            "processed": processed,
            "failed": failed,
            "snapshot": self.snapshot(),
            "events": self.registry.worker_events(&self.worker),
        })
    }

    /// Restart the error and processing rates; exported totals and events keep counting.
    pub fn reset(&self) {
        *self.baseline.lock().unwrap_or_else(|e| e.into_inner()) = Baseline {
            processed: self.processed.get(),
            failed: self.failed.get(),
        };
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn since_reset(&self) -> (u64, u64) {
        let baseline = *self.baseline.lock().unwrap_or_else(|e| e.into_inner());
        (
            self.processed.get().saturating_sub(baseline.processed),
            self.failed.get().saturating_sub(baseline.failed),
        )
    }

    fn evict(completions: &mut VecDeque<i64>, now: i64) {
        while completions
            .front()
            .is_some_and(|at| now - *at >= RATE_WINDOW_MILLIS)
        {
            completions.pop_front();
        }
    }
}

impl Drop for WorkerMetrics {
    fn drop(&mut self) {
        self.registry.forget_worker(&self.worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utage_shared::time::ManualClock;

    #[test]
    fn test_processing_rate_uses_rolling_window() {
        // テスト項目: 処理レートは直近 60 秒の完了数から算出される
        // given (前提条件):
        let clock = Arc::new(ManualClock::new(0));
        let metrics = WorkerMetrics::new(clock.clone());
        for _ in 0..6 {
            metrics.record_success();
        }
        assert!((metrics.processing_rate() - 0.1).abs() < f64::EPSILON);

        // when (操作):
        clock.advance(60_000);

        // then (期待する結果):
        assert_eq!(metrics.processing_rate(), 0.0);
    }

    #[test]
    fn test_error_rate() {
        // テスト項目: エラー率は失敗数 / 試行数
        // given (前提条件):
        let metrics = WorkerMetrics::new(Arc::new(ManualClock::new(0)));

        // when (操作):
        metrics.record_success();
        metrics.record_success();
        metrics.record_success();
        metrics.record_failure();

        // then (期待する結果):
        assert!((metrics.error_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_keeps_events() {
        // テスト項目: reset はカウンタを戻すがイベント履歴は残す
        // given (前提条件):
        let metrics = WorkerMetrics::new(Arc::new(ManualClock::new(0)));
        metrics.record_failure();
        metrics.record_event("recovery_initiated");

        // when (操作):
        metrics.reset();

        // then (期待する結果):
        assert_eq!(metrics.error_rate(), 0.0);
        assert_eq!(metrics.event_count("recovery_initiated"), 1);
    }

    #[test]
    fn test_registry_exports_worker_series() {
        // テスト項目: ワーカーのカウンタとイベントが worker ラベル付きで Prometheus 形式に出力される
        // given (前提条件):
        let registry = MetricsRegistry::new().unwrap();
        let worker_id = WorkerId::new("worker:1".to_string()).unwrap();
        let metrics = registry.worker(&worker_id, Arc::new(ManualClock::new(0)));

        // when (操作):
        metrics.record_success();
        metrics.record_failure();
        metrics.update_queue_length(7);
        metrics.record_event("circuit_breaker_opened");
        let text = registry.encode().unwrap();

        // then (期待する結果):
        assert!(text.contains("utage_jobs_processed_total{worker=\"worker:1\"} 1"));
        assert!(text.contains("utage_jobs_failed_total{worker=\"worker:1\"} 1"));
        assert!(text.contains("utage_queue_length{worker=\"worker:1\"} 7"));
        assert!(text.contains("event=\"circuit_breaker_opened\""));
    }

    #[test]
    fn test_reset_restarts_rates_but_not_exported_totals() {
        // テスト項目: reset 後もエクスポートされる累計値は減らない
        // given (前提条件):
        let registry = MetricsRegistry::new().unwrap();
        let worker_id = WorkerId::new("worker:1".to_string()).unwrap();
        let metrics = registry.worker(&worker_id, Arc::new(ManualClock::new(0)));
        metrics.record_failure();
        metrics.record_failure();

        // when (操作):
        metrics.reset();
        metrics.record_success();

        // then (期待する結果):
        assert_eq!(metrics.error_rate(), 0.0);
        assert_eq!(metrics.to_json()["failed"], 0);
        assert!(registry
            .encode()
            .unwrap()
            .contains("utage_jobs_failed_total{worker=\"worker:1\"} 2"));
    }

    #[test]
    fn test_dropped_worker_series_are_removed() {
        // テスト項目: ワーカーのハンドルが破棄されるとそのシリーズは出力されなくなる
        // given (前提条件):
        let registry = MetricsRegistry::new().unwrap();
        let worker_id = WorkerId::new("worker:gone".to_string()).unwrap();
        let metrics = registry.worker(&worker_id, Arc::new(ManualClock::new(0)));
        metrics.record_success();
        metrics.record_event("alert_sent");

        // when (操作):
        drop(metrics);

        // then (期待する結果):
        assert!(!registry.encode().unwrap().contains("worker:gone"));
    }
}
