//! UseCase: ワーカー群のヘルス集計
//!
//! 生存しているワーカーレコードのメトリクスを集計し、キューの滞留が
//! しきい値を超えたか、共有ストアに到達できないときは unhealthy とする。

use std::{sync::Arc, time::Duration};

use utage_shared::time::Clock;

use crate::domain::{ControlStore, JobQueue, StoreError, Timestamp, WorkerRegistry};

/// 集計結果
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub healthy: bool,
    pub queue_length: usize,
    pub active_workers: usize,
    /// 生存ワーカーのエラー率の平均
    pub error_rate: f64,
    /// 生存ワーカーの処理レート（件/秒）の合計
    pub processing_rate: f64,
    pub reason: Option<String>,
}

impl HealthReport {
    fn unreachable(error: &StoreError) -> Self {
        Self {
            healthy: false,
            queue_length: 0,
            active_workers: 0,
            error_rate: 0.0,
            processing_rate: 0.0,
            reason: Some(format!("store unreachable: {}", error)),
        }
    }
}

/// ヘルス集計のユースケース
pub struct GetHealthUseCase {
    queue: Arc<dyn JobQueue>,
    registry: Arc<dyn WorkerRegistry>,
    control: Arc<dyn ControlStore>,
    clock: Arc<dyn Clock>,
    heartbeat_timeout: Duration,
    backlog_threshold: usize,
}

impl GetHealthUseCase {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<dyn WorkerRegistry>,
        control: Arc<dyn ControlStore>,
        clock: Arc<dyn Clock>,
        heartbeat_timeout: Duration,
        backlog_threshold: usize,
    ) -> Self {
        Self {
            queue,
            registry,
            control,
            clock,
            heartbeat_timeout,
            backlog_threshold,
        }
    }

    pub async fn execute(&self) -> HealthReport {
        match self.collect().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Health check failed: {}", e);
                HealthReport::unreachable(&e)
            }
        }
    }

    async fn collect(&self) -> Result<HealthReport, StoreError> {
        self.control.ping().await?;
        let queue_length = self.queue.length().await?;

        let now = Timestamp::new(self.clock.now_millis());
        let timeout = i64::try_from(self.heartbeat_timeout.as_millis()).unwrap_or(i64::MAX);
        let live: Vec<_> = self
            .registry
            .list_workers()
            .await?
            .into_iter()
            .filter(|record| record.is_live(now, timeout))
            .collect();

        let active_workers = live.len();
        let processing_rate = live.iter().map(|r| r.metrics.processing_rate).sum::<f64>();
        let error_rate = if live.is_empty() {
            0.0
        } else {
            live.iter().map(|r| r.metrics.error_rate).sum::<f64>() / active_workers as f64
        };

        let backlogged = queue_length > self.backlog_threshold;
        Ok(HealthReport {
            healthy: !backlogged,
            queue_length,
            active_workers,
            error_rate,
            processing_rate,
            reason: backlogged.then(|| {
                format!(
                    "queue backlog {} exceeds threshold {}",
                    queue_length, self.backlog_threshold
                )
            }),
        })
    }
}
