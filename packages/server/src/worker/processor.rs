//! Validation of one queued item.
//!
//! For a job: mark the item PROCESSING, look its video up through the rate
//! limiter and the circuit breaker, apply the business rules and persist the
//! terminal status. Every write is keyed by item id and a terminal item is
//! never touched again, so redelivering a job is harmless.

use std::sync::Arc;

use crate::{
    domain::{
        Job, MetadataLookup, QueueItem, QueueItemRepository, QueueItemStatus, QueueUpdateKind,
        RoomRepository, VideoMetadata,
    },
    usecase::{room_lock::RoomLockRegistry, room_sync::RoomSync},
};

use super::{
    circuit_breaker::CircuitBreaker, error_handler::WorkerError, rate_limiter::RateLimiter,
};

pub const VIDEO_NOT_AVAILABLE: &str = "Video is not available";
pub const VIDEO_NOT_APPROPRIATE: &str = "Video content is not appropriate";
pub const VIDEO_TOO_LONG: &str = "Video exceeds maximum duration";

/// Rate-limit key for metadata lookups
const LOOKUP_RATE_KEY: &str = "metadata_lookup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Rejected(String),
    /// Item removed or already terminal
    Skipped,
}

/// Shared collaborators of every processor
#[derive(Clone)]
pub struct ProcessorContext {
    pub items: Arc<dyn QueueItemRepository>,
    pub rooms: Arc<dyn RoomRepository>,
    pub lookup: Arc<dyn MetadataLookup>,
    pub room_locks: Arc<RoomLockRegistry>,
    pub room_sync: Arc<RoomSync>,
    pub max_video_duration_seconds: u32,
}

pub struct QueueProcessor {
    context: ProcessorContext,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
}

impl QueueProcessor {
    pub fn new(
        context: ProcessorContext,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            context,
            limiter,
            breaker,
        }
    }

    pub async fn process(&self, job: &Job) -> Result<ProcessOutcome, WorkerError> {
        if !self.begin(job).await? {
            tracing::debug!(item_id = job.item_id.as_str(), "Skipping job for finished item");
            return Ok(ProcessOutcome::Skipped);
        }

        let metadata = match self.lookup(job).await {
            Ok(metadata) => metadata,
            Err(WorkerError::Validation(message)) => {
                self.reject(job, &message).await?;
                return Ok(ProcessOutcome::Rejected(message));
            }
            Err(e) => return Err(e),
        };

        if let Some(message) = self.check_rules(&metadata) {
            self.reject(job, message).await?;
            return Ok(ProcessOutcome::Rejected(message.to_string()));
        }

        self.complete(job, metadata).await
    }

    /// Persist a terminal ERROR (validation rejection or exhausted retries).
    pub async fn reject(&self, job: &Job, message: &str) -> Result<(), WorkerError> {
        let _guard = self.context.room_locks.lock(&job.room_id).await;
        let Some(mut item) = self.live_item(job).await? else {
            return Ok(());
        };
        if item.status == QueueItemStatus::Pending {
            item.begin_processing()?;
        }
        item.fail(message)?;
        self.context.items.update(&item).await?;
        tracing::info!(
            item_id = job.item_id.as_str(),
            room_id = job.room_id.as_str(),
            "Queue item rejected: {}",
            message
        );
        self.context
            .room_sync
            .publish_queue(&job.room_id, QueueUpdateKind::Update)
            .await?;
        self.context
            .room_sync
            .publish_error(&job.room_id, message, Some(&job.item_id))
            .await;
        Ok(())
    }

    /// PENDING/PROCESSING → PROCESSING and broadcast. `false` when there is
    /// nothing left to do for this job.
    async fn begin(&self, job: &Job) -> Result<bool, WorkerError> {
        let _guard = self.context.room_locks.lock(&job.room_id).await;
        let Some(mut item) = self.live_item(job).await? else {
            return Ok(false);
        };
        item.begin_processing()?;
        self.context.items.update(&item).await?;
        self.context
            .room_sync
            .publish_queue(&job.room_id, QueueUpdateKind::Update)
            .await?;
        Ok(true)
    }

    async fn lookup(&self, job: &Job) -> Result<VideoMetadata, WorkerError> {
        if self.limiter.is_limited(LOOKUP_RATE_KEY).await {
            return Err(WorkerError::Transient("metadata lookups rate limited".to_string()));
        }
        let lookup = self.context.lookup.clone();
        let video_id = job.video_id.clone();
        let metadata = self
            .breaker
            .execute(move || async move { lookup.lookup(&video_id).await })
            .await?;
        Ok(metadata)
    }

    fn check_rules(&self, metadata: &VideoMetadata) -> Option<&'static str> {
        if !metadata.is_available {
            Some(VIDEO_NOT_AVAILABLE)
        } else if !metadata.is_appropriate {
            Some(VIDEO_NOT_APPROPRIATE)
        } else if metadata.duration_seconds > self.context.max_video_duration_seconds {
            Some(VIDEO_TOO_LONG)
        } else {
            None
        }
    }

    async fn complete(
        &self,
        job: &Job,
        metadata: VideoMetadata,
    ) -> Result<ProcessOutcome, WorkerError> {
        let _guard = self.context.room_locks.lock(&job.room_id).await;
        let Some(mut item) = self.live_item(job).await? else {
            return Ok(ProcessOutcome::Skipped);
        };
        item.complete(metadata.title, metadata.duration_seconds)?;
        self.context.items.update(&item).await?;
        tracing::info!(
            item_id = job.item_id.as_str(),
            room_id = job.room_id.as_str(),
            "Queue item validated"
        );

        let room = self.context.rooms.get_room(&job.room_id).await?;
        if room.settings.auto_play {
            self.context.room_sync.start_next(&job.room_id).await?;
        }
        self.context
            .room_sync
            .publish_queue(&job.room_id, QueueUpdateKind::Update)
            .await?;
        Ok(ProcessOutcome::Completed)
    }

    /// The job's item if it still exists in the job's room and is not terminal.
    async fn live_item(&self, job: &Job) -> Result<Option<QueueItem>, WorkerError> {
        let item = self.context.items.get(&job.item_id).await?;
        Ok(item.filter(|item| item.room_id == job.room_id && !item.status.is_terminal()))
    }
}
