//! UseCase: キューへの追加
//!
//! 項目を PENDING で末尾に追加し、検証ジョブを投入してから
//! `queue-updated (add)` を配信する。

use std::sync::Arc;

use crate::domain::{
    Job, JobQueue, QueueItem, QueueItemRepository, QueueUpdateKind, RoomId, RoomRepository,
    UserId, VideoId,
};

use super::{
    error::QueueMutationError, membership::active_membership, room_lock::RoomLockRegistry,
    room_sync::RoomSync,
};

/// キュー追加のユースケース
pub struct AddQueueItemUseCase {
    rooms: Arc<dyn RoomRepository>,
    items: Arc<dyn QueueItemRepository>,
    queue: Arc<dyn JobQueue>,
    locks: Arc<RoomLockRegistry>,
    sync: Arc<RoomSync>,
}

impl AddQueueItemUseCase {
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        items: Arc<dyn QueueItemRepository>,
        queue: Arc<dyn JobQueue>,
        locks: Arc<RoomLockRegistry>,
        sync: Arc<RoomSync>,
    ) -> Self {
        Self {
            rooms,
            items,
            queue,
            locks,
            sync,
        }
    }

    /// ルームの参加者なら誰でも追加できる
    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        video_id: String,
        title: Option<String>,
    ) -> Result<QueueItem, QueueMutationError> {
        let video_id = VideoId::new(video_id)?;
        let _guard = self.locks.lock(room_id).await;
        active_membership(self.rooms.as_ref(), room_id, user_id).await?;

        let now = self.sync.now();
        let title = title.filter(|title| !title.trim().is_empty());
        let item = self
            .items
            .append(QueueItem::new(room_id.clone(), video_id, title, user_id.clone(), now))
            .await?;
        self.rooms.touch(room_id, now).await?;

        if let Err(e) = self.queue.enqueue(Job::for_item(&item)).await {
            tracing::error!(
                room_id = room_id.as_str(),
                item_id = item.id.as_str(),
                "Failed to enqueue validation job: {}",
                e
            );
            self.items.remove(&item.id).await?;
            return Err(e.into());
        }

        self.sync.publish_queue(room_id, QueueUpdateKind::Add).await?;
        tracing::info!(
            room_id = room_id.as_str(),
            item_id = item.id.as_str(),
            "Video '{}' queued by '{}'",
            item.video_id.as_str(),
            user_id.as_str()
        );
        Ok(item)
    }
}
