//! UseCase: キューの並べ替え（ホストのみ）
//!
//! `source_index` の項目を取り出して `dest_index` に挿入し、
//! 全項目の position を 0..n-1 に書き直す。

use std::sync::Arc;

use crate::domain::{QueueItem, QueueItemRepository, QueueUpdateKind, RoomId, RoomRepository, UserId};

use super::{
    error::QueueMutationError, membership::active_membership, room_lock::RoomLockRegistry,
    room_sync::RoomSync,
};

/// 並べ替えのユースケース
pub struct ReorderQueueUseCase {
    rooms: Arc<dyn RoomRepository>,
    items: Arc<dyn QueueItemRepository>,
    locks: Arc<RoomLockRegistry>,
    sync: Arc<RoomSync>,
}

impl ReorderQueueUseCase {
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        items: Arc<dyn QueueItemRepository>,
        locks: Arc<RoomLockRegistry>,
        sync: Arc<RoomSync>,
    ) -> Self {
        Self {
            rooms,
            items,
            locks,
            sync,
        }
    }

    /// 並べ替え後のキューを返す
    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        source_index: usize,
        dest_index: usize,
    ) -> Result<Vec<QueueItem>, QueueMutationError> {
        let _guard = self.locks.lock(room_id).await;
        let (_, participant) = active_membership(self.rooms.as_ref(), room_id, user_id).await?;
        if !participant.is_host() {
            return Err(QueueMutationError::Forbidden("only the host can reorder the queue"));
        }

        let mut ordered: Vec<_> = self
            .items
            .list_by_room(room_id)
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect();
        let len = ordered.len();
        for index in [source_index, dest_index] {
            if index >= len {
                return Err(QueueMutationError::InvalidIndex { index, len });
            }
        }

        let moved = ordered.remove(source_index);
        ordered.insert(dest_index, moved);
        self.items.rewrite_positions(room_id, &ordered).await?;
        self.rooms.touch(room_id, self.sync.now()).await?;
        let items = self.sync.publish_queue(room_id, QueueUpdateKind::Reorder).await?;

        tracing::info!(
            room_id = room_id.as_str(),
            source_index,
            dest_index,
            "Queue reordered"
        );
        Ok(items)
    }
}
