//! UseCase: 次の項目へ進む（スキップ / 再生終了）
//!
//! 再生中の項目を COMPLETED / PLAYED にして、position 順で次の
//! 再生可能な項目を PLAYING にする。

use std::sync::Arc;

use crate::domain::{
    ItemId, PlayerAction, QueueItem, QueueItemRepository, QueueUpdateKind, RoomId,
    RoomRepository, UserId,
};

use super::{
    error::QueueMutationError,
    membership::{active_membership, can_control_playback},
    room_lock::RoomLockRegistry,
    room_sync::RoomSync,
};

/// 進める理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceReason {
    /// ホスト（またはゲスト操作が許可されたルームの参加者）によるスキップ
    Skip,
    /// スクリーンが指定の項目の再生終了を報告した
    ItemEnded(ItemId),
}

/// キューを進めるユースケース
pub struct AdvanceQueueUseCase {
    rooms: Arc<dyn RoomRepository>,
    items: Arc<dyn QueueItemRepository>,
    locks: Arc<RoomLockRegistry>,
    sync: Arc<RoomSync>,
}

impl AdvanceQueueUseCase {
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

    /// 新しく再生を始めた項目を返す
    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        reason: AdvanceReason,
    ) -> Result<Option<QueueItem>, QueueMutationError> {
        let _guard = self.locks.lock(room_id).await;
        let (room, participant) = active_membership(self.rooms.as_ref(), room_id, user_id).await?;
        if reason == AdvanceReason::Skip && !can_control_playback(&room, &participant) {
            return Err(QueueMutationError::Forbidden("only the host can skip in this room"));
        }

        let current = self
            .items
            .list_by_room(room_id)
            .await?
            .into_iter()
            .find(QueueItem::is_playing);
        if let AdvanceReason::ItemEnded(ended) = &reason {
            // 再生中でない項目の終了報告（重複や遅延）は無視する
            if current.as_ref().map(|item| &item.id) != Some(ended) {
                tracing::debug!(
                    room_id = room_id.as_str(),
                    item_id = ended.as_str(),
                    "Ignoring item-ended for an item that is not playing"
                );
                return Ok(None);
            }
        }
        let stopped = match current {
            Some(mut current) => {
                current.force_complete();
                self.items.update(&current).await?;
                true
            }
            None => false,
        };

        let started = self.sync.start_next(room_id).await?;
        if started.is_none() && stopped {
            self.sync.relay_player(room_id, PlayerAction::stop()).await;
        }
        self.rooms.touch(room_id, self.sync.now()).await?;
        self.sync.publish_queue(room_id, QueueUpdateKind::Update).await?;

        tracing::info!(
            room_id = room_id.as_str(),
            reason = ?reason,
            next = started.as_ref().map(|item| item.id.as_str()).unwrap_or("-"),
            "Queue advanced"
        );
        Ok(started)
    }
}
