//! Room state publication shared by the use cases and the queue workers.
//!
//! Callers hold the room's mutation lock while using these helpers so the
//! published queue is the state right after their own mutation.

use std::sync::Arc;

use utage_shared::time::Clock;

use crate::domain::{
    ItemId, PlaybackStatus, PlayerAction, QueueItem, QueueItemRepository, QueueUpdateKind,
    RepositoryError, RoomBroadcaster, RoomEvent, RoomId, Timestamp,
};

pub struct RoomSync {
    items: Arc<dyn QueueItemRepository>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    clock: Arc<dyn Clock>,
}

impl RoomSync {
    pub fn new(
        items: Arc<dyn QueueItemRepository>,
        broadcaster: Arc<dyn RoomBroadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            items,
            broadcaster,
            clock,
        }
    }

    pub fn broadcaster(&self) -> &Arc<dyn RoomBroadcaster> {
        &self.broadcaster
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// 現在のキュー全体を `queue-updated` として配信する
    pub async fn publish_queue(
        &self,
        room_id: &RoomId,
        kind: QueueUpdateKind,
    ) -> Result<Vec<QueueItem>, RepositoryError> {
        let items = self.items.list_by_room(room_id).await?;
        let event = RoomEvent::QueueUpdated {
            kind,
            items: items.clone(),
        };
        if let Err(e) = self.broadcaster.broadcast(room_id, &event).await {
            tracing::warn!(room_id = room_id.as_str(), "Failed to broadcast queue-updated: {}", e);
        }
        Ok(items)
    }

    /// ルームに `error` を配信する
    pub async fn publish_error(&self, room_id: &RoomId, message: &str, item_id: Option<&ItemId>) {
        let event = RoomEvent::Error {
            message: message.to_string(),
            item_id: item_id.cloned(),
        };
        if let Err(e) = self.broadcaster.broadcast(room_id, &event).await {
            tracing::warn!(room_id = room_id.as_str(), "Failed to broadcast error: {}", e);
        }
    }

    /// 再生中の項目が無ければ、position 順で最初の再生可能な項目を PLAYING にする
    ///
    /// Returns the item that started.
    pub async fn start_next(&self, room_id: &RoomId) -> Result<Option<QueueItem>, RepositoryError> {
        let items = self.items.list_by_room(room_id).await?;
        if items.iter().any(QueueItem::is_playing) {
            return Ok(None);
        }
        let Some(mut next) = items.into_iter().find(QueueItem::is_playable) else {
            return Ok(None);
        };
        if next.set_playback(PlaybackStatus::Playing).is_err() {
            return Ok(None);
        }
        self.items.update(&next).await?;
        tracing::info!(
            room_id = room_id.as_str(),
            item_id = next.id.as_str(),
            "Started playback of next item"
        );
        self.relay_player(room_id, PlayerAction::play_from_start()).await;
        Ok(Some(next))
    }

    /// 再生状態を更新して `player-command` を中継する
    pub async fn relay_player(&self, room_id: &RoomId, action: PlayerAction) {
        if let Err(e) = self.broadcaster.apply_player_command(room_id, action).await {
            tracing::warn!(room_id = room_id.as_str(), "Failed to relay player-command: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{QueueItemStatus, RoomSettings},
        usecase::testing::{next_frame, room_fixture},
    };

    #[tokio::test]
    async fn test_start_next_skips_unvalidated_items() {
        // テスト項目: 検証済み (COMPLETED) の先頭項目だけが再生対象になる
        // given (前提条件):
        let fixture = room_fixture(RoomSettings::default()).await;
        fixture.add_item("a", QueueItemStatus::Processing, PlaybackStatus::Queued).await;
        let b = fixture.add_item("b", QueueItemStatus::Completed, PlaybackStatus::Queued).await;
        let mut rx = fixture.subscribe().await;

        // when (操作):
        let started = fixture.sync.start_next(&fixture.room_id).await.unwrap();

        // then (期待する結果):
        assert_eq!(started.map(|item| item.id), Some(b.id));
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["event"], "player-command");
        assert_eq!(frame["data"]["time"], 0.0);
    }

    #[tokio::test]
    async fn test_start_next_keeps_single_playing_item() {
        // テスト項目: 既に再生中の項目があれば何もしない
        // given (前提条件):
        let fixture = room_fixture(RoomSettings::default()).await;
        fixture.add_item("a", QueueItemStatus::Completed, PlaybackStatus::Playing).await;
        fixture.add_item("b", QueueItemStatus::Completed, PlaybackStatus::Queued).await;

        // when (操作):
        let started = fixture.sync.start_next(&fixture.room_id).await.unwrap();

        // then (期待する結果):
        assert_eq!(started, None);
        let playing = fixture.queue().await.iter().filter(|item| item.is_playing()).count();
        assert_eq!(playing, 1);
    }
}
