//! UseCase: キューからの削除
//!
//! ホストか、その項目を追加したユーザーだけが削除できる。
//! 再生中の項目を削除したときは次の項目の再生を始める。

use std::sync::Arc;

use crate::domain::{
    ItemId, PlayerAction, QueueItem, QueueItemRepository, QueueUpdateKind, RoomId,
    RoomRepository, UserId,
};

use super::{
    error::QueueMutationError, membership::active_membership, room_lock::RoomLockRegistry,
    room_sync::RoomSync,
};

/// キュー削除のユースケース
pub struct RemoveQueueItemUseCase {
    rooms: Arc<dyn RoomRepository>,
    items: Arc<dyn QueueItemRepository>,
    locks: Arc<RoomLockRegistry>,
    sync: Arc<RoomSync>,
}

impl RemoveQueueItemUseCase {
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

    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<QueueItem, QueueMutationError> {
        let _guard = self.locks.lock(room_id).await;
        let (_, participant) = active_membership(self.rooms.as_ref(), room_id, user_id).await?;

        let item = self
            .items
            .get(item_id)
            .await?
            .filter(|item| &item.room_id == room_id)
            .ok_or_else(|| QueueMutationError::ItemNotFound(item_id.as_str().to_string()))?;
        if !participant.is_host() && &item.added_by_id != user_id {
            return Err(QueueMutationError::Forbidden(
                "only the host or the user who added the item can remove it",
            ));
        }

        let removed = self.items.remove(item_id).await?;
        self.rooms.touch(room_id, self.sync.now()).await?;
        if removed.is_playing() && self.sync.start_next(room_id).await?.is_none() {
            self.sync
                .relay_player(room_id, PlayerAction::stop())
                .await;
        }
        self.sync.publish_queue(room_id, QueueUpdateKind::Remove).await?;

        tracing::info!(
            room_id = room_id.as_str(),
            item_id = item_id.as_str(),
            "Queue item removed by '{}'",
            user_id.as_str()
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{PlaybackStatus, QueueItemStatus, RoomSettings},
        usecase::{
            AddQueueItemUseCase,
            testing::{RoomFixture, next_frame, room_fixture},
        },
    };

    fn create_usecase(fixture: &RoomFixture) -> RemoveQueueItemUseCase {
        RemoveQueueItemUseCase::new(
            fixture.rooms.clone(),
            fixture.items.clone(),
            fixture.locks.clone(),
            fixture.sync.clone(),
        )
    }

    #[tokio::test]
    async fn test_host_removes_item_and_positions_compact() {
        // テスト項目: 削除後も position が 0..n-1 に詰められ、削除が配信される
        // given (前提条件):
        let fixture = room_fixture(RoomSettings::default()).await;
        fixture.add_item("a", QueueItemStatus::Completed, PlaybackStatus::Queued).await;
        let b = fixture.add_item("b", QueueItemStatus::Completed, PlaybackStatus::Queued).await;
        fixture.add_item("c", QueueItemStatus::Completed, PlaybackStatus::Queued).await;
        let mut rx = fixture.subscribe().await;

        // when (操作):
        create_usecase(&fixture)
            .execute(&fixture.room_id, &fixture.host, &b.id)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(fixture.video_order().await, vec!["a", "c"]);
        let positions: Vec<usize> = fixture.queue().await.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1]);
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["data"]["type"], "remove");
        assert_eq!(frame["data"]["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_viewer_cannot_remove_others_item() {
        // テスト項目: VIEWER は他人が追加した項目を削除できない
        // given (前提条件):
        let fixture = room_fixture(RoomSettings::default()).await;
        let a = fixture.add_item("a", QueueItemStatus::Pending, PlaybackStatus::Queued).await;

        // when (操作):
        let result = create_usecase(&fixture)
            .execute(&fixture.room_id, &fixture.viewer, &a.id)
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(QueueMutationError::Forbidden(_))));
        assert_eq!(fixture.video_order().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_removing_playing_item_starts_next() {
        // テスト項目: 再生中の項目を削除すると次の再生可能な項目が PLAYING になる
        // given (前提条件):
        let fixture = room_fixture(RoomSettings::default()).await;
        let a = fixture.add_item("a", QueueItemStatus::Completed, PlaybackStatus::Playing).await;
        fixture.add_item("b", QueueItemStatus::Completed, PlaybackStatus::Queued).await;

        // when (操作):
        create_usecase(&fixture)
            .execute(&fixture.room_id, &fixture.host, &a.id)
            .await
            .unwrap();

        // then (期待する結果):
        let queue = fixture.queue().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].playback, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_remove_unknown_item() {
        // テスト項目: 存在しない項目は ItemNotFound
        // given (前提条件):
        let fixture = room_fixture(RoomSettings::default()).await;

        // when (操作):
        let result = create_usecase(&fixture)
            .execute(&fixture.room_id, &fixture.host, &ItemId::generate())
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(QueueMutationError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_add_then_remove_restores_queue() {
        // テスト項目: 追加した項目を削除するとキューは元の id と position に戻り、
        //             どちらの操作でもキュー全体が配信される
        // given (前提条件):
        let fixture = room_fixture(RoomSettings::default()).await;
        fixture.add_item("a", QueueItemStatus::Completed, PlaybackStatus::Queued).await;
        fixture.add_item("b", QueueItemStatus::Pending, PlaybackStatus::Queued).await;
        let before: Vec<(ItemId, usize)> = fixture
            .queue()
            .await
            .into_iter()
            .map(|item| (item.id, item.position))
            .collect();
        let add = AddQueueItemUseCase::new(
            fixture.rooms.clone(),
            fixture.items.clone(),
            fixture.store.clone(),
            fixture.locks.clone(),
            fixture.sync.clone(),
        );
        let mut rx = fixture.subscribe().await;

        // when (操作):
        let added = add
            .execute(&fixture.room_id, &fixture.viewer, "c".to_string(), None)
            .await
            .unwrap();
        create_usecase(&fixture)
            .execute(&fixture.room_id, &fixture.viewer, &added.id)
            .await
            .unwrap();

        // then (期待する結果):
        let after: Vec<(ItemId, usize)> = fixture
            .queue()
            .await
            .into_iter()
            .map(|item| (item.id, item.position))
            .collect();
        assert_eq!(after, before);

        let added_frame = next_frame(&mut rx).await;
        assert_eq!(added_frame["event"], "queue-updated");
        assert_eq!(added_frame["data"]["type"], "add");
        assert_eq!(added_frame["data"]["items"].as_array().unwrap().len(), 3);
        assert_eq!(added_frame["data"]["items"][2]["id"], added.id.as_str());
        let removed_frame = next_frame(&mut rx).await;
        assert_eq!(removed_frame["data"]["type"], "remove");
        let ids: Vec<&str> = removed_frame["data"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["id"].as_str().unwrap())
            .collect();
        let expected: Vec<&str> = before.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, expected);
        let positions: Vec<u64> = removed_frame["data"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["position"].as_u64().unwrap())
            .collect();
        assert_eq!(positions, vec![0, 1]);
    }
}
