//! UseCase: ルームを閉じる（ホストのみ）

use std::sync::Arc;

use crate::domain::{QueueItemRepository, RoomId, RoomRepository, UserId};

use super::{error::CloseRoomError, room_lock::RoomLockRegistry, room_sync::RoomSync};

/// ルームを閉じるユースケース
pub struct CloseRoomUseCase {
    rooms: Arc<dyn RoomRepository>,
    items: Arc<dyn QueueItemRepository>,
    locks: Arc<RoomLockRegistry>,
    sync: Arc<RoomSync>,
}

impl CloseRoomUseCase {
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

    /// `room-closed` を配信し、ルームを非アクティブにしてキューを削除する
    pub async fn execute(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), CloseRoomError> {
        let _guard = self.locks.lock(room_id).await;
        let room = self.rooms.get_room(room_id).await?;
        if &room.host_id != user_id {
            return Err(CloseRoomError::NotHost);
        }

        self.sync.broadcaster().close(room_id).await;
        self.rooms.set_active(room_id, false).await?;
        let removed = self.items.remove_by_room(room_id).await?;
        tracing::info!(room_id = room_id.as_str(), removed, "Room closed by host");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            ConnectionId, Participant, QueueItem, Role, Room, RoomBroadcaster,
            RoomSettings, Timestamp, VideoId,
        },
        infrastructure::{
            broadcaster::WebSocketRoomBroadcaster,
            repository::{InMemoryQueueItemRepository, InMemoryRoomRepository},
        },
    };
    use tokio::sync::mpsc;
    use utage_shared::time::FixedClock;

    struct Fixture {
        usecase: CloseRoomUseCase,
        rooms: Arc<InMemoryRoomRepository>,
        items: Arc<InMemoryQueueItemRepository>,
        broadcaster: Arc<WebSocketRoomBroadcaster>,
        room_id: RoomId,
        host: UserId,
    }

    async fn create_fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(0));
        let rooms = Arc::new(InMemoryRoomRepository::new());
        let items = Arc::new(InMemoryQueueItemRepository::new());
        let broadcaster = Arc::new(WebSocketRoomBroadcaster::new(clock.clone()));
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let host = UserId::new("host".to_string()).unwrap();
        rooms
            .create_room(
                Room::new(room_id.clone(), "Room".to_string(), host.clone(), RoomSettings::default(), Timestamp::new(0)),
                Participant::new(room_id.clone(), host.clone(), Role::Host, Timestamp::new(0)),
            )
            .await
            .unwrap();
        items
            .append(QueueItem::new(
                room_id.clone(),
                VideoId::new("abc".to_string()).unwrap(),
                None,
                host.clone(),
                Timestamp::new(0),
            ))
            .await
            .unwrap();
        let sync = Arc::new(RoomSync::new(items.clone(), broadcaster.clone(), clock));
        let usecase = CloseRoomUseCase::new(
            rooms.clone(),
            items.clone(),
            Arc::new(RoomLockRegistry::new()),
            sync,
        );
        Fixture {
            usecase,
            rooms,
            items,
            broadcaster,
            room_id,
            host,
        }
    }

    #[tokio::test]
    async fn test_host_closes_room() {
        // テスト項目: ホストが閉じると room-closed が届き、ルームは非アクティブになりキューが消える
        // given (前提条件):
        let fixture = create_fixture().await;
        let connection_id = ConnectionId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();
        fixture
            .broadcaster
            .register_connection(connection_id.clone(), tx)
            .await;
        fixture
            .broadcaster
            .join(&fixture.room_id, &connection_id, vec![])
            .await
            .unwrap();
        rx.recv().await.unwrap();

        // when (操作):
        fixture
            .usecase
            .execute(&fixture.room_id, &fixture.host)
            .await
            .unwrap();

        // then (期待する結果):
        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"], "room-closed");
        assert_eq!(frame["data"]["roomId"], "room-1");
        assert!(!fixture.rooms.get_room(&fixture.room_id).await.unwrap().is_active);
        assert!(fixture.items.list_by_room(&fixture.room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_viewer_cannot_close_room() {
        // テスト項目: ホスト以外は閉じられない
        // given (前提条件):
        let fixture = create_fixture().await;

        // when (操作):
        let result = fixture
            .usecase
            .execute(&fixture.room_id, &UserId::new("bob".to_string()).unwrap())
            .await;

        // then (期待する結果):
        assert_eq!(result, Err(CloseRoomError::NotHost));
        assert!(fixture.rooms.get_room(&fixture.room_id).await.unwrap().is_active);
    }
}
