//! UseCase: ルーム退出
//!
//! 参加者がいなくなったルームは非アクティブになり、チャンネルも閉じる。

use std::sync::Arc;

use crate::domain::{ConnectionId, RepositoryError, RoomId, RoomRepository, UserId};

use super::{error::JoinRoomError, room_lock::RoomLockRegistry, room_sync::RoomSync};

/// 退出の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// まだ参加者が残っている
    Left { remaining: usize },
    /// 最後の参加者が退出し、ルームが非アクティブになった
    RoomDeactivated,
}

/// ルーム退出のユースケース
pub struct LeaveRoomUseCase {
    rooms: Arc<dyn RoomRepository>,
    locks: Arc<RoomLockRegistry>,
    sync: Arc<RoomSync>,
}

impl LeaveRoomUseCase {
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        locks: Arc<RoomLockRegistry>,
        sync: Arc<RoomSync>,
    ) -> Self {
        Self { rooms, locks, sync }
    }

    /// 参加者を削除し、接続があればルームのチャンネルから外す
    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        connection_id: Option<&ConnectionId>,
    ) -> Result<LeaveOutcome, JoinRoomError> {
        let _guard = self.locks.lock(room_id).await;

        if let Some(connection_id) = connection_id {
            self.sync.broadcaster().leave(room_id, connection_id).await;
        }
        match self.rooms.remove_participant(room_id, user_id).await {
            Ok(()) => {}
            Err(RepositoryError::ParticipantNotFound { .. }) => {
                return Err(JoinRoomError::NotParticipant(room_id.as_str().to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let remaining = self.rooms.count_participants(room_id).await?;
        if remaining > 0 {
            self.rooms.touch(room_id, self.sync.now()).await?;
            return Ok(LeaveOutcome::Left { remaining });
        }

        self.rooms.set_active(room_id, false).await?;
        self.sync.broadcaster().close(room_id).await;
        tracing::info!(room_id = room_id.as_str(), "Last participant left; room deactivated");
        Ok(LeaveOutcome::RoomDeactivated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Participant, Role, Room, RoomSettings, Timestamp},
        infrastructure::{
            broadcaster::WebSocketRoomBroadcaster,
            repository::{InMemoryQueueItemRepository, InMemoryRoomRepository},
        },
    };
    use utage_shared::time::FixedClock;

    async fn create_fixture() -> (LeaveRoomUseCase, Arc<InMemoryRoomRepository>, RoomId) {
        let clock = Arc::new(FixedClock::new(0));
        let rooms = Arc::new(InMemoryRoomRepository::new());
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let host = UserId::new("host".to_string()).unwrap();
        rooms
            .create_room(
                Room::new(room_id.clone(), "Room".to_string(), host.clone(), RoomSettings::default(), Timestamp::new(0)),
                Participant::new(room_id.clone(), host, Role::Host, Timestamp::new(0)),
            )
            .await
            .unwrap();
        rooms
            .add_participant(Participant::new(
                room_id.clone(),
                UserId::new("bob".to_string()).unwrap(),
                Role::Viewer,
                Timestamp::new(0),
            ))
            .await
            .unwrap();
        let sync = Arc::new(RoomSync::new(
            Arc::new(InMemoryQueueItemRepository::new()),
            Arc::new(WebSocketRoomBroadcaster::new(clock.clone())),
            clock,
        ));
        let usecase = LeaveRoomUseCase::new(rooms.clone(), Arc::new(RoomLockRegistry::new()), sync);
        (usecase, rooms, room_id)
    }

    #[tokio::test]
    async fn test_last_leave_deactivates_room() {
        // テスト項目: 参加者が 0 人になるとルームが非アクティブになる
        // given (前提条件):
        let (usecase, rooms, room_id) = create_fixture().await;

        // when (操作):
        let first = usecase
            .execute(&room_id, &UserId::new("bob".to_string()).unwrap(), None)
            .await
            .unwrap();
        let last = usecase
            .execute(&room_id, &UserId::new("host".to_string()).unwrap(), None)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(first, LeaveOutcome::Left { remaining: 1 });
        assert_eq!(last, LeaveOutcome::RoomDeactivated);
        assert!(!rooms.get_room(&room_id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_leave_by_non_participant() {
        // テスト項目: 参加していないユーザーの退出は NotParticipant
        // given (前提条件):
        let (usecase, _, room_id) = create_fixture().await;

        // when (操作):
        let result = usecase
            .execute(&room_id, &UserId::new("carol".to_string()).unwrap(), None)
            .await;

        // then (期待する結果):
        assert_eq!(result, Err(JoinRoomError::NotParticipant("room-1".to_string())));
    }
}
