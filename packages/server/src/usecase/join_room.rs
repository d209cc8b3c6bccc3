//! UseCase: ルーム参加
//!
//! 参加者として登録し、接続をルームのチャンネルに加える。
//! スナップショットはルームの変更ロックを保持したまま描画するので、
//! 参加直後に届くイベントがスナップショットより古くなることはない。

use std::sync::Arc;

use crate::domain::{
    ConnectionId, Participant, QueueItemRepository, Role, RoomId, RoomRepository, UserId,
};

use super::{error::JoinRoomError, room_lock::RoomLockRegistry, room_sync::RoomSync};

/// ルーム参加のユースケース
pub struct JoinRoomUseCase {
    rooms: Arc<dyn RoomRepository>,
    items: Arc<dyn QueueItemRepository>,
    locks: Arc<RoomLockRegistry>,
    sync: Arc<RoomSync>,
}

impl JoinRoomUseCase {
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

    /// 参加者として登録する（既に参加済みならその参加者を返す）
    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: UserId,
    ) -> Result<Participant, JoinRoomError> {
        let _guard = self.locks.lock(room_id).await;
        self.register(room_id, user_id).await
    }

    /// 参加者として登録し、接続にスナップショットを送ってからルームに加える
    pub async fn subscribe(
        &self,
        room_id: &RoomId,
        user_id: UserId,
        connection_id: &ConnectionId,
    ) -> Result<Participant, JoinRoomError> {
        let _guard = self.locks.lock(room_id).await;
        let participant = self.register(room_id, user_id).await?;

        let items = self.items.list_by_room(room_id).await?;
        self.sync
            .broadcaster()
            .join(room_id, connection_id, items)
            .await?;

        tracing::info!(
            room_id = room_id.as_str(),
            user_id = participant.user_id.as_str(),
            "Connection '{}' joined room",
            connection_id.as_str()
        );
        Ok(participant)
    }

    async fn register(
        &self,
        room_id: &RoomId,
        user_id: UserId,
    ) -> Result<Participant, JoinRoomError> {
        let room = self.rooms.get_room(room_id).await?;
        if !room.is_active {
            return Err(JoinRoomError::RoomInactive(room_id.as_str().to_string()));
        }
        let role = if room.host_id == user_id {
            Role::Host
        } else {
            Role::Viewer
        };
        let now = self.sync.now();
        let participant = self
            .rooms
            .add_participant(Participant::new(room_id.clone(), user_id, role, now))
            .await?;
        self.rooms.touch(room_id, now).await?;
        Ok(participant)
    }
}
