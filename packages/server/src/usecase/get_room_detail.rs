//! UseCase: ルーム詳細・キュー取得

use std::sync::Arc;

use crate::domain::{
    Participant, QueueItem, QueueItemRepository, RepositoryError, Room, RoomId, RoomRepository,
};

use super::error::GetRoomDetailError;

/// ルーム・参加者・キューをまとめたもの
#[derive(Debug, Clone, PartialEq)]
pub struct RoomDetail {
    pub room: Room,
    pub participants: Vec<Participant>,
    pub items: Vec<QueueItem>,
}

/// ルーム詳細取得のユースケース
pub struct GetRoomDetailUseCase {
    rooms: Arc<dyn RoomRepository>,
    items: Arc<dyn QueueItemRepository>,
}

impl GetRoomDetailUseCase {
    pub fn new(rooms: Arc<dyn RoomRepository>, items: Arc<dyn QueueItemRepository>) -> Self {
        Self { rooms, items }
    }

    pub async fn execute(&self, room_id: &RoomId) -> Result<RoomDetail, GetRoomDetailError> {
        let room = self.rooms.get_room(room_id).await.map_err(map_error)?;
        let participants = self
            .rooms
            .get_participants(room_id)
            .await
            .map_err(map_error)?;
        let items = self.items.list_by_room(room_id).await.map_err(map_error)?;
        Ok(RoomDetail {
            room,
            participants,
            items,
        })
    }

    /// position 順のキューだけを取得
    pub async fn queue(&self, room_id: &RoomId) -> Result<Vec<QueueItem>, GetRoomDetailError> {
        self.rooms.get_room(room_id).await.map_err(map_error)?;
        self.items.list_by_room(room_id).await.map_err(map_error)
    }
}

fn map_error(error: RepositoryError) -> GetRoomDetailError {
    match error {
        RepositoryError::RoomNotFound(_) => GetRoomDetailError::RoomNotFound,
        other => GetRoomDetailError::RepositoryError(other),
    }
}
