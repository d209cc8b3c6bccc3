//! InMemory Room Repository 実装
//!
//! ドメイン層が定義する RoomRepository trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Participant, RepositoryError, Room, RoomId, RoomRepository, Timestamp, UserId,
};

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<RoomId, Room>,
    participants: HashMap<RoomId, Vec<Participant>>,
}

/// インメモリ Room Repository 実装
#[derive(Default)]
pub struct InMemoryRoomRepository {
    table: Mutex<RoomTable>,
}

impl InMemoryRoomRepository {
    /// 新しい InMemoryRoomRepository を作成
    pub fn new() -> Self {
        Self::default()
    }
}

fn room_not_found(room_id: &RoomId) -> RepositoryError {
    RepositoryError::RoomNotFound(room_id.as_str().to_string())
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn create_room(&self, room: Room, host: Participant) -> Result<(), RepositoryError> {
        let mut table = self.table.lock().await;
        table.participants.insert(room.id.clone(), vec![host]);
        table.rooms.insert(room.id.clone(), room);
        Ok(())
    }

    async fn get_room(&self, room_id: &RoomId) -> Result<Room, RepositoryError> {
        let table = self.table.lock().await;
        table
            .rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| room_not_found(room_id))
    }

    async fn list_active_rooms_for(&self, user_id: &UserId) -> Result<Vec<Room>, RepositoryError> {
        let table = self.table.lock().await;
        let mut rooms: Vec<Room> = table
            .rooms
            .values()
            .filter(|room| room.is_active)
            .filter(|room| {
                table
                    .participants
                    .get(&room.id)
                    .is_some_and(|ps| ps.iter().any(|p| &p.user_id == user_id))
            })
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(rooms)
    }

    async fn set_active(&self, room_id: &RoomId, is_active: bool) -> Result<(), RepositoryError> {
        let mut table = self.table.lock().await;
        let room = table
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| room_not_found(room_id))?;
        room.is_active = is_active;
        Ok(())
    }

    async fn touch(&self, room_id: &RoomId, at: Timestamp) -> Result<(), RepositoryError> {
        let mut table = self.table.lock().await;
        let room = table
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| room_not_found(room_id))?;
        room.last_active = room.last_active.max(at);
        Ok(())
    }

    async fn add_participant(&self, participant: Participant) -> Result<Participant, RepositoryError> {
        let mut table = self.table.lock().await;
        if !table.rooms.contains_key(&participant.room_id) {
            return Err(room_not_found(&participant.room_id));
        }
        let members = table
            .participants
            .entry(participant.room_id.clone())
            .or_default();
        if let Some(existing) = members.iter().find(|p| p.user_id == participant.user_id) {
            return Ok(existing.clone());
        }
        members.push(participant.clone());
        Ok(participant)
    }

    async fn remove_participant(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.lock().await;
        let members = table.participants.entry(room_id.clone()).or_default();
        let before = members.len();
        members.retain(|p| &p.user_id != user_id);
        if members.len() == before {
            return Err(RepositoryError::ParticipantNotFound {
                room_id: room_id.as_str().to_string(),
                user_id: user_id.as_str().to_string(),
            });
        }
        Ok(())
    }

    async fn get_participant(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        let table = self.table.lock().await;
        Ok(table
            .participants
            .get(room_id)
            .and_then(|ps| ps.iter().find(|p| &p.user_id == user_id))
            .cloned())
    }

    async fn get_participants(&self, room_id: &RoomId) -> Result<Vec<Participant>, RepositoryError> {
        let table = self.table.lock().await;
        Ok(table.participants.get(room_id).cloned().unwrap_or_default())
    }

    async fn count_participants(&self, room_id: &RoomId) -> Result<usize, RepositoryError> {
        let table = self.table.lock().await;
        Ok(table.participants.get(room_id).map_or(0, Vec::len))
    }
}
