//! UseCase: 再生コマンドの中継
//!
//! play / pause / seek は永続化せず、ルームの再生状態を更新して
//! 全接続に中継する（最後のコマンドが勝つ）。

use std::sync::Arc;

use crate::domain::{PlaybackState, PlayerAction, PlayerCommand, RoomId, RoomRepository, UserId};

use super::{error::PlayerCommandError, membership::can_control_playback, room_sync::RoomSync};

/// 再生コマンド中継のユースケース
pub struct RelayPlayerCommandUseCase {
    rooms: Arc<dyn RoomRepository>,
    sync: Arc<RoomSync>,
}

impl RelayPlayerCommandUseCase {
    pub fn new(rooms: Arc<dyn RoomRepository>, sync: Arc<RoomSync>) -> Self {
        Self { rooms, sync }
    }

    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        action: PlayerAction,
    ) -> Result<PlaybackState, PlayerCommandError> {
        if action.command == PlayerCommand::Seek && action.time.is_none() {
            return Err(PlayerCommandError::MissingSeekTime);
        }
        let room = self.rooms.get_room(room_id).await?;
        if !room.is_active {
            return Err(PlayerCommandError::RoomNotFound(room_id.as_str().to_string()));
        }
        let participant = self
            .rooms
            .get_participant(room_id, user_id)
            .await?
            .ok_or_else(|| PlayerCommandError::NotParticipant(room_id.as_str().to_string()))?;
        if !can_control_playback(&room, &participant) {
            return Err(PlayerCommandError::Forbidden);
        }

        let state = self
            .sync
            .broadcaster()
            .apply_player_command(room_id, action)
            .await?;
        tracing::debug!(
            room_id = room_id.as_str(),
            "Relayed {:?} from '{}'",
            action.command,
            user_id.as_str()
        );
        Ok(state)
    }
}
