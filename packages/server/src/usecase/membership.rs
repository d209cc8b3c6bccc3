//! Room membership checks shared by the queue use cases.

use crate::domain::{Participant, Room, RoomId, RoomRepository, UserId};

use super::error::QueueMutationError;

/// The active room and the caller's participant record.
pub(crate) async fn active_membership(
    rooms: &dyn RoomRepository,
    room_id: &RoomId,
    user_id: &UserId,
) -> Result<(Room, Participant), QueueMutationError> {
    let room = rooms.get_room(room_id).await?;
    if !room.is_active {
        return Err(QueueMutationError::RoomInactive(room_id.as_str().to_string()));
    }
    let participant = rooms
        .get_participant(room_id, user_id)
        .await?
        .ok_or_else(|| QueueMutationError::NotParticipant(room_id.as_str().to_string()))?;
    Ok((room, participant))
}

/// HOST, or anyone when the room lets guests control playback.
pub(crate) fn can_control_playback(room: &Room, participant: &Participant) -> bool {
    participant.is_host() || room.settings.allow_guest_control
}
