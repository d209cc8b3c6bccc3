//! WebSocket event DTOs.
//!
//! Every text frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::domain::PlayerCommand;

// ========================================
// Client → Server
// ========================================

/// Events sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom(RoomRef),
    LeaveRoom(RoomRef),
    AddItem(AddItemPayload),
    RemoveItem(RemoveItemPayload),
    Reorder(ReorderPayload),
    Skip(RoomRef),
    ItemEnded(ItemEndedPayload),
    PlayerCommand(PlayerCommandPayload),
    CloseRoom(RoomRef),
}

impl ClientEvent {
    /// Room the event targets
    pub fn room_id(&self) -> &str {
        match self {
            ClientEvent::JoinRoom(p)
            | ClientEvent::LeaveRoom(p)
            | ClientEvent::Skip(p)
            | ClientEvent::CloseRoom(p) => &p.room_id,
            ClientEvent::ItemEnded(p) => &p.room_id,
            ClientEvent::AddItem(p) => &p.room_id,
            ClientEvent::RemoveItem(p) => &p.room_id,
            ClientEvent::Reorder(p) => &p.room_id,
            ClientEvent::PlayerCommand(p) => &p.room_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemPayload {
    pub room_id: String,
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemPayload {
    pub room_id: String,
    pub item_id: String,
}

/// The screen finished playing `item_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEndedPayload {
    pub room_id: String,
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderPayload {
    pub room_id: String,
    pub source_index: usize,
    pub dest_index: usize,
}

/// Player transport command (both directions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCommandPayload {
    pub room_id: String,
    pub command: PlayerCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

// ========================================
// Server → Client
// ========================================

/// Events pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    RoomSnapshot(RoomSnapshotPayload),
    QueueUpdated(QueueUpdatedPayload),
    PlayerCommand(PlayerCommandPayload),
    RoomClosed(RoomRef),
    Error(ErrorPayload),
}

impl ServerEvent {
    /// JSON text frame for this event
    pub fn to_frame(&self) -> String {
        // シリアライズ対象は String / 数値 / bool のみなので失敗しない
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
            item_id: None,
        })
    }
}

/// Authoritative room state pushed to a joining connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshotPayload {
    pub room_id: String,
    pub items: Vec<QueueItemDto>,
    pub current_item: Option<QueueItemDto>,
    pub player: PlayerStateDto,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateDto {
    pub is_playing: bool,
    pub current_time: f64,
}

/// Mutation that produced a `queue-updated` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueUpdateType {
    Add,
    Remove,
    Update,
    Reorder,
}

/// `queue-updated` always carries the full ordered queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdatedPayload {
    pub r#type: QueueUpdateType,
    pub room_id: String,
    pub items: Vec<QueueItemDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// Queue item as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemDto {
    pub id: String,
    pub room_id: String,
    pub video_id: String,
    pub title: Option<String>,
    pub added_by_id: String,
    pub position: usize,
    /// PENDING / PROCESSING / COMPLETED / ERROR
    pub status: String,
    /// QUEUED / PLAYING / PLAYED
    pub playback: String,
    pub duration: Option<u32>,
    pub error_message: Option<String>,
    pub added_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reorder_event() {
        // テスト項目: reorder イベントが kebab-case の event 名と camelCase の payload で読める
        // given (前提条件):
        let text = r#"{"event":"reorder","data":{"roomId":"r1","sourceIndex":0,"destIndex":2}}"#;

        // when (操作):
        let event: ClientEvent = serde_json::from_str(text).unwrap();

        // then (期待する結果):
        assert_eq!(
            event,
            ClientEvent::Reorder(ReorderPayload {
                room_id: "r1".to_string(),
                source_index: 0,
                dest_index: 2,
            })
        );
        assert_eq!(event.room_id(), "r1");
    }

    #[test]
    fn test_item_ended_requires_item_id() {
        // テスト項目: item-ended は終了した項目の itemId を必須とする
        // given (前提条件):
        let with_item = r#"{"event":"item-ended","data":{"roomId":"r1","itemId":"i1"}}"#;
        let without_item = r#"{"event":"item-ended","data":{"roomId":"r1"}}"#;

        // when (操作):
        let parsed = serde_json::from_str::<ClientEvent>(with_item).unwrap();
        let rejected = serde_json::from_str::<ClientEvent>(without_item);

        // then (期待する結果):
        assert_eq!(
            parsed,
            ClientEvent::ItemEnded(ItemEndedPayload {
                room_id: "r1".to_string(),
                item_id: "i1".to_string(),
            })
        );
        assert!(rejected.is_err());
    }

    #[test]
    fn test_parse_player_command_without_time() {
        // テスト項目: time の無い player-command を受け付ける
        // given (前提条件):
        let text = r#"{"event":"player-command","data":{"roomId":"r1","command":"pause"}}"#;

        // when (操作):
        let event: ClientEvent = serde_json::from_str(text).unwrap();

        // then (期待する結果):
        match event {
            ClientEvent::PlayerCommand(payload) => {
                assert_eq!(payload.command, PlayerCommand::Pause);
                assert_eq!(payload.time, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        // テスト項目: 未知のイベント名はパースエラーになる
        // given (前提条件):
        let text = r#"{"event":"chat","data":{"roomId":"r1"}}"#;

        // when (操作):
        let result = serde_json::from_str::<ClientEvent>(text);

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_frame_shape() {
        // テスト項目: サーバーイベントが {"event", "data"} の形でシリアライズされる
        // given (前提条件):
        let event = ServerEvent::RoomClosed(RoomRef {
            room_id: "r1".to_string(),
        });

        // when (操作):
        let value: serde_json::Value = serde_json::from_str(&event.to_frame()).unwrap();

        // then (期待する結果):
        assert_eq!(value["event"], "room-closed");
        assert_eq!(value["data"]["roomId"], "r1");
    }

    #[test]
    fn test_queue_updated_frame_shape() {
        // テスト項目: queue-updated は type と items を持つ
        // given (前提条件):
        let event = ServerEvent::QueueUpdated(QueueUpdatedPayload {
            r#type: QueueUpdateType::Reorder,
            room_id: "r1".to_string(),
            items: vec![],
        });

        // when (操作):
        let value: serde_json::Value = serde_json::from_str(&event.to_frame()).unwrap();

        // then (期待する結果):
        assert_eq!(value["event"], "queue-updated");
        assert_eq!(value["data"]["type"], "reorder");
        assert!(value["data"]["items"].as_array().unwrap().is_empty());
    }
}
