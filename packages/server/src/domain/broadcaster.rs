//! Room broadcast interface
//!
//! 接続中のクライアントへのイベント配信の抽象化。
//! 具体的な実装（WebSocket + ルームごとのアクター）とイベントのエンコードは
//! Infrastructure 層が提供します。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    ConnectionId, MessagePushError, PlaybackState, PlayerAction, QueueItem, RoomEvent, RoomId,
};

/// Outbound channel of one connection (serialized JSON frames)
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// Room-scoped fan-out channel
#[async_trait]
pub trait RoomBroadcaster: Send + Sync {
    /// Register the outbound channel of a new connection.
    async fn register_connection(&self, connection_id: ConnectionId, sender: PusherChannel);

    /// Forget the connection and remove it from every room it joined.
    async fn disconnect(&self, connection_id: &ConnectionId);

    /// Add a registered connection to the room after pushing it a snapshot of
    /// `items` and the room's playback state.
    ///
    /// The snapshot is taken inside the room's serialized event order, so it
    /// never interleaves with the events that follow it.
    async fn join(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
        items: Vec<QueueItem>,
    ) -> Result<(), MessagePushError>;

    /// Remove the connection from the room.
    async fn leave(&self, room_id: &RoomId, connection_id: &ConnectionId);

    /// Push `event` to every connection of the room.
    async fn broadcast(&self, room_id: &RoomId, event: &RoomEvent)
    -> Result<(), MessagePushError>;

    /// Push an already encoded frame to one connection.
    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError>;

    /// Apply a transport command to the room's playback state and relay it.
    async fn apply_player_command(
        &self,
        room_id: &RoomId,
        action: PlayerAction,
    ) -> Result<PlaybackState, MessagePushError>;

    /// Current playback state of the room.
    async fn playback_state(&self, room_id: &RoomId) -> Result<PlaybackState, MessagePushError>;

    /// Notify every connection that the room closed and tear the room channel down.
    async fn close(&self, room_id: &RoomId);

    /// Number of connections currently in the room.
    async fn connection_count(&self, room_id: &RoomId) -> usize;
}
