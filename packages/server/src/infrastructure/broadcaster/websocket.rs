//! WebSocket を使った RoomBroadcaster 実装
//!
//! ## 責務
//!
//! - 接続ごとの `UnboundedSender` を管理
//! - ルームごとにアクター（tokio タスク）を起動し、そのルームへの配信・再生状態を
//!   メッセージパッシングだけで扱う
//! - ドメインのルームイベントを `{"event", "data"}` フレームにエンコードする
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層（`ui/handler/websocket.rs`）で行われます。
//! この実装は生成された `UnboundedSender` を受け取り、メッセージ送信に使用します。
//! ルームの状態（接続一覧・再生状態）はアクターだけが所有するため、
//! 参加時のスナップショットとその後のイベントの順序は常に保たれます。
//!
//! 最後の接続が抜けたアクターは終了し、再生状態だけを `parked` に残します。
//! 次の参加でその状態からアクターを起動し直し、`close` で破棄します。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use utage_shared::time::Clock;

use crate::{
    domain::{
        ConnectionId, MessagePushError, PlaybackState, PlayerAction, PusherChannel, QueueItem,
        RoomBroadcaster, RoomEvent, RoomId, Timestamp,
    },
    infrastructure::dto::conversion::{
        player_command_event, room_closed_event, room_event_to_server_event, room_snapshot_event,
    },
};

/// Messages understood by a room actor
enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        sender: PusherChannel,
        items: Vec<QueueItem>,
        reply: oneshot::Sender<Result<(), MessagePushError>>,
    },
    /// Replies with the final playback state when the room became empty and the actor stopped
    Leave {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Option<PlaybackState>>,
    },
    Broadcast {
        content: String,
    },
    Player {
        action: PlayerAction,
        reply: oneshot::Sender<PlaybackState>,
    },
    Playback {
        reply: oneshot::Sender<PlaybackState>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    Close {
        content: String,
    },
}

/// State owned by one room task
struct RoomActor {
    room_id: RoomId,
    connections: HashMap<ConnectionId, PusherChannel>,
    playback: PlaybackState,
    clock: Arc<dyn Clock>,
}

impl RoomActor {
    fn new(room_id: RoomId, playback: PlaybackState, clock: Arc<dyn Clock>) -> Self {
        Self {
            room_id,
            connections: HashMap::new(),
            playback,
            clock,
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<RoomCommand>) {
        tracing::debug!("Room actor for '{}' started", self.room_id.as_str());
        while let Some(command) = mailbox.recv().await {
            match command {
                RoomCommand::Join {
                    connection_id,
                    sender,
                    items,
                    reply,
                } => {
                    let snapshot =
                        room_snapshot_event(&self.room_id, &items, &self.playback, self.now());
                    let result = match sender.send(snapshot.to_frame()) {
                        Ok(()) => {
                            self.connections.insert(connection_id, sender);
                            Ok(())
                        }
                        Err(e) => Err(MessagePushError::PushFailed(e.to_string())),
                    };
                    let _ = reply.send(result);
                }
                RoomCommand::Leave {
                    connection_id,
                    reply,
                } => {
                    self.connections.remove(&connection_id);
                    if self.connections.is_empty() {
                        let _ = reply.send(Some(self.playback));
                        break;
                    }
                    let _ = reply.send(None);
                }
                RoomCommand::Broadcast { content } => self.fan_out(&content),
                RoomCommand::Player { action, reply } => {
                    let now = self.now();
                    self.playback.apply(&action, now);
                    self.fan_out(&player_command_event(&self.room_id, &action).to_frame());
                    let _ = reply.send(self.playback);
                }
                RoomCommand::Playback { reply } => {
                    let _ = reply.send(self.playback);
                }
                RoomCommand::Count { reply } => {
                    let _ = reply.send(self.connections.len());
                }
                RoomCommand::Close { content } => {
                    self.fan_out(&content);
                    break;
                }
            }
        }
        tracing::debug!("Room actor for '{}' stopped", self.room_id.as_str());
    }

    /// ブロードキャストでは一部の送信失敗を許容し、閉じた接続は取り除く
    fn fan_out(&mut self, content: &str) {
        self.connections.retain(|connection_id, sender| {
            match sender.send(content.to_string()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        "Failed to push message to connection '{}': {}",
                        connection_id.as_str(),
                        e
                    );
                    false
                }
            }
        });
    }
}

struct ConnectionEntry {
    sender: PusherChannel,
    rooms: HashSet<RoomId>,
}

#[derive(Default)]
struct Rooms {
    /// 起動中のルームアクターへの mailbox
    actors: HashMap<RoomId, mpsc::UnboundedSender<RoomCommand>>,
    /// 接続の無いルームの再生状態
    parked: HashMap<RoomId, PlaybackState>,
}

impl Rooms {
    fn running(&self, room_id: &RoomId) -> Option<&mpsc::UnboundedSender<RoomCommand>> {
        self.actors.get(room_id).filter(|mailbox| !mailbox.is_closed())
    }
}

/// WebSocket を使った RoomBroadcaster 実装
pub struct WebSocketRoomBroadcaster {
    clock: Arc<dyn Clock>,
    rooms: Mutex<Rooms>,
    /// 接続中のクライアントの WebSocket sender と参加中のルーム
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
}

impl WebSocketRoomBroadcaster {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rooms: Mutex::new(Rooms::default()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Number of running room actors
    pub async fn active_rooms(&self) -> usize {
        let rooms = self.rooms.lock().await;
        rooms.actors.values().filter(|mailbox| !mailbox.is_closed()).count()
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    fn closed(room_id: &RoomId) -> MessagePushError {
        MessagePushError::RoomClosed(room_id.as_str().to_string())
    }

    /// Remove the connection from the room actor; stops the actor when the room became empty.
    async fn release(&self, room_id: &RoomId, connection_id: &ConnectionId) {
        // 停止と mailbox の削除を一続きにするため、応答を待つ間もロックを保持する
        let mut rooms = self.rooms.lock().await;
        let Some(mailbox) = rooms.running(room_id).cloned() else {
            return;
        };
        let (reply, response) = oneshot::channel();
        if mailbox
            .send(RoomCommand::Leave {
                connection_id: connection_id.clone(),
                reply,
            })
            .is_err()
        {
            rooms.actors.remove(room_id);
            return;
        }
        if let Ok(Some(playback)) = response.await {
            rooms.actors.remove(room_id);
            rooms.parked.insert(room_id.clone(), playback);
            tracing::debug!("Room '{}' has no connections; actor parked", room_id.as_str());
        }
    }
}

#[async_trait]
impl RoomBroadcaster for WebSocketRoomBroadcaster {
    async fn register_connection(&self, connection_id: ConnectionId, sender: PusherChannel) {
        let mut connections = self.connections.lock().await;
        tracing::debug!("Connection '{}' registered", connection_id.as_str());
        connections.insert(
            connection_id,
            ConnectionEntry {
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    async fn disconnect(&self, connection_id: &ConnectionId) {
        let entry = self.connections.lock().await.remove(connection_id);
        let Some(entry) = entry else {
            return;
        };
        for room_id in entry.rooms {
            self.release(&room_id, connection_id).await;
        }
        tracing::debug!("Connection '{}' unregistered", connection_id.as_str());
    }

    async fn join(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
        items: Vec<QueueItem>,
    ) -> Result<(), MessagePushError> {
        let sender = {
            let mut connections = self.connections.lock().await;
            let entry = connections.get_mut(connection_id).ok_or_else(|| {
                MessagePushError::ConnectionNotFound(connection_id.as_str().to_string())
            })?;
            entry.rooms.insert(room_id.clone());
            entry.sender.clone()
        };

        let (reply, response) = oneshot::channel();
        {
            let mut rooms = self.rooms.lock().await;
            let mailbox = match rooms.running(room_id) {
                Some(mailbox) => mailbox.clone(),
                None => {
                    let playback = rooms
                        .parked
                        .remove(room_id)
                        .unwrap_or_else(|| PlaybackState::new(self.now()));
                    let (tx, rx) = mpsc::unbounded_channel();
                    let actor = RoomActor::new(room_id.clone(), playback, self.clock.clone());
                    tokio::spawn(actor.run(rx));
                    rooms.actors.insert(room_id.clone(), tx.clone());
                    tx
                }
            };
            mailbox
                .send(RoomCommand::Join {
                    connection_id: connection_id.clone(),
                    sender,
                    items,
                    reply,
                })
                .map_err(|_| Self::closed(room_id))?;
        }

        let result = response.await.map_err(|_| Self::closed(room_id))?;
        if result.is_err() {
            // 参加できなかった接続だけのルームを残さない
            self.leave(room_id, connection_id).await;
        }
        result
    }

    async fn leave(&self, room_id: &RoomId, connection_id: &ConnectionId) {
        if let Some(entry) = self.connections.lock().await.get_mut(connection_id) {
            entry.rooms.remove(room_id);
        }
        self.release(room_id, connection_id).await;
    }

    async fn broadcast(
        &self,
        room_id: &RoomId,
        event: &RoomEvent,
    ) -> Result<(), MessagePushError> {
        // 誰も購読していないルームへの配信は何もしない
        let rooms = self.rooms.lock().await;
        let Some(mailbox) = rooms.running(room_id) else {
            return Ok(());
        };
        let content = room_event_to_server_event(room_id, event).to_frame();
        mailbox
            .send(RoomCommand::Broadcast { content })
            .map_err(|_| Self::closed(room_id))
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError> {
        let connections = self.connections.lock().await;
        let entry = connections.get(connection_id).ok_or_else(|| {
            MessagePushError::ConnectionNotFound(connection_id.as_str().to_string())
        })?;
        entry
            .sender
            .send(content.to_string())
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;
        tracing::debug!("Pushed message to connection '{}'", connection_id.as_str());
        Ok(())
    }

    async fn apply_player_command(
        &self,
        room_id: &RoomId,
        action: PlayerAction,
    ) -> Result<PlaybackState, MessagePushError> {
        let response = {
            let mut rooms = self.rooms.lock().await;
            match rooms.running(room_id) {
                Some(mailbox) => {
                    let (reply, response) = oneshot::channel();
                    mailbox
                        .send(RoomCommand::Player { action, reply })
                        .map_err(|_| Self::closed(room_id))?;
                    response
                }
                None => {
                    // 接続が無いルームは中継先が無いので状態だけ進める
                    let now = self.now();
                    let playback = rooms
                        .parked
                        .entry(room_id.clone())
                        .or_insert_with(|| PlaybackState::new(now));
                    playback.apply(&action, now);
                    return Ok(*playback);
                }
            }
        };
        response.await.map_err(|_| Self::closed(room_id))
    }

    async fn playback_state(&self, room_id: &RoomId) -> Result<PlaybackState, MessagePushError> {
        let response = {
            let rooms = self.rooms.lock().await;
            match rooms.running(room_id) {
                Some(mailbox) => {
                    let (reply, response) = oneshot::channel();
                    mailbox
                        .send(RoomCommand::Playback { reply })
                        .map_err(|_| Self::closed(room_id))?;
                    response
                }
                None => {
                    return Ok(rooms
                        .parked
                        .get(room_id)
                        .copied()
                        .unwrap_or_else(|| PlaybackState::new(self.now())));
                }
            }
        };
        response.await.map_err(|_| Self::closed(room_id))
    }

    async fn close(&self, room_id: &RoomId) {
        let mailbox = {
            let mut rooms = self.rooms.lock().await;
            rooms.parked.remove(room_id);
            rooms.actors.remove(room_id)
        };
        if let Some(mailbox) = mailbox {
            let _ = mailbox.send(RoomCommand::Close {
                content: room_closed_event(room_id).to_frame(),
            });
        }
        let mut connections = self.connections.lock().await;
        for entry in connections.values_mut() {
            entry.rooms.remove(room_id);
        }
    }

    async fn connection_count(&self, room_id: &RoomId) -> usize {
        let response = {
            let rooms = self.rooms.lock().await;
            let Some(mailbox) = rooms.running(room_id) else {
                return 0;
            };
            let (reply, response) = oneshot::channel();
            if mailbox.send(RoomCommand::Count { reply }).is_err() {
                return 0;
            }
            response
        };
        response.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PlayerCommand, QueueUpdateKind};
    use utage_shared::time::ManualClock;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - ルームアクターへの参加・配信・再生状態の管理
    // - 接続が無くなったルームのアクターの停止と再生状態の引き継ぎ
    //
    // 【どのようなシナリオをテストするか】
    // 1. 参加時にスナップショットが最初に届く
    // 2. broadcast は同じルームの接続にだけ届く
    // 3. 再生コマンドは状態を更新し、中継される
    // 4. close で room-closed が届き、以降の配信は届かない
    // 5. 未登録の接続は参加できない
    // 6. 最後の接続が抜けるとアクターが止まり、再参加で再生状態が戻る
    // ========================================

    fn room(id: &str) -> RoomId {
        RoomId::new(id.to_string()).unwrap()
    }

    fn create_test_broadcaster() -> (WebSocketRoomBroadcaster, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (WebSocketRoomBroadcaster::new(clock.clone()), clock)
    }

    async fn connect(
        broadcaster: &WebSocketRoomBroadcaster,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = ConnectionId::generate();
        broadcaster
            .register_connection(connection_id.clone(), tx)
            .await;
        (connection_id, rx)
    }

    async fn next_json(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
        let frame = rx.recv().await.unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    fn failure(message: &str) -> RoomEvent {
        RoomEvent::Error {
            message: message.to_string(),
            item_id: None,
        }
    }

    fn play_at(seconds: f64) -> PlayerAction {
        PlayerAction {
            command: PlayerCommand::Play,
            time: Some(seconds),
        }
    }

    #[tokio::test]
    async fn test_join_pushes_snapshot_first() {
        // テスト項目: 参加すると最初にスナップショットが届き、その後の配信も届く
        // given (前提条件):
        let (broadcaster, _clock) = create_test_broadcaster();
        let (alice, mut rx) = connect(&broadcaster).await;

        // when (操作):
        broadcaster.join(&room("r1"), &alice, vec![]).await.unwrap();
        broadcaster
            .broadcast(
                &room("r1"),
                &RoomEvent::QueueUpdated {
                    kind: QueueUpdateKind::Add,
                    items: vec![],
                },
            )
            .await
            .unwrap();

        // then (期待する結果):
        let snapshot = next_json(&mut rx).await;
        assert_eq!(snapshot["event"], "room-snapshot");
        assert_eq!(snapshot["data"]["roomId"], "r1");
        assert_eq!(snapshot["data"]["player"]["isPlaying"], false);
        let update = next_json(&mut rx).await;
        assert_eq!(update["event"], "queue-updated");
        assert_eq!(update["data"]["type"], "add");
        assert_eq!(broadcaster.connection_count(&room("r1")).await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_is_room_scoped() {
        // テスト項目: 別のルームの接続には配信されない
        // given (前提条件):
        let (broadcaster, _clock) = create_test_broadcaster();
        let (alice, mut rx_alice) = connect(&broadcaster).await;
        let (bob, mut rx_bob) = connect(&broadcaster).await;
        broadcaster.join(&room("r1"), &alice, vec![]).await.unwrap();
        broadcaster.join(&room("r2"), &bob, vec![]).await.unwrap();
        rx_alice.recv().await;
        rx_bob.recv().await;

        // when (操作):
        broadcaster.broadcast(&room("r1"), &failure("only-r1")).await.unwrap();
        broadcaster.broadcast(&room("r2"), &failure("only-r2")).await.unwrap();

        // then (期待する結果):
        assert_eq!(next_json(&mut rx_alice).await["data"]["message"], "only-r1");
        assert_eq!(next_json(&mut rx_bob).await["data"]["message"], "only-r2");
    }

    #[tokio::test]
    async fn test_late_joiner_sees_current_playback() {
        // テスト項目: 再生中に参加したクライアントは現在位置を含むスナップショットを受け取る
        // given (前提条件):
        let (broadcaster, clock) = create_test_broadcaster();
        let (host, mut rx_host) = connect(&broadcaster).await;
        broadcaster.join(&room("r1"), &host, vec![]).await.unwrap();
        rx_host.recv().await;
        let state = broadcaster
            .apply_player_command(&room("r1"), play_at(15.0))
            .await
            .unwrap();
        assert!(state.is_playing);

        // when (操作):
        clock.advance(2_000);
        let (late, mut rx_late) = connect(&broadcaster).await;
        broadcaster.join(&room("r1"), &late, vec![]).await.unwrap();

        // then (期待する結果):
        let relayed = next_json(&mut rx_host).await;
        assert_eq!(relayed["event"], "player-command");
        assert_eq!(relayed["data"]["command"], "play");
        assert_eq!(relayed["data"]["time"], 15.0);
        let snapshot = next_json(&mut rx_late).await;
        assert_eq!(snapshot["data"]["player"]["isPlaying"], true);
        assert_eq!(snapshot["data"]["player"]["currentTime"], 17.0);
    }

    #[tokio::test]
    async fn test_close_notifies_and_stops_room() {
        // テスト項目: close でルームの接続に通知され、以降の配信は届かない
        // given (前提条件):
        let (broadcaster, _clock) = create_test_broadcaster();
        let (alice, mut rx) = connect(&broadcaster).await;
        broadcaster.join(&room("r1"), &alice, vec![]).await.unwrap();
        rx.recv().await;

        // when (操作):
        broadcaster.close(&room("r1")).await;
        broadcaster.broadcast(&room("r1"), &failure("after")).await.unwrap();

        // then (期待する結果):
        let closed = next_json(&mut rx).await;
        assert_eq!(closed["event"], "room-closed");
        assert_eq!(closed["data"]["roomId"], "r1");
        assert!(rx.try_recv().is_err());
        assert_eq!(broadcaster.connection_count(&room("r1")).await, 0);
        assert_eq!(broadcaster.active_rooms().await, 0);
    }

    #[tokio::test]
    async fn test_join_unregistered_connection_fails() {
        // テスト項目: 登録されていない接続は参加できない
        // given (前提条件):
        let (broadcaster, _clock) = create_test_broadcaster();
        let unknown = ConnectionId::generate();

        // when (操作):
        let result = broadcaster.join(&room("r1"), &unknown, vec![]).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(MessagePushError::ConnectionNotFound(_))
        ));
        assert_eq!(broadcaster.active_rooms().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_all_rooms() {
        // テスト項目: 切断すると参加中の全ルームから外れ、空になったルームのアクターは止まる
        // given (前提条件):
        let (broadcaster, _clock) = create_test_broadcaster();
        let (alice, _rx) = connect(&broadcaster).await;
        broadcaster.join(&room("r1"), &alice, vec![]).await.unwrap();
        broadcaster.join(&room("r2"), &alice, vec![]).await.unwrap();
        assert_eq!(broadcaster.active_rooms().await, 2);

        // when (操作):
        broadcaster.disconnect(&alice).await;

        // then (期待する結果):
        assert_eq!(broadcaster.connection_count(&room("r1")).await, 0);
        assert_eq!(broadcaster.connection_count(&room("r2")).await, 0);
        assert_eq!(broadcaster.active_rooms().await, 0);
        assert!(broadcaster.push_to(&alice, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_room_actor_stops_and_keeps_playback() {
        // テスト項目: 最後の接続が抜けるとアクターは止まり、再参加時は再生状態を引き継ぐ
        // given (前提条件):
        let (broadcaster, clock) = create_test_broadcaster();
        let (alice, mut rx_alice) = connect(&broadcaster).await;
        let (bob, _rx_bob) = connect(&broadcaster).await;
        broadcaster.join(&room("r1"), &alice, vec![]).await.unwrap();
        broadcaster.join(&room("r1"), &bob, vec![]).await.unwrap();
        rx_alice.recv().await;
        broadcaster
            .apply_player_command(&room("r1"), play_at(30.0))
            .await
            .unwrap();

        // when (操作):
        broadcaster.leave(&room("r1"), &bob).await;
        let still_running = broadcaster.active_rooms().await;
        broadcaster.leave(&room("r1"), &alice).await;
        let after_last_leave = broadcaster.active_rooms().await;
        clock.advance(5_000);
        let parked = broadcaster.playback_state(&room("r1")).await.unwrap();
        broadcaster.join(&room("r1"), &alice, vec![]).await.unwrap();

        // then (期待する結果):
        assert_eq!(still_running, 1);
        assert_eq!(after_last_leave, 0);
        assert!(parked.is_playing);
        assert_eq!(parked.current_time(Timestamp::new(clock.now_millis())), 35.0);
        assert_eq!(next_json(&mut rx_alice).await["event"], "player-command");
        let snapshot = next_json(&mut rx_alice).await;
        assert_eq!(snapshot["event"], "room-snapshot");
        assert_eq!(snapshot["data"]["player"]["currentTime"], 35.0);
        assert_eq!(broadcaster.active_rooms().await, 1);
    }

    #[tokio::test]
    async fn test_player_command_without_connections_spawns_no_actor() {
        // テスト項目: 接続の無いルームへの再生コマンドはアクターを起動せず、状態だけ更新する
        // given (前提条件):
        let (broadcaster, _clock) = create_test_broadcaster();

        // when (操作):
        let state = broadcaster
            .apply_player_command(&room("r1"), play_at(0.0))
            .await
            .unwrap();

        // then (期待する結果):
        assert!(state.is_playing);
        assert_eq!(broadcaster.active_rooms().await, 0);
        assert!(broadcaster.playback_state(&room("r1")).await.unwrap().is_playing);
    }
}
