//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, ItemId, PlayerAction, RoomId, UserId},
    infrastructure::dto::websocket::{ClientEvent, ServerEvent},
    ui::state::AppState,
    usecase::AdvanceReason,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub user_id: String,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Convert String -> UserId (Domain Model)
    let user_id = match UserId::new(query.user_id.clone()) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!("Invalid user_id format: '{}'", query.user_id);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let connection_id = ConnectionId::generate();
    let (tx, rx) = mpsc::unbounded_channel();
    state
        .broadcaster
        .register_connection(connection_id.clone(), tx)
        .await;
    tracing::info!(
        "User '{}' connected as '{}'",
        user_id.as_str(),
        connection_id.as_str()
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, connection_id, rx)))
}

/// Spawns a task that receives frames from the rx channel and pushes them to the WebSocket sender.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    user_id: UserId,
    connection_id: ConnectionId,
    rx: mpsc::UnboundedReceiver<String>,
) {
    let (sender, mut receiver) = socket.split();

    let state_clone = state.clone();
    let connection_clone = connection_id.clone();

    // Spawn a task to receive commands from this client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!("WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let event = match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!("Failed to parse client event: {}", e);
                            reply_error(&state_clone, &connection_clone, "Invalid event").await;
                            continue;
                        }
                    };
                    if let Err(message) =
                        dispatch(&state_clone, &user_id, &connection_clone, event).await
                    {
                        reply_error(&state_clone, &connection_clone, &message).await;
                    }
                }
                Message::Ping(_) => {
                    tracing::debug!("Received ping");
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", connection_clone.as_str());
                    break;
                }
                _ => {}
            }
        }
    });

    // Spawn a task to push room events to this client
    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state.broadcaster.disconnect(&connection_id).await;
    tracing::info!("Connection '{}' closed", connection_id.as_str());
}

async fn reply_error(state: &AppState, connection_id: &ConnectionId, message: &str) {
    let frame = ServerEvent::error(message).to_frame();
    if let Err(e) = state.broadcaster.push_to(connection_id, &frame).await {
        tracing::warn!("Failed to push error to '{}': {}", connection_id.as_str(), e);
    }
}

/// Run one client command; `Err` carries the message for the `error` event.
async fn dispatch(
    state: &AppState,
    user_id: &UserId,
    connection_id: &ConnectionId,
    event: ClientEvent,
) -> Result<(), String> {
    let room_id = RoomId::new(event.room_id().to_string()).map_err(|e| e.to_string())?;
    match event {
        ClientEvent::JoinRoom(_) => {
            state
                .join_room_usecase
                .subscribe(&room_id, user_id.clone(), connection_id)
                .await
                .map_err(|e| e.to_string())?;
        }
        ClientEvent::LeaveRoom(_) => {
            state
                .leave_room_usecase
                .execute(&room_id, user_id, Some(connection_id))
                .await
                .map_err(|e| e.to_string())?;
        }
        ClientEvent::AddItem(payload) => {
            state
                .add_queue_item_usecase
                .execute(&room_id, user_id, payload.video_id, payload.title)
                .await
                .map_err(|e| e.to_string())?;
        }
        ClientEvent::RemoveItem(payload) => {
            let item_id = ItemId::new(payload.item_id).map_err(|e| e.to_string())?;
            state
                .remove_queue_item_usecase
                .execute(&room_id, user_id, &item_id)
                .await
                .map_err(|e| e.to_string())?;
        }
        ClientEvent::Reorder(payload) => {
            state
                .reorder_queue_usecase
                .execute(&room_id, user_id, payload.source_index, payload.dest_index)
                .await
                .map_err(|e| e.to_string())?;
        }
        ClientEvent::Skip(_) => {
            state
                .advance_queue_usecase
                .execute(&room_id, user_id, AdvanceReason::Skip)
                .await
                .map_err(|e| e.to_string())?;
        }
        ClientEvent::ItemEnded(payload) => {
            let item_id = ItemId::new(payload.item_id).map_err(|e| e.to_string())?;
            state
                .advance_queue_usecase
                .execute(&room_id, user_id, AdvanceReason::ItemEnded(item_id))
                .await
                .map_err(|e| e.to_string())?;
        }
        ClientEvent::PlayerCommand(payload) => {
            state
                .relay_player_command_usecase
                .execute(&room_id, user_id, PlayerAction::from(&payload))
                .await
                .map_err(|e| e.to_string())?;
        }
        ClientEvent::CloseRoom(_) => {
            state
                .close_room_usecase
                .execute(&room_id, user_id)
                .await
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}
