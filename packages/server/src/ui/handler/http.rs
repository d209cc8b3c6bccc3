//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    domain::{ItemId, RoomId},
    infrastructure::dto::{
        conversion::queue_to_dto,
        http::{
            AddItemRequest, CreateRoomRequest, ParticipantDetailDto, QueueResponse,
            ReorderRequest, RoomDetailDto, RoomSummaryDto,
        },
        websocket::QueueItemDto,
    },
    ui::state::AppState,
    usecase::AdvanceReason,
};

use super::{auth::Caller, error::ApiResult};

/// Liveness probe
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Create a room; the caller becomes its host
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Json(request): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<RoomSummaryDto>)> {
    let room = state
        .create_room_usecase
        .execute(user_id, request.name, request.settings)
        .await?;
    Ok((StatusCode::CREATED, Json(RoomSummaryDto::from(&room))))
}

/// Active rooms the caller participates in
pub async fn get_rooms(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
) -> ApiResult<Json<Vec<RoomSummaryDto>>> {
    let rooms = state.get_rooms_usecase.execute(&user_id).await?;
    Ok(Json(rooms.iter().map(RoomSummaryDto::from).collect()))
}

/// Get room detail by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RoomDetailDto>> {
    let room_id = RoomId::new(room_id)?;
    let detail = state.get_room_detail_usecase.execute(&room_id).await?;

    // Domain Model から DTO への変換
    Ok(Json(RoomDetailDto {
        room: RoomSummaryDto::from(&detail.room),
        participants: detail
            .participants
            .iter()
            .map(ParticipantDetailDto::from)
            .collect(),
        items: queue_to_dto(&detail.items),
    }))
}

pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(room_id): Path<String>,
) -> ApiResult<Json<ParticipantDetailDto>> {
    let room_id = RoomId::new(room_id)?;
    let participant = state.join_room_usecase.execute(&room_id, user_id).await?;
    Ok(Json(ParticipantDetailDto::from(&participant)))
}

pub async fn close_room(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(room_id): Path<String>,
) -> ApiResult<StatusCode> {
    let room_id = RoomId::new(room_id)?;
    state.close_room_usecase.execute(&room_id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<QueueResponse>> {
    let room_id = RoomId::new(room_id)?;
    let items = state.get_room_detail_usecase.queue(&room_id).await?;
    Ok(Json(QueueResponse {
        items: queue_to_dto(&items),
    }))
}

pub async fn add_queue_item(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(room_id): Path<String>,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<(StatusCode, Json<QueueItemDto>)> {
    let room_id = RoomId::new(room_id)?;
    let item = state
        .add_queue_item_usecase
        .execute(&room_id, &user_id, request.video_id, request.title)
        .await?;
    Ok((StatusCode::CREATED, Json(QueueItemDto::from(&item))))
}

pub async fn remove_queue_item(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path((room_id, item_id)): Path<(String, String)>,
) -> ApiResult<Json<QueueItemDto>> {
    let room_id = RoomId::new(room_id)?;
    let item_id = ItemId::new(item_id)?;
    let removed = state
        .remove_queue_item_usecase
        .execute(&room_id, &user_id, &item_id)
        .await?;
    Ok(Json(QueueItemDto::from(&removed)))
}

pub async fn reorder_queue(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(room_id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<Json<QueueResponse>> {
    let room_id = RoomId::new(room_id)?;
    let items = state
        .reorder_queue_usecase
        .execute(&room_id, &user_id, request.source_index, request.dest_index)
        .await?;
    Ok(Json(QueueResponse {
        items: queue_to_dto(&items),
    }))
}

pub async fn skip(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(room_id): Path<String>,
) -> ApiResult<StatusCode> {
    let room_id = RoomId::new(room_id)?;
    state
        .advance_queue_usecase
        .execute(&room_id, &user_id, AdvanceReason::Skip)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
