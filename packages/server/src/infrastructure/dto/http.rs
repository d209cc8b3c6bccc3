//! HTTP API request / response DTOs.

use serde::{Deserialize, Serialize};

use super::websocket::QueueItemDto;
use crate::domain::RoomSettings;

/// Body of `POST /api/rooms`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: Option<RoomSettings>,
}

/// Room summary for list API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummaryDto {
    pub id: String,
    pub name: String,
    pub host_id: String,
    pub is_active: bool,
    pub settings: RoomSettings,
    pub created_at: String,
    pub last_active: String,
}

/// Participant detail information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDetailDto {
    pub user_id: String,
    /// HOST / VIEWER
    pub role: String,
    pub joined_at: String,
}

/// Room detail for detail API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetailDto {
    #[serde(flatten)]
    pub room: RoomSummaryDto,
    pub participants: Vec<ParticipantDetailDto>,
    pub items: Vec<QueueItemDto>,
}

/// Body of `POST /api/rooms/{room_id}/queue`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub video_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Body of `POST /api/rooms/{room_id}/queue/reorder`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub source_index: usize,
    pub dest_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueResponse {
    pub items: Vec<QueueItemDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetricsDto {
    pub queue_length: usize,
    pub active_workers: usize,
    pub error_rate: f64,
    pub processing_rate: f64,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub metrics: HealthMetricsDto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
