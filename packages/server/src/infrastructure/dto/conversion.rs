//! Conversion logic from domain entities to DTOs.

use utage_shared::time::timestamp_to_rfc3339;

use crate::domain::{
    Participant, PlaybackState, PlaybackStatus, PlayerAction, QueueItem, QueueItemStatus,
    QueueUpdateKind, Role, Room, RoomEvent, RoomId, Timestamp,
};
use crate::infrastructure::dto::{
    http::{
        HealthMetricsDto, HealthResponse, HealthStatus, ParticipantDetailDto, RoomSummaryDto,
    },
    websocket::{
        ErrorPayload, PlayerCommandPayload, PlayerStateDto, QueueItemDto, QueueUpdateType,
        QueueUpdatedPayload, RoomRef, RoomSnapshotPayload, ServerEvent,
    },
};
use crate::usecase::HealthReport;

fn status_label(status: QueueItemStatus) -> &'static str {
    match status {
        QueueItemStatus::Pending => "PENDING",
        QueueItemStatus::Processing => "PROCESSING",
        QueueItemStatus::Completed => "COMPLETED",
        QueueItemStatus::Error => "ERROR",
    }
}

fn playback_label(playback: PlaybackStatus) -> &'static str {
    match playback {
        PlaybackStatus::Queued => "QUEUED",
        PlaybackStatus::Playing => "PLAYING",
        PlaybackStatus::Played => "PLAYED",
    }
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&QueueItem> for QueueItemDto {
    fn from(model: &QueueItem) -> Self {
        Self {
            id: model.id.as_str().to_string(),
            room_id: model.room_id.as_str().to_string(),
            video_id: model.video_id.as_str().to_string(),
            title: model.title.clone(),
            added_by_id: model.added_by_id.as_str().to_string(),
            position: model.position,
            status: status_label(model.status).to_string(),
            playback: playback_label(model.playback).to_string(),
            duration: model.duration_seconds,
            error_message: model.error_message.clone(),
            added_at: timestamp_to_rfc3339(model.added_at.value()),
        }
    }
}

impl From<&Room> for RoomSummaryDto {
    fn from(model: &Room) -> Self {
        Self {
            id: model.id.as_str().to_string(),
            name: model.name.clone(),
            host_id: model.host_id.as_str().to_string(),
            is_active: model.is_active,
            settings: model.settings,
            created_at: timestamp_to_rfc3339(model.created_at.value()),
            last_active: timestamp_to_rfc3339(model.last_active.value()),
        }
    }
}

impl From<&Participant> for ParticipantDetailDto {
    fn from(model: &Participant) -> Self {
        let role = match model.role {
            Role::Host => "HOST",
            Role::Viewer => "VIEWER",
        };
        Self {
            user_id: model.user_id.as_str().to_string(),
            role: role.to_string(),
            joined_at: timestamp_to_rfc3339(model.joined_at.value()),
        }
    }
}

/// Ordered queue → DTO list
pub fn queue_to_dto(items: &[QueueItem]) -> Vec<QueueItemDto> {
    items.iter().map(QueueItemDto::from).collect()
}

impl From<QueueUpdateKind> for QueueUpdateType {
    fn from(kind: QueueUpdateKind) -> Self {
        match kind {
            QueueUpdateKind::Add => QueueUpdateType::Add,
            QueueUpdateKind::Remove => QueueUpdateType::Remove,
            QueueUpdateKind::Update => QueueUpdateType::Update,
            QueueUpdateKind::Reorder => QueueUpdateType::Reorder,
        }
    }
}

// ========================================
// Room events → ServerEvent
// ========================================

/// `queue-updated` / `error` for a room
pub fn room_event_to_server_event(room_id: &RoomId, event: &RoomEvent) -> ServerEvent {
    match event {
        RoomEvent::QueueUpdated { kind, items } => ServerEvent::QueueUpdated(QueueUpdatedPayload {
            r#type: QueueUpdateType::from(*kind),
            room_id: room_id.as_str().to_string(),
            items: queue_to_dto(items),
        }),
        RoomEvent::Error { message, item_id } => ServerEvent::Error(ErrorPayload {
            message: message.clone(),
            item_id: item_id.as_ref().map(|id| id.as_str().to_string()),
        }),
    }
}

pub fn player_command_event(room_id: &RoomId, action: &PlayerAction) -> ServerEvent {
    ServerEvent::PlayerCommand(PlayerCommandPayload {
        room_id: room_id.as_str().to_string(),
        command: action.command,
        time: action.time,
    })
}

/// Snapshot pushed to a joining connection
pub fn room_snapshot_event(
    room_id: &RoomId,
    items: &[QueueItem],
    playback: &PlaybackState,
    now: Timestamp,
) -> ServerEvent {
    ServerEvent::RoomSnapshot(RoomSnapshotPayload {
        room_id: room_id.as_str().to_string(),
        items: queue_to_dto(items),
        current_item: items.iter().find(|item| item.is_playing()).map(QueueItemDto::from),
        player: PlayerStateDto {
            is_playing: playback.is_playing,
            current_time: playback.current_time(now),
        },
    })
}

pub fn room_closed_event(room_id: &RoomId) -> ServerEvent {
    ServerEvent::RoomClosed(RoomRef {
        room_id: room_id.as_str().to_string(),
    })
}

/// Health aggregation → response body
impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            status: if report.healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            metrics: HealthMetricsDto {
                queue_length: report.queue_length,
                active_workers: report.active_workers,
                error_rate: report.error_rate,
                processing_rate: report.processing_rate,
            },
            reason: report.reason,
        }
    }
}

// ========================================
// DTO → Domain
// ========================================

impl From<&PlayerCommandPayload> for PlayerAction {
    fn from(dto: &PlayerCommandPayload) -> Self {
        Self {
            command: dto.command,
            time: dto.time,
        }
    }
}
