//! Domain entities.

use serde::{Deserialize, Serialize};

use super::{
    error::TransitionError,
    value_object::{ItemId, RoomId, Timestamp, UserId, VideoId, WorkerId},
};

// ========================================
// Room / Participant
// ========================================

/// Per-room behaviour switches chosen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// Viewers may issue player commands and skip
    pub allow_guest_control: bool,
    /// Start the first validated item automatically when nothing is playing
    pub auto_play: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            allow_guest_control: false,
            auto_play: true,
        }
    }
}

/// A collaborative session owned by its host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub host_id: UserId,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub last_active: Timestamp,
    pub settings: RoomSettings,
}

impl Room {
    pub fn new(
        id: RoomId,
        name: String,
        host_id: UserId,
        settings: RoomSettings,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            name,
            host_id,
            is_active: true,
            created_at,
            last_active: created_at,
            settings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Host,
    Viewer,
}

/// Membership of a user in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: Role,
    pub joined_at: Timestamp,
}

impl Participant {
    pub fn new(room_id: RoomId, user_id: UserId, role: Role, joined_at: Timestamp) -> Self {
        Self {
            room_id,
            user_id,
            role,
            joined_at,
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

// ========================================
// QueueItem
// ========================================

/// Validation pipeline status, owned by the queue workers.
///
/// ```text
/// PENDING -> PROCESSING -> COMPLETED
///                       -> ERROR
/// ```
///
/// `PROCESSING -> PROCESSING` is accepted so a redelivered job can resume an
/// item whose previous worker died mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl QueueItemStatus {
    pub fn can_transition_to(self, next: QueueItemStatus) -> bool {
        use QueueItemStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueueItemStatus::Completed | QueueItemStatus::Error)
    }
}

/// Playback status, owned by the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackStatus {
    Queued,
    Playing,
    Played,
}

impl PlaybackStatus {
    pub fn can_transition_to(self, next: PlaybackStatus) -> bool {
        use PlaybackStatus::*;
        matches!(
            (self, next),
            (Queued, Playing) | (Playing, Played) | (Queued, Played)
        )
    }
}

/// One candidate piece of media and its processing/playback status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub room_id: RoomId,
    pub video_id: VideoId,
    pub title: Option<String>,
    pub added_by_id: UserId,
    /// Dense rank within the room (0..n-1)
    pub position: usize,
    pub status: QueueItemStatus,
    pub playback: PlaybackStatus,
    pub duration_seconds: Option<u32>,
    pub error_message: Option<String>,
    pub added_at: Timestamp,
}

impl QueueItem {
    /// A freshly added item. Its position is assigned by the repository.
    pub fn new(
        room_id: RoomId,
        video_id: VideoId,
        title: Option<String>,
        added_by_id: UserId,
        added_at: Timestamp,
    ) -> Self {
        Self {
            id: ItemId::generate(),
            room_id,
            video_id,
            title,
            added_by_id,
            position: 0,
            status: QueueItemStatus::Pending,
            playback: PlaybackStatus::Queued,
            duration_seconds: None,
            error_message: None,
            added_at,
        }
    }

    pub fn transition_to(&mut self, next: QueueItemStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Status {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn begin_processing(&mut self) -> Result<(), TransitionError> {
        self.transition_to(QueueItemStatus::Processing)
    }

    pub fn complete(&mut self, title: String, duration_seconds: u32) -> Result<(), TransitionError> {
        self.transition_to(QueueItemStatus::Completed)?;
        self.title = Some(title);
        self.duration_seconds = Some(duration_seconds);
        self.error_message = None;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition_to(QueueItemStatus::Error)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Host skip: ends playback and forces the pipeline status to COMPLETED
    /// regardless of stage. An ERROR item keeps its error.
    pub fn force_complete(&mut self) {
        self.playback = PlaybackStatus::Played;
        if self.status != QueueItemStatus::Error {
            self.status = QueueItemStatus::Completed;
        }
    }

    pub fn set_playback(&mut self, next: PlaybackStatus) -> Result<(), TransitionError> {
        if !self.playback.can_transition_to(next) {
            return Err(TransitionError::Playback {
                from: self.playback,
                to: next,
            });
        }
        self.playback = next;
        Ok(())
    }

    /// Validated and not yet played
    pub fn is_playable(&self) -> bool {
        self.status == QueueItemStatus::Completed && self.playback == PlaybackStatus::Queued
    }

    pub fn is_playing(&self) -> bool {
        self.playback == PlaybackStatus::Playing
    }
}

// ========================================
// Player
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerCommand {
    Play,
    Pause,
    Seek,
}

/// A transport command as issued by a client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub command: PlayerCommand,
    /// Position in seconds. Required for `seek`, optional otherwise.
    pub time: Option<f64>,
}

impl PlayerAction {
    /// Start the current item from the beginning
    pub fn play_from_start() -> Self {
        Self {
            command: PlayerCommand::Play,
            time: Some(0.0),
        }
    }

    /// Stop the player once the queue has nothing left to play
    pub fn stop() -> Self {
        Self {
            command: PlayerCommand::Pause,
            time: Some(0.0),
        }
    }
}

/// Room-owned playback position; last command wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Position at `updated_at`
    pub position_seconds: f64,
    pub updated_at: Timestamp,
}

impl PlaybackState {
    pub fn new(now: Timestamp) -> Self {
        Self {
            is_playing: false,
            position_seconds: 0.0,
            updated_at: now,
        }
    }

    /// Position extrapolated to `now` while playing.
    pub fn current_time(&self, now: Timestamp) -> f64 {
        if self.is_playing {
            self.position_seconds + self.updated_at.elapsed_until(now) as f64 / 1000.0
        } else {
            self.position_seconds
        }
    }

    pub fn apply(&mut self, action: &PlayerAction, now: Timestamp) {
        let position = action
            .time
            .map(|t| t.max(0.0))
            .unwrap_or_else(|| self.current_time(now));
        match action.command {
            PlayerCommand::Play => self.is_playing = true,
            PlayerCommand::Pause => self.is_playing = false,
            PlayerCommand::Seek => {}
        }
        self.position_seconds = position;
        self.updated_at = now;
    }
}

// ========================================
// Job / Worker
// ========================================

/// Envelope of one unit of validation work. Delivery is at-least-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub item_id: ItemId,
    pub room_id: RoomId,
    pub video_id: VideoId,
    /// Transient-failure retries already spent on this job
    #[serde(default)]
    pub attempt: u32,
}

impl Job {
    pub fn for_item(item: &QueueItem) -> Self {
        Self {
            item_id: item.id.clone(),
            room_id: item.room_id.clone(),
            video_id: item.video_id.clone(),
            attempt: 0,
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMetricsSnapshot {
    pub queue_length: usize,
    /// Jobs per second over the rolling window
    pub processing_rate: f64,
    /// Failed / attempted over the worker lifetime (0.0..=1.0)
    pub error_rate: f64,
}

/// Heartbeat record a worker keeps alive in the shared store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub start_time: Timestamp,
    pub last_heartbeat: Timestamp,
    pub status: WorkerStatus,
    pub metrics: WorkerMetricsSnapshot,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, now: Timestamp) -> Self {
        Self {
            id,
            start_time: now,
            last_heartbeat: now,
            status: WorkerStatus::Active,
            metrics: WorkerMetricsSnapshot::default(),
        }
    }

    /// Active and heard from within `heartbeat_timeout_ms`
    pub fn is_live(&self, now: Timestamp, heartbeat_timeout_ms: i64) -> bool {
        self.status == WorkerStatus::Active
            && self.last_heartbeat.elapsed_until(now) < heartbeat_timeout_ms
    }
}
