//! Domain-level error types.

use thiserror::Error;

use super::entity::{PlaybackStatus, QueueItemStatus};

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("room id must not be empty")]
    EmptyRoomId,
    #[error("user id must not be empty")]
    EmptyUserId,
    #[error("user id is too long ({0} bytes)")]
    UserIdTooLong(usize),
    #[error("item id must not be empty")]
    EmptyItemId,
    #[error("worker id must not be empty")]
    EmptyWorkerId,
    #[error("invalid video id: '{0}'")]
    InvalidVideoId(String),
}

/// Errors raised by the persistence collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("queue item not found: {0}")]
    ItemNotFound(String),
    #[error("participant '{user_id}' not found in room {room_id}")]
    ParticipantNotFound { room_id: String, user_id: String },
    #[error("position {index} is out of range for a queue of {len} items")]
    PositionOutOfRange { index: usize, len: usize },
    #[error("position rewrite does not match the stored queue of room {0}")]
    PositionMismatch(String),
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the shared coordination store (job queue, heartbeats, windows)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store payload could not be decoded: {0}")]
    Serialization(String),
}

/// Errors raised while pushing events to connections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),
    #[error("failed to push message: {0}")]
    PushFailed(String),
    #[error("room channel is closed: {0}")]
    RoomClosed(String),
}

/// Errors raised by the external metadata provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("video not found: {0}")]
    NotFound(String),
    #[error("metadata lookup timed out")]
    Timeout,
    #[error("metadata provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed metadata response: {0}")]
    Malformed(String),
}

/// Illegal state machine moves
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal status transition {from:?} -> {to:?}")]
    Status {
        from: QueueItemStatus,
        to: QueueItemStatus,
    },
    #[error("illegal playback transition {from:?} -> {to:?}")]
    Playback {
        from: PlaybackStatus,
        to: PlaybackStatus,
    },
}
