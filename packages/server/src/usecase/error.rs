//! UseCase 層のエラー型

use thiserror::Error;

use crate::domain::{MessagePushError, RepositoryError, StoreError, ValueObjectError};

/// ルーム作成のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateRoomError {
    #[error("room name must not be empty")]
    EmptyName,
    #[error(transparent)]
    InvalidId(#[from] ValueObjectError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// ルーム参加・退出のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinRoomError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("room is closed: {0}")]
    RoomInactive(String),
    #[error("not a participant of room {0}")]
    NotParticipant(String),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Push(#[from] MessagePushError),
}

/// ルーム詳細取得のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GetRoomDetailError {
    #[error("room not found")]
    RoomNotFound,
    #[error("repository error: {0}")]
    RepositoryError(RepositoryError),
}

/// キュー操作（追加・削除・並べ替え・スキップ）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueMutationError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("room is closed: {0}")]
    RoomInactive(String),
    #[error("not a participant of room {0}")]
    NotParticipant(String),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("queue item not found: {0}")]
    ItemNotFound(String),
    #[error("index {index} is out of range for a queue of {len} items")]
    InvalidIndex { index: usize, len: usize },
    #[error(transparent)]
    InvalidInput(#[from] ValueObjectError),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error("failed to enqueue job: {0}")]
    Store(#[from] StoreError),
}

/// ルームを閉じる操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloseRoomError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("only the host can close the room")]
    NotHost,
    #[error(transparent)]
    Repository(RepositoryError),
}

/// 再生コマンドのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerCommandError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("not a participant of room {0}")]
    NotParticipant(String),
    #[error("only the host can control playback in this room")]
    Forbidden,
    #[error("seek requires a time")]
    MissingSeekTime,
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Push(#[from] MessagePushError),
}

/// RoomNotFound を各ユースケースのエラーに振り分ける
macro_rules! impl_from_repository_error {
    ($target:ident) => {
        impl From<RepositoryError> for $target {
            fn from(error: RepositoryError) -> Self {
                match error {
                    RepositoryError::RoomNotFound(id) => $target::RoomNotFound(id),
                    other => $target::Repository(other),
                }
            }
        }
    };
}

impl_from_repository_error!(JoinRoomError);
impl_from_repository_error!(QueueMutationError);
impl_from_repository_error!(CloseRoomError);
impl_from_repository_error!(PlayerCommandError);
