//! Mapping of use case errors to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    domain::{RepositoryError, ValueObjectError},
    infrastructure::dto::http::ErrorResponse,
    usecase::{
        CloseRoomError, CreateRoomError, GetRoomDetailError, JoinRoomError, QueueMutationError,
    },
};

/// Error returned by HTTP handlers as `{"error": message}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "Request failed: {}", self.message);
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<ValueObjectError> for ApiError {
    fn from(error: ValueObjectError) -> Self {
        Self::bad_request(error.to_string())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        let message = error.to_string();
        match error {
            RepositoryError::RoomNotFound(_)
            | RepositoryError::ItemNotFound(_)
            | RepositoryError::ParticipantNotFound { .. } => Self::not_found(message),
            RepositoryError::PositionOutOfRange { .. } => Self::bad_request(message),
            RepositoryError::PositionMismatch(_) => Self::conflict(message),
            RepositoryError::Unavailable(_) => Self::unavailable(message),
        }
    }
}

impl From<CreateRoomError> for ApiError {
    fn from(error: CreateRoomError) -> Self {
        match error {
            CreateRoomError::Repository(e) => e.into(),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<GetRoomDetailError> for ApiError {
    fn from(error: GetRoomDetailError) -> Self {
        match error {
            GetRoomDetailError::RoomNotFound => Self::not_found("room not found"),
            GetRoomDetailError::RepositoryError(e) => e.into(),
        }
    }
}

impl From<JoinRoomError> for ApiError {
    fn from(error: JoinRoomError) -> Self {
        let message = error.to_string();
        match error {
            JoinRoomError::RoomNotFound(_) => Self::not_found(message),
            JoinRoomError::RoomInactive(_) => Self::conflict(message),
            JoinRoomError::NotParticipant(_) => Self::forbidden(message),
            JoinRoomError::Repository(e) => e.into(),
            JoinRoomError::Push(_) => Self::internal(message),
        }
    }
}

impl From<QueueMutationError> for ApiError {
    fn from(error: QueueMutationError) -> Self {
        let message = error.to_string();
        match error {
            QueueMutationError::RoomNotFound(_) | QueueMutationError::ItemNotFound(_) => {
                Self::not_found(message)
            }
            QueueMutationError::RoomInactive(_) => Self::conflict(message),
            QueueMutationError::NotParticipant(_) | QueueMutationError::Forbidden(_) => {
                Self::forbidden(message)
            }
            QueueMutationError::InvalidIndex { .. } | QueueMutationError::InvalidInput(_) => {
                Self::bad_request(message)
            }
            QueueMutationError::Repository(e) => e.into(),
            QueueMutationError::Store(_) => Self::unavailable(message),
        }
    }
}

impl From<CloseRoomError> for ApiError {
    fn from(error: CloseRoomError) -> Self {
        let message = error.to_string();
        match error {
            CloseRoomError::RoomNotFound(_) => Self::not_found(message),
            CloseRoomError::NotHost => Self::forbidden(message),
            CloseRoomError::Repository(e) => e.into(),
        }
    }
}
