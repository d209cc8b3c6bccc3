//! HTTP and WebSocket handlers.

mod auth;
mod error;
mod health;
mod http;
mod websocket;

pub use auth::{Caller, USER_ID_HEADER};
pub use error::{ApiError, ApiResult};
pub use health::{worker_health, worker_metrics};
pub use http::{
    add_queue_item, close_room, create_room, get_queue, get_room_detail, get_rooms,
    health_check, join_room, remove_queue_item, reorder_queue, skip,
};
pub use websocket::websocket_handler;
