//! UI 層: axum による HTTP / WebSocket サーバー

mod handler;
mod server;
mod signal;
pub mod state;

pub use handler::{ApiError, ApiResult, Caller, USER_ID_HEADER};
pub use server::Server;
pub use signal::shutdown_signal;
pub use state::AppState;
