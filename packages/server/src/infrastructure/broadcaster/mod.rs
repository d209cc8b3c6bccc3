//! ルームへのイベント配信の実装
//!
//! - `websocket`: WebSocket 接続の sender をルームごとのアクターで管理する実装

pub mod websocket;

pub use websocket::WebSocketRoomBroadcaster;
