//! Repository 実装
//!
//! - `inmemory`: HashMap を使ったインメモリ実装
//! - 将来的に: PostgreSQL など

pub mod inmemory;

pub use inmemory::{InMemoryQueueItemRepository, InMemoryRoomRepository};
