//! Shared coordination store 実装
//!
//! - `inmemory`: プロセス内で共有するインメモリ実装（TTL はクロックで判定）

pub mod inmemory;

pub use inmemory::InMemoryStore;
