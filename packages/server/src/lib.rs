//! Utage server: collaborative media queue with distributed validation workers.
//!
//! - `domain`: entities, value objects and collaborator interfaces
//! - `infrastructure`: in-memory store and repositories, room broadcaster, metadata clients, DTOs
//! - `usecase`: room and queue operations shared by HTTP and WebSocket
//! - `worker`: queue workers and their supervisor
//! - `ui`: axum server and handlers

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
pub mod worker;
