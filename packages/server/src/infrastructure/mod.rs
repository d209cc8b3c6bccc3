//! Infrastructure layer: concrete implementations of the domain interfaces.

pub mod broadcaster;
pub mod dto;
pub mod metadata;
pub mod repository;
pub mod store;
