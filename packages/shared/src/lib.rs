//! Utilities shared by the Utage server binaries and tests.

pub mod logger;
pub mod time;
