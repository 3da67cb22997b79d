//! Shared utilities for counseld
//!
//! This crate provides:
//! - ID types (SessionId, StudentId, CounselorId, ClientId)
//! - Time utilities (mock-able clock, HH:MM clock times, date+time arithmetic)
//! - Error types
//! - Default paths for socket, data, and config

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
