//! Data model and protocol types for counseld
//!
//! This crate defines the stable API between counseld and its clients:
//! - Session records, start/complete inputs and list filters
//! - Analytics result rows
//! - Commands (requests from clients) and responses
//! - Events (service -> subscribed clients)

mod analytics;
mod commands;
mod events;
mod types;

pub use analytics::*;
pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
