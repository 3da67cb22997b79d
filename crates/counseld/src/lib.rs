//! counseld service internals
//!
//! Translates protocol commands into lifecycle and analytics calls, and core
//! events into client-facing events. The binary in `main.rs` owns the
//! sockets, signals and the sweeper task.

mod dispatch;

pub use dispatch::*;
