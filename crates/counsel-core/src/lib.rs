//! Session lifecycle and reporting for counseld
//!
//! This crate is the heart of counseld, containing:
//! - Lifecycle controller (start, complete, extend, delete)
//! - Session state machine (Active -> Completed | AutoCompleted)
//! - Auto-complete sweeper for sessions left open past their threshold
//! - Analytics over stored sessions

mod analytics;
mod engine;
mod events;
mod sweeper;

pub use analytics::*;
pub use engine::*;
pub use events::*;
pub use sweeper::*;

use counsel_store::{AuditEvent, AuditEventType, Store};
use tracing::warn;

/// Append an audit entry. Failures are logged and never fail the caller.
pub(crate) fn record_audit(store: &dyn Store, event: AuditEventType) {
    if let Err(e) = store.append_audit(AuditEvent::new(event)) {
        warn!(error = %e, "Failed to append audit event");
    }
}
