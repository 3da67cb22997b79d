//! Audit event types

use chrono::{DateTime, Local};
use counsel_util::{CounselorId, SessionId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    /// Sweeper policy in effect after (re)load
    PolicyLoaded {
        threshold_minutes: u32,
        extended_threshold_minutes: u32,
    },

    SessionStarted {
        session_id: SessionId,
        counselor_id: CounselorId,
        participant_count: usize,
    },

    /// Closed by the counselor
    SessionCompleted { session_id: SessionId },

    /// Closed by the sweeper
    SessionAutoCompleted {
        session_id: SessionId,
        elapsed_minutes: i64,
        threshold_minutes: u32,
    },

    ExtensionGranted { session_id: SessionId },

    SessionDeleted { session_id: SessionId },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: counsel_util::now(),
            event,
        }
    }
}
