//! Event types for counseld -> client streaming

use chrono::{DateTime, Local, NaiveDate};
use counsel_util::{ClockTime, CounselorId, SessionId};
use serde::{Deserialize, Serialize};

use crate::{SessionType, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: counsel_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients.
///
/// The notification subsystem subscribes to these; nothing it does feeds
/// back into session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SessionStarted {
        session_id: SessionId,
        counselor_id: CounselorId,
        session_type: SessionType,
        topic: String,
        session_date: NaiveDate,
        entry_time: ClockTime,
        participant_count: usize,
    },

    /// Manual or automatic completion
    SessionCompleted {
        session_id: SessionId,
        exit_time: ClockTime,
        auto_completed: bool,
    },

    SessionExtended {
        session_id: SessionId,
    },

    SessionDeleted {
        session_id: SessionId,
    },

    /// Service is shutting down
    Shutdown,
}
