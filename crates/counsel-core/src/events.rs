//! Core events emitted by the engine and the sweeper

use chrono::NaiveDate;
use counsel_api::{Session, SessionType};
use counsel_util::{ClockTime, CounselorId, SessionId};

/// Events emitted by the core
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Session row and participant links were written
    SessionStarted {
        session_id: SessionId,
        counselor_id: CounselorId,
        session_type: SessionType,
        topic: String,
        session_date: NaiveDate,
        entry_time: ClockTime,
        participant_count: usize,
    },

    /// Session closed, by the counselor or by the sweeper
    SessionCompleted {
        session_id: SessionId,
        exit_time: ClockTime,
        auto_completed: bool,
    },

    /// Extension flag was set for the first time
    SessionExtended { session_id: SessionId },

    SessionDeleted { session_id: SessionId },
}

impl CoreEvent {
    pub(crate) fn started(session: &Session) -> Self {
        CoreEvent::SessionStarted {
            session_id: session.id.clone(),
            counselor_id: session.counselor_id.clone(),
            session_type: session.session_type,
            topic: session.topic.clone(),
            session_date: session.session_date,
            entry_time: session.entry_time,
            participant_count: session.participants.len(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            CoreEvent::SessionStarted { session_id, .. }
            | CoreEvent::SessionCompleted { session_id, .. }
            | CoreEvent::SessionExtended { session_id }
            | CoreEvent::SessionDeleted { session_id } => session_id,
        }
    }
}
