//! Store trait definitions

use chrono::{DateTime, Local, NaiveDate};
use counsel_api::{CompletionInput, Session, SessionFilter, SessionType, StudentRecord};
use counsel_util::{ClockTime, SessionId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
///
/// Lifecycle writes return the number of rows they changed. Guarded writes
/// report 0 when their precondition no longer holds; callers decide what
/// that means.
pub trait Store: Send + Sync {
    // Sessions

    /// Insert a session together with its participant links, atomically
    fn insert_session(&self, session: &Session) -> StoreResult<()>;

    /// Load one session with its participants
    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    fn session_exists(&self, id: &SessionId) -> StoreResult<bool>;

    /// Manual completion, guarded by `completed = 0`
    fn complete_session(
        &self,
        id: &SessionId,
        exit_time: ClockTime,
        completion: &CompletionInput,
        at: DateTime<Local>,
    ) -> StoreResult<usize>;

    /// Automatic completion, guarded by `completed = 0`.
    /// Appends `banner` to the detailed notes.
    fn auto_complete_session(
        &self,
        id: &SessionId,
        exit_time: ClockTime,
        banner: &str,
        at: DateTime<Local>,
    ) -> StoreResult<usize>;

    /// Set the extension flag, guarded by `extension_granted = 0`
    fn grant_extension(&self, id: &SessionId, at: DateTime<Local>) -> StoreResult<usize>;

    /// Delete a session; participant links cascade
    fn delete_session(&self, id: &SessionId) -> StoreResult<usize>;

    /// Every session with `completed = 0`
    fn list_active_sessions(&self) -> StoreResult<Vec<ActiveSession>>;

    /// Sessions matching `filter`, newest first
    fn query_sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<Session>>;

    // Analytics reads

    fn count_sessions(&self) -> StoreResult<u64>;

    /// Timing rows, optionally restricted to an inclusive date range
    fn session_timings(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> StoreResult<Vec<SessionTiming>>;

    /// Session counts grouped by a categorical column
    fn count_by(&self, field: CategoryField) -> StoreResult<Vec<(String, u64)>>;

    /// Distinct `(session, class)` pairs; the class is `None` when the
    /// participant has no directory row or no class
    fn session_classes(&self) -> StoreResult<Vec<(SessionId, Option<String>)>>;

    // Student directory

    fn upsert_student(&self, student: &StudentRecord) -> StoreResult<()>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// The fields the sweeper needs to judge an open session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub id: SessionId,
    pub session_date: NaiveDate,
    pub entry_time: ClockTime,
    pub extension_granted: bool,
}

/// Lightweight row for counting and duration statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTiming {
    pub id: SessionId,
    pub session_type: SessionType,
    pub session_date: NaiveDate,
    pub entry_time: ClockTime,
    pub exit_time: Option<ClockTime>,
    pub completed: bool,
}

impl SessionTiming {
    /// Minutes from entry to exit; `None` while the session is active
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.completed, self.exit_time) {
            (true, Some(exit)) => Some(counsel_util::session_duration_minutes(
                self.session_date,
                self.entry_time,
                exit,
            )),
            _ => None,
        }
    }
}

/// Categorical session columns that analytics may group by.
///
/// Column names are fixed here and never taken from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryField {
    Topic,
    ParticipantType,
    SessionMode,
}

impl CategoryField {
    pub fn column(&self) -> &'static str {
        match self {
            CategoryField::Topic => "topic",
            CategoryField::ParticipantType => "participant_type",
            CategoryField::SessionMode => "session_mode",
        }
    }
}
