//! Session data model shared by the store, the core and IPC clients

use chrono::{DateTime, Local, NaiveDate};
use counsel_util::{ClockTime, CounselorId, SessionId, StudentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stored string did not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Individual or group counseling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Individual,
    Group,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Individual => "individual",
            SessionType::Group => "group",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "individual" => Ok(SessionType::Individual),
            "group" => Ok(SessionType::Group),
            other => Err(UnknownVariant {
                kind: "session type",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle state derived from the stored flags.
///
/// `Active -> Completed` (manual) or `Active -> AutoCompleted` (sweep).
/// Both completed states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Completed,
    AutoCompleted,
}

impl SessionState {
    pub fn from_flags(completed: bool, auto_completed: bool) -> Self {
        match (completed, auto_completed) {
            (false, _) => SessionState::Active,
            (true, false) => SessionState::Completed,
            (true, true) => SessionState::AutoCompleted,
        }
    }
}

/// Post-session evaluation, recorded when a session is completed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionEvaluation {
    pub session_flow: Option<String>,
    pub student_participation_level: Option<String>,
    pub cooperation_level: Option<String>,
    pub emotional_state: Option<String>,
    pub physical_state: Option<String>,
    pub communication_quality: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub achieved_outcomes: Vec<String>,
    #[serde(default)]
    pub follow_up_needed: bool,
    pub follow_up_plan: Option<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    pub detailed_notes: Option<String>,
}

/// Input for starting a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub counselor_id: CounselorId,
    pub session_type: SessionType,
    /// Required for group sessions
    pub group_name: Option<String>,
    pub participant_type: String,
    pub relationship_type: Option<String>,
    pub topic: String,
    /// Defaults to today
    pub session_date: Option<NaiveDate>,
    /// Defaults to the current time
    pub entry_time: Option<ClockTime>,
    pub entry_period_id: Option<i64>,
    pub entry_hour: Option<String>,
    pub session_mode: String,
    pub session_location: String,
    pub discipline_status: Option<String>,
    pub institutional_cooperation: Option<String>,
    pub session_details: Option<String>,
}

/// Input for manually completing a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionInput {
    /// Defaults to the current time
    pub exit_time: Option<ClockTime>,
    pub exit_period_id: Option<i64>,
    pub exit_hour: Option<String>,
    #[serde(default)]
    pub evaluation: SessionEvaluation,
}

/// A counseling session as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub counselor_id: CounselorId,

    pub session_type: SessionType,
    pub group_name: Option<String>,
    pub participant_type: String,
    pub relationship_type: Option<String>,
    pub topic: String,

    pub session_date: NaiveDate,
    pub entry_time: ClockTime,
    /// Set iff `completed`
    pub exit_time: Option<ClockTime>,
    pub entry_period_id: Option<i64>,
    pub entry_hour: Option<String>,
    pub exit_period_id: Option<i64>,
    pub exit_hour: Option<String>,

    pub session_mode: String,
    pub session_location: String,
    pub discipline_status: Option<String>,
    pub institutional_cooperation: Option<String>,
    pub session_details: Option<String>,

    pub evaluation: SessionEvaluation,

    pub completed: bool,
    pub auto_completed: bool,
    pub extension_granted: bool,

    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,

    pub participants: Vec<StudentId>,
}

impl Session {
    pub fn state(&self) -> SessionState {
        SessionState::from_flags(self.completed, self.auto_completed)
    }

    /// Minutes from entry to exit; `None` while the session is active
    pub fn duration_minutes(&self) -> Option<i64> {
        self.exit_time.map(|exit| {
            counsel_util::session_duration_minutes(self.session_date, self.entry_time, exit)
        })
    }
}

/// A student as known to the external student directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub name: String,
    pub class_name: Option<String>,
}

/// Predicates for listing sessions. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFilter {
    /// Inclusive
    pub start_date: Option<NaiveDate>,
    /// Inclusive
    pub end_date: Option<NaiveDate>,
    /// Case-insensitive substring match
    pub topic: Option<String>,
    /// Matches sessions with at least one participant in this class
    pub class_name: Option<String>,
    pub completed: Option<bool>,
    pub participant_type: Option<String>,
    pub session_type: Option<SessionType>,
    pub session_mode: Option<String>,
    pub student_id: Option<StudentId>,
    pub limit: Option<u32>,
}

impl SessionFilter {
    /// Whether any predicate has to look through participant links
    pub fn needs_participant_join(&self) -> bool {
        self.class_name.is_some() || self.student_id.is_some()
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub sweeper_running: bool,
}
