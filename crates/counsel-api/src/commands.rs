//! Command types for the counseld protocol

use chrono::NaiveDate;
use counsel_util::{ClientId, SessionId, StudentId};
use serde::{Deserialize, Serialize};

use crate::{
    CategoryCount, CompletionInput, HealthStatus, NewSession, OverallStats, Session,
    SessionFilter, StudentRecord, StudentSessionStats, TimeSeriesPeriod, TimeSeriesPoint,
    API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    ValidationFailed,
    /// Guarded completion matched no active session
    AlreadyCompletedOrNotFound,
    NotFound,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // Lifecycle
    StartSession {
        session: NewSession,
        participant_ids: Vec<StudentId>,
    },
    CompleteSession {
        session_id: SessionId,
        completion: CompletionInput,
    },
    ExtendSession {
        session_id: SessionId,
    },
    DeleteSession {
        session_id: SessionId,
    },

    // Queries
    GetSession {
        session_id: SessionId,
    },
    ListSessions {
        #[serde(default)]
        filter: SessionFilter,
    },

    // Analytics
    GetOverallStats,
    GetTimeSeries {
        period: TimeSeriesPeriod,
        start: NaiveDate,
        end: NaiveDate,
    },
    GetTopicAnalysis,
    GetParticipantTypeAnalysis,
    GetClassAnalysis,
    GetSessionModeAnalysis,
    GetStudentStats {
        student_id: StudentId,
    },

    /// Feed from the student directory
    UpsertStudent {
        student: StudentRecord,
    },

    /// Most recent audit log entries, newest first
    GetRecentAudit {
        limit: usize,
    },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    SessionStarted(Session),
    SessionCompleted(Session),
    SessionExtended {
        session_id: SessionId,
        /// False when the extension had already been granted
        newly_granted: bool,
    },
    SessionDeleted {
        session_id: SessionId,
    },
    Session(Session),
    Sessions {
        sessions: Vec<Session>,
    },
    OverallStats(OverallStats),
    TimeSeries {
        points: Vec<TimeSeriesPoint>,
    },
    Categories {
        categories: Vec<CategoryCount>,
    },
    StudentStats(StudentSessionStats),
    StudentUpserted,
    Audit {
        entries: Vec<serde_json::Value>,
    },
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}
