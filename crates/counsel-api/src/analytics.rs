//! Analytics result rows

use chrono::NaiveDate;
use counsel_util::{ClockTime, SessionId, StudentId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{SessionType, UnknownVariant};

/// Bucket label used for sessions whose participants have no known class
pub const UNSPECIFIED_CLASS: &str = "Unspecified";

/// Headline numbers for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_sessions: u64,
    pub active_sessions: u64,
    pub completed_sessions: u64,
    pub this_month: u64,
    pub this_week: u64,
    pub today: u64,
    /// Over completed sessions only
    pub average_duration_minutes: Option<f64>,
    pub max_duration_minutes: Option<i64>,
    pub min_duration_minutes: Option<i64>,
    pub individual_percentage: f64,
    pub group_percentage: f64,
}

/// Granularity of a time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSeriesPeriod {
    /// One row per calendar day, zero-filled
    Daily,
    /// ISO weeks that contain sessions
    Weekly,
    /// Calendar months that contain sessions
    Monthly,
}

impl FromStr for TimeSeriesPeriod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(TimeSeriesPeriod::Daily),
            "weekly" => Ok(TimeSeriesPeriod::Weekly),
            "monthly" => Ok(TimeSeriesPeriod::Monthly),
            other => Err(UnknownVariant {
                kind: "time series period",
                value: other.to_string(),
            }),
        }
    }
}

/// One bucket of a time series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// `YYYY-MM-DD`, `YYYY-Www` or `YYYY-MM` depending on the period
    pub period: String,
    pub count: u64,
    pub completed: u64,
}

/// Count of sessions sharing one categorical value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: u64,
    /// Share of all sessions, 0-100
    pub percentage: f64,
}

/// One row of a student's session history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSessionEntry {
    pub session_id: SessionId,
    pub session_date: NaiveDate,
    pub entry_time: ClockTime,
    pub exit_time: Option<ClockTime>,
    pub topic: String,
    pub session_type: SessionType,
    pub completed: bool,
    pub auto_completed: bool,
    /// 0 while the session is active
    pub duration_minutes: i64,
}

/// Per-student rollup consumed by the early-warning generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSessionStats {
    pub student_id: StudentId,
    pub total_sessions: u64,
    pub last_session_date: Option<NaiveDate>,
    /// Distinct topics, most recent first
    pub topics: Vec<String>,
    /// Most recent first
    pub history: Vec<StudentSessionEntry>,
}
