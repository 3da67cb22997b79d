//! Time utilities for counseld
//!
//! Sessions are recorded as a calendar date plus independent `HH:MM`
//! time-of-day values. All arithmetic goes through [`session_timestamp`],
//! which joins the two into a `NaiveDateTime` first.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `COUNSEL_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is
//! useful for exercising the auto-complete sweep without waiting an hour.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! COUNSEL_MOCK_TIME="2025-12-25 14:30:00" counseld
//! ```

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "COUNSEL_MOCK_TIME";

/// Storage format for calendar dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Exit times are stored without a date, so durations wrap at this length
pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                if let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                        let real_now = chrono::Local::now();
                        let offset = mock_dt.signed_duration_since(real_now);
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    } else {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                } else {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    );
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Error parsing a clock time or calendar date
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}': {message}")]
pub struct TimeParseError {
    pub kind: &'static str,
    pub value: String,
    pub message: String,
}

/// Time of day with minute precision, stored and exchanged as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
            .unwrap_or(NaiveTime::MIN)
    }

    /// Truncates seconds
    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    /// Returns minutes since midnight
    pub fn minutes_from_midnight(&self) -> u32 {
        (self.hour as u32) * 60 + self.minute as u32
    }
}

impl PartialOrd for ClockTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClockTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight().cmp(&other.minutes_from_midnight())
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = TimeParseError;

    /// Accepts `HH:MM` and `HH:MM:SS` (seconds are dropped)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |message: &str| TimeParseError {
            kind: "time",
            value: s.to_string(),
            message: message.to_string(),
        };

        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(err("expected HH:MM"));
        }

        let hour: u8 = parts[0].parse().map_err(|_| err("invalid hour"))?;
        let minute: u8 = parts[1].parse().map_err(|_| err("invalid minute"))?;
        if parts.len() == 3 {
            let second: u8 = parts[2].parse().map_err(|_| err("invalid second"))?;
            if second >= 60 {
                return Err(err("second must be 0-59"));
            }
        }

        if hour >= 24 {
            return Err(err("hour must be 0-23"));
        }
        if minute >= 60 {
            return Err(err("minute must be 0-59"));
        }

        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for ClockTime {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(s: &str) -> Result<NaiveDate, TimeParseError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| TimeParseError {
        kind: "date",
        value: s.to_string(),
        message: e.to_string(),
    })
}

/// Format a calendar date for storage (`YYYY-MM-DD`)
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Join a session date and a time of day into a single timestamp
pub fn session_timestamp(date: NaiveDate, time: ClockTime) -> NaiveDateTime {
    date.and_time(time.to_naive_time())
}

/// Whole minutes from `entry` to `now`; negative when `now` is earlier
pub fn elapsed_minutes(date: NaiveDate, entry: ClockTime, now: NaiveDateTime) -> i64 {
    (now - session_timestamp(date, entry)).num_minutes()
}

/// Minutes between entry and exit of a session held on `date`.
///
/// Exit times earlier than the entry time belong to the following day.
/// Only `HH:MM` is stored for the exit, so a session that ran a day or more
/// reports its duration modulo [`MINUTES_PER_DAY`].
pub fn session_duration_minutes(date: NaiveDate, entry: ClockTime, exit: ClockTime) -> i64 {
    let start = session_timestamp(date, entry);
    let mut end = session_timestamp(date, exit);
    if end < start {
        end += chrono::Duration::days(1);
    }
    (end - start).num_minutes()
}

/// Every calendar day in `[start, end]`, inclusive. Empty if `start > end`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = start;
    while day <= end {
        days.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

/// ISO-8601 week bucket label, e.g. `2024-W01`
pub fn iso_week_label(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Year-month bucket label, e.g. `2024-01`
pub fn month_label(date: NaiveDate) -> String {
    format!("{}-{:02}", date.year(), date.month())
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
}
