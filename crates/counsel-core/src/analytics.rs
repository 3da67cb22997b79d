//! Analytics over stored sessions
//!
//! Everything here is read-only. Durations are derived from parsed
//! `(date, time)` pairs, never from stored totals.

use chrono::{Datelike, NaiveDate};
use counsel_api::{
    CategoryCount, OverallStats, SessionFilter, SessionType, StudentSessionEntry,
    StudentSessionStats, TimeSeriesPeriod, TimeSeriesPoint, UNSPECIFIED_CLASS,
};
use counsel_store::{CategoryField, Store};
use counsel_util::{CounselError, Result, SessionId, StudentId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round1(part as f64 * 100.0 / total as f64)
    }
}

/// Count desc, then label asc
fn into_categories(counts: impl IntoIterator<Item = (String, u64)>, total: u64) -> Vec<CategoryCount> {
    let mut categories: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(label, count)| CategoryCount {
            percentage: percentage(count, total),
            label,
            count,
        })
        .collect();
    categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    categories
}

#[derive(Default, Clone, Copy)]
struct Bucket {
    count: u64,
    completed: u64,
}

impl Bucket {
    fn add(&mut self, completed: bool) {
        self.count += 1;
        if completed {
            self.completed += 1;
        }
    }
}

/// Longest range a daily series may cover, about ten years
pub const MAX_DAILY_SERIES_DAYS: i64 = 3660;

/// Read-only aggregator
pub struct Analytics {
    store: Arc<dyn Store>,
}

impl Analytics {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Dashboard headline numbers relative to `today`
    pub fn overall_stats(&self, today: NaiveDate) -> Result<OverallStats> {
        let timings = self.store.session_timings(None)?;
        let this_week = counsel_util::week_start(today);

        let mut stats = OverallStats {
            total_sessions: timings.len() as u64,
            ..Default::default()
        };
        let mut durations = Vec::new();
        let mut individual = 0u64;

        for timing in &timings {
            if timing.completed {
                stats.completed_sessions += 1;
            } else {
                stats.active_sessions += 1;
            }

            let date = timing.session_date;
            if date.year() == today.year() && date.month() == today.month() {
                stats.this_month += 1;
            }
            if counsel_util::week_start(date) == this_week {
                stats.this_week += 1;
            }
            if date == today {
                stats.today += 1;
            }

            if timing.session_type == SessionType::Individual {
                individual += 1;
            }

            if let Some(minutes) = timing.duration_minutes() {
                durations.push(minutes);
            }
        }

        if !durations.is_empty() {
            let sum: i64 = durations.iter().sum();
            stats.average_duration_minutes = Some(round1(sum as f64 / durations.len() as f64));
            stats.max_duration_minutes = durations.iter().copied().max();
            stats.min_duration_minutes = durations.iter().copied().min();
        }

        stats.individual_percentage = percentage(individual, stats.total_sessions);
        stats.group_percentage = percentage(stats.total_sessions - individual, stats.total_sessions);

        Ok(stats)
    }

    /// Session counts per period over `[start, end]`.
    ///
    /// Daily series have a row for every day in the range; weekly and
    /// monthly series only list buckets that contain sessions.
    pub fn time_series(
        &self,
        period: TimeSeriesPeriod,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeSeriesPoint>> {
        if start > end {
            return Err(CounselError::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        let span = (end - start).num_days() + 1;
        if period == TimeSeriesPeriod::Daily && span > MAX_DAILY_SERIES_DAYS {
            return Err(CounselError::validation(format!(
                "daily series covers {span} days (at most {MAX_DAILY_SERIES_DAYS})"
            )));
        }

        let timings = self.store.session_timings(Some((start, end)))?;

        let points = match period {
            TimeSeriesPeriod::Daily => {
                let mut by_day: HashMap<NaiveDate, Bucket> = HashMap::new();
                for timing in &timings {
                    by_day.entry(timing.session_date).or_default().add(timing.completed);
                }

                counsel_util::days_inclusive(start, end)
                    .into_iter()
                    .map(|day| {
                        let bucket = by_day.get(&day).copied().unwrap_or_default();
                        TimeSeriesPoint {
                            period: counsel_util::format_date(day),
                            count: bucket.count,
                            completed: bucket.completed,
                        }
                    })
                    .collect()
            }
            TimeSeriesPeriod::Weekly | TimeSeriesPeriod::Monthly => {
                let label = match period {
                    TimeSeriesPeriod::Weekly => counsel_util::iso_week_label,
                    _ => counsel_util::month_label,
                };

                let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
                for timing in &timings {
                    buckets
                        .entry(label(timing.session_date))
                        .or_default()
                        .add(timing.completed);
                }

                buckets
                    .into_iter()
                    .map(|(period, bucket)| TimeSeriesPoint {
                        period,
                        count: bucket.count,
                        completed: bucket.completed,
                    })
                    .collect()
            }
        };

        debug!(?period, %start, %end, sessions = timings.len(), "Time series computed");
        Ok(points)
    }

    fn field_analysis(&self, field: CategoryField) -> Result<Vec<CategoryCount>> {
        let counts = self.store.count_by(field)?;
        let total = self.store.count_sessions()?;
        Ok(into_categories(counts, total))
    }

    pub fn topic_analysis(&self) -> Result<Vec<CategoryCount>> {
        self.field_analysis(CategoryField::Topic)
    }

    pub fn participant_type_analysis(&self) -> Result<Vec<CategoryCount>> {
        self.field_analysis(CategoryField::ParticipantType)
    }

    pub fn session_mode_analysis(&self) -> Result<Vec<CategoryCount>> {
        self.field_analysis(CategoryField::SessionMode)
    }

    /// Sessions per participant class.
    ///
    /// A session counts once for each distinct class among its participants.
    /// Sessions without any known class land in the unspecified bucket.
    pub fn class_analysis(&self) -> Result<Vec<CategoryCount>> {
        let total = self.store.count_sessions()?;

        let mut classified: HashSet<SessionId> = HashSet::new();
        let mut by_class: HashMap<String, u64> = HashMap::new();
        for (session_id, class_name) in self.store.session_classes()? {
            if let Some(class_name) = class_name {
                *by_class.entry(class_name).or_default() += 1;
                classified.insert(session_id);
            }
        }

        let unspecified = total.saturating_sub(classified.len() as u64);
        if unspecified > 0 {
            *by_class.entry(UNSPECIFIED_CLASS.to_string()).or_default() += unspecified;
        }

        Ok(into_categories(by_class, total))
    }

    /// History and rollup for one student, most recent first
    pub fn student_session_stats(&self, student_id: &StudentId) -> Result<StudentSessionStats> {
        let filter = SessionFilter {
            student_id: Some(student_id.clone()),
            ..Default::default()
        };
        let sessions = self.store.query_sessions(&filter)?;

        let mut seen = HashSet::new();
        let topics = sessions
            .iter()
            .filter(|s| seen.insert(s.topic.clone()))
            .map(|s| s.topic.clone())
            .collect();

        let history: Vec<StudentSessionEntry> = sessions
            .iter()
            .map(|s| StudentSessionEntry {
                session_id: s.id.clone(),
                session_date: s.session_date,
                entry_time: s.entry_time,
                exit_time: s.exit_time,
                topic: s.topic.clone(),
                session_type: s.session_type,
                completed: s.completed,
                auto_completed: s.auto_completed,
                duration_minutes: s.duration_minutes().unwrap_or(0),
            })
            .collect();

        Ok(StudentSessionStats {
            student_id: student_id.clone(),
            total_sessions: history.len() as u64,
            last_session_date: history.first().map(|h| h.session_date),
            topics,
            history,
        })
    }
}
