//! Auto-complete sweeper
//!
//! Closes sessions that stayed open past their threshold (60 minutes, or 75
//! once an extension was granted). Each sweep is idempotent: the update is
//! guarded by `completed = 0`, so a session closed in the meantime, by the
//! counselor or an earlier sweep, is left untouched.

use chrono::{DateTime, Local};
use counsel_config::SweeperPolicy;
use counsel_store::{AuditEventType, Store};
use counsel_util::{ClockTime, Result, SessionId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{record_audit, CoreEvent};

/// What a single sweep did
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Active sessions looked at
    pub examined: usize,
    /// Sessions this sweep closed
    pub auto_completed: Vec<SessionId>,
    /// Overdue sessions that were closed by someone else first
    pub lost_races: usize,
    /// Sessions closed a day or more after entry; their stored exit time
    /// cannot express the real duration
    pub wrapped_durations: usize,
    pub events: Vec<CoreEvent>,
}

pub struct AutoCompleteSweeper {
    store: Arc<dyn Store>,
    policy: SweeperPolicy,
}

impl AutoCompleteSweeper {
    pub fn new(store: Arc<dyn Store>, policy: SweeperPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &SweeperPolicy {
        &self.policy
    }

    /// Run one pass over every active session
    pub fn sweep(&self, now: DateTime<Local>) -> Result<SweepReport> {
        let active = self.store.list_active_sessions()?;
        let now_naive = now.naive_local();
        let exit_time = ClockTime::from_naive_time(now.time());

        let mut report = SweepReport {
            examined: active.len(),
            ..Default::default()
        };

        for session in active {
            let elapsed =
                counsel_util::elapsed_minutes(session.session_date, session.entry_time, now_naive);
            let threshold = self.policy.threshold_for(session.extension_granted);
            if elapsed < i64::from(threshold) {
                continue;
            }

            let changed = self.store.auto_complete_session(
                &session.id,
                exit_time,
                &self.policy.audit_banner,
                now,
            )?;

            if changed == 0 {
                debug!(session_id = %session.id, "Auto-complete lost race to another completion");
                report.lost_races += 1;
                continue;
            }

            record_audit(
                self.store.as_ref(),
                AuditEventType::SessionAutoCompleted {
                    session_id: session.id.clone(),
                    elapsed_minutes: elapsed,
                    threshold_minutes: threshold,
                },
            );

            info!(
                session_id = %session.id,
                elapsed_minutes = elapsed,
                threshold_minutes = threshold,
                extended = session.extension_granted,
                "Session auto-completed"
            );

            if elapsed >= counsel_util::MINUTES_PER_DAY {
                warn!(
                    session_id = %session.id,
                    elapsed_minutes = elapsed,
                    "Session auto-completed a day or more after entry, stored duration will wrap"
                );
                report.wrapped_durations += 1;
            }

            report.events.push(CoreEvent::SessionCompleted {
                session_id: session.id.clone(),
                exit_time,
                auto_completed: true,
            });
            report.auto_completed.push(session.id);
        }

        Ok(report)
    }

    /// Sweep on a fixed interval until `shutdown` flips to true.
    ///
    /// Events of closed sessions are forwarded on `events`. A failed sweep is
    /// logged and retried on the next tick.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        events: mpsc::UnboundedSender<CoreEvent>,
    ) {
        let mut ticker = tokio::time::interval(self.policy.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_secs = self.policy.interval.as_secs(),
            threshold_minutes = self.policy.threshold_minutes,
            extended_threshold_minutes = self.policy.extended_threshold_minutes,
            "Auto-complete sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep(counsel_util::now()) {
                        Ok(report) => {
                            if !report.auto_completed.is_empty() || report.lost_races > 0 {
                                debug!(
                                    examined = report.examined,
                                    closed = report.auto_completed.len(),
                                    lost_races = report.lost_races,
                                    "Sweep finished"
                                );
                            }
                            for event in report.events {
                                let _ = events.send(event);
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Sweep failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Auto-complete sweeper stopped");
    }
}
