//! Session lifecycle controller

use chrono::{DateTime, Local};
use counsel_api::{
    CompletionInput, NewSession, Session, SessionEvaluation, SessionFilter, SessionType,
    StudentRecord,
};
use counsel_store::{AuditEventType, Store};
use counsel_util::{ClockTime, CounselError, Result, SessionId, StudentId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{record_audit, CoreEvent};

/// Outcome of a manual completion
#[derive(Debug)]
pub enum CompleteDecision {
    Completed { session: Session, event: CoreEvent },
    /// The guarded update matched no row
    AlreadyCompletedOrNotFound,
}

/// Outcome of an extension request
#[derive(Debug)]
pub enum ExtendDecision {
    Granted(CoreEvent),
    AlreadyGranted,
    NotFound,
}

/// Outcome of a delete request
#[derive(Debug)]
pub enum DeleteDecision {
    Deleted(CoreEvent),
    NotFound,
}

/// Lifecycle controller for counseling sessions
pub struct SessionEngine {
    store: Arc<dyn Store>,
}

impl SessionEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validate and persist a new session with its participants.
    ///
    /// Every validation problem is reported at once; nothing is written
    /// unless the input is valid.
    pub fn start_session(
        &self,
        input: NewSession,
        participant_ids: Vec<StudentId>,
        now: DateTime<Local>,
    ) -> Result<(Session, CoreEvent)> {
        let participants = dedup_participants(participant_ids);
        validate_new_session(&input, &participants)?;

        let group_name = match input.session_type {
            SessionType::Group => input.group_name.map(|g| g.trim().to_string()),
            SessionType::Individual => None,
        };

        let session = Session {
            id: SessionId::new(),
            counselor_id: input.counselor_id,
            session_type: input.session_type,
            group_name,
            participant_type: input.participant_type.trim().to_string(),
            relationship_type: input.relationship_type,
            topic: input.topic.trim().to_string(),
            session_date: input.session_date.unwrap_or_else(|| now.date_naive()),
            entry_time: input
                .entry_time
                .unwrap_or_else(|| ClockTime::from_naive_time(now.time())),
            exit_time: None,
            entry_period_id: input.entry_period_id,
            entry_hour: input.entry_hour,
            exit_period_id: None,
            exit_hour: None,
            session_mode: input.session_mode.trim().to_string(),
            session_location: input.session_location.trim().to_string(),
            discipline_status: input.discipline_status,
            institutional_cooperation: input.institutional_cooperation,
            session_details: input.session_details,
            evaluation: SessionEvaluation::default(),
            completed: false,
            auto_completed: false,
            extension_granted: false,
            created_at: now,
            updated_at: now,
            participants,
        };

        self.store.insert_session(&session)?;

        record_audit(
            self.store.as_ref(),
            AuditEventType::SessionStarted {
                session_id: session.id.clone(),
                counselor_id: session.counselor_id.clone(),
                participant_count: session.participants.len(),
            },
        );

        info!(
            session_id = %session.id,
            session_type = %session.session_type,
            participants = session.participants.len(),
            date = %session.session_date,
            entry = %session.entry_time,
            "Session started"
        );

        let event = CoreEvent::started(&session);
        Ok((session, event))
    }

    /// Close an active session with the counselor's evaluation.
    ///
    /// Shares the `completed = 0` guard with the sweeper, so at most one of
    /// the two ever closes a given session.
    pub fn complete_session(
        &self,
        id: &SessionId,
        completion: CompletionInput,
        now: DateTime<Local>,
    ) -> Result<CompleteDecision> {
        let exit_time = completion
            .exit_time
            .unwrap_or_else(|| ClockTime::from_naive_time(now.time()));

        let changed = self
            .store
            .complete_session(id, exit_time, &completion, now)?;
        if changed == 0 {
            debug!(session_id = %id, "Completion skipped: already completed or not found");
            return Ok(CompleteDecision::AlreadyCompletedOrNotFound);
        }

        record_audit(
            self.store.as_ref(),
            AuditEventType::SessionCompleted {
                session_id: id.clone(),
            },
        );

        let session = self
            .store
            .get_session(id)?
            .ok_or_else(|| CounselError::SessionNotFound(id.clone()))?;

        info!(
            session_id = %id,
            exit = %exit_time,
            duration_minutes = session.duration_minutes().unwrap_or_default(),
            "Session completed"
        );

        Ok(CompleteDecision::Completed {
            session,
            event: CoreEvent::SessionCompleted {
                session_id: id.clone(),
                exit_time,
                auto_completed: false,
            },
        })
    }

    /// Grant the extended auto-complete threshold. Idempotent.
    pub fn extend_session(&self, id: &SessionId, now: DateTime<Local>) -> Result<ExtendDecision> {
        if self.store.grant_extension(id, now)? == 0 {
            return if self.store.session_exists(id)? {
                debug!(session_id = %id, "Extension already granted");
                Ok(ExtendDecision::AlreadyGranted)
            } else {
                Ok(ExtendDecision::NotFound)
            };
        }

        record_audit(
            self.store.as_ref(),
            AuditEventType::ExtensionGranted {
                session_id: id.clone(),
            },
        );
        info!(session_id = %id, "Session extension granted");

        Ok(ExtendDecision::Granted(CoreEvent::SessionExtended {
            session_id: id.clone(),
        }))
    }

    /// Remove a session in any state; participant links go with it
    pub fn delete_session(&self, id: &SessionId) -> Result<DeleteDecision> {
        if self.store.delete_session(id)? == 0 {
            return Ok(DeleteDecision::NotFound);
        }

        record_audit(
            self.store.as_ref(),
            AuditEventType::SessionDeleted {
                session_id: id.clone(),
            },
        );
        info!(session_id = %id, "Session deleted");

        Ok(DeleteDecision::Deleted(CoreEvent::SessionDeleted {
            session_id: id.clone(),
        }))
    }

    pub fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.store.get_session(id)?)
    }

    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        Ok(self.store.query_sessions(filter)?)
    }

    /// Record a student directory entry used for class lookups
    pub fn upsert_student(&self, student: &StudentRecord) -> Result<()> {
        let mut problems = Vec::new();
        if student.id.as_str().trim().is_empty() {
            problems.push("student id is required".to_string());
        }
        if student.name.trim().is_empty() {
            problems.push("student name is required".to_string());
        }
        if !problems.is_empty() {
            return Err(CounselError::Validation(problems));
        }

        self.store.upsert_student(student)?;
        Ok(())
    }
}

/// Drop blank and repeated ids, keeping first-seen order
fn dedup_participants(ids: Vec<StudentId>) -> Vec<StudentId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter()
        .filter(|id| !id.as_str().trim().is_empty())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn validate_new_session(input: &NewSession, participants: &[StudentId]) -> Result<()> {
    let mut problems = Vec::new();

    if is_blank(input.counselor_id.as_str()) {
        problems.push("counselor id is required".to_string());
    }
    if is_blank(&input.topic) {
        problems.push("topic is required".to_string());
    }
    if is_blank(&input.participant_type) {
        problems.push("participant type is required".to_string());
    }
    if is_blank(&input.session_mode) {
        problems.push("session mode is required".to_string());
    }
    if is_blank(&input.session_location) {
        problems.push("session location is required".to_string());
    }

    if participants.is_empty() {
        problems.push("at least one participant is required".to_string());
    }

    match input.session_type {
        SessionType::Group => {
            if input.group_name.as_deref().is_none_or(is_blank) {
                problems.push("group name is required for group sessions".to_string());
            }
        }
        SessionType::Individual => {
            if participants.len() > 1 {
                problems.push(format!(
                    "individual sessions take exactly one participant, got {}",
                    participants.len()
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(CounselError::Validation(problems))
    }
}
