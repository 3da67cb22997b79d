//! Command dispatch

use chrono::{DateTime, Local};
use counsel_api::{
    Command, ErrorCode, ErrorInfo, EventPayload, HealthStatus, Request, Response,
    ResponsePayload, API_VERSION,
};
use counsel_core::{
    Analytics, CompleteDecision, CoreEvent, DeleteDecision, ExtendDecision, SessionEngine,
};
use counsel_store::Store;
use counsel_util::{ClientId, CounselError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound for `GetRecentAudit`
pub const MAX_AUDIT_ENTRIES: usize = 1000;

/// Result of handling one request
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    /// To be broadcast to subscribers
    pub event: Option<CoreEvent>,
}

impl Dispatched {
    fn reply(response: Response) -> Self {
        Self {
            response,
            event: None,
        }
    }

    fn with_event(response: Response, event: CoreEvent) -> Self {
        Self {
            response,
            event: Some(event),
        }
    }
}

/// Map a service error onto a protocol error code
pub fn error_code(err: &CounselError) -> ErrorCode {
    match err {
        CounselError::Validation(_) => ErrorCode::ValidationFailed,
        CounselError::SessionNotFound(_) => ErrorCode::NotFound,
        CounselError::StoreError(_) => ErrorCode::StoreError,
        CounselError::IpcError(_) | CounselError::Internal(_) => ErrorCode::InternalError,
    }
}

fn error_response(request_id: u64, err: CounselError) -> Response {
    let code = error_code(&err);
    if err.is_validation() {
        debug!(request_id, error = %err, "Request rejected");
    } else {
        warn!(request_id, error = %err, "Request failed");
    }
    Response::error(request_id, ErrorInfo::new(code, err.to_string()))
}

/// Client-facing form of a core event
pub fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::SessionStarted {
            session_id,
            counselor_id,
            session_type,
            topic,
            session_date,
            entry_time,
            participant_count,
        } => EventPayload::SessionStarted {
            session_id,
            counselor_id,
            session_type,
            topic,
            session_date,
            entry_time,
            participant_count,
        },
        CoreEvent::SessionCompleted {
            session_id,
            exit_time,
            auto_completed,
        } => EventPayload::SessionCompleted {
            session_id,
            exit_time,
            auto_completed,
        },
        CoreEvent::SessionExtended { session_id } => EventPayload::SessionExtended { session_id },
        CoreEvent::SessionDeleted { session_id } => EventPayload::SessionDeleted { session_id },
    }
}

/// Routes protocol commands to the engine, the analytics aggregator and the store
pub struct Dispatcher {
    engine: SessionEngine,
    analytics: Analytics,
    store: Arc<dyn Store>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            engine: SessionEngine::new(store.clone()),
            analytics: Analytics::new(store.clone()),
            store,
        }
    }

    pub fn handle_request(
        &self,
        client_id: &ClientId,
        request: Request,
        now: DateTime<Local>,
        sweeper_running: bool,
    ) -> Dispatched {
        if request.api_version != API_VERSION {
            return Dispatched::reply(Response::error(
                request.request_id,
                ErrorInfo::new(
                    ErrorCode::InvalidRequest,
                    format!(
                        "unsupported api version {} (expected {})",
                        request.api_version, API_VERSION
                    ),
                ),
            ));
        }

        let request_id = request.request_id;
        match self.handle_command(client_id, request_id, request.command, now, sweeper_running) {
            Ok(dispatched) => dispatched,
            Err(err) => Dispatched::reply(error_response(request_id, err)),
        }
    }

    fn handle_command(
        &self,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
        now: DateTime<Local>,
        sweeper_running: bool,
    ) -> Result<Dispatched, CounselError> {
        let ok = |payload| Response::success(request_id, payload);

        let dispatched = match command {
            Command::StartSession {
                session,
                participant_ids,
            } => {
                let (session, event) = self.engine.start_session(session, participant_ids, now)?;
                Dispatched::with_event(ok(ResponsePayload::SessionStarted(session)), event)
            }

            Command::CompleteSession {
                session_id,
                completion,
            } => match self.engine.complete_session(&session_id, completion, now)? {
                CompleteDecision::Completed { session, event } => {
                    Dispatched::with_event(ok(ResponsePayload::SessionCompleted(session)), event)
                }
                CompleteDecision::AlreadyCompletedOrNotFound => Dispatched::reply(Response::error(
                    request_id,
                    ErrorInfo::new(
                        ErrorCode::AlreadyCompletedOrNotFound,
                        format!("Session {session_id} is already completed or does not exist"),
                    ),
                )),
            },

            Command::ExtendSession { session_id } => {
                match self.engine.extend_session(&session_id, now)? {
                    ExtendDecision::Granted(event) => Dispatched::with_event(
                        ok(ResponsePayload::SessionExtended {
                            session_id,
                            newly_granted: true,
                        }),
                        event,
                    ),
                    ExtendDecision::AlreadyGranted => {
                        Dispatched::reply(ok(ResponsePayload::SessionExtended {
                            session_id,
                            newly_granted: false,
                        }))
                    }
                    ExtendDecision::NotFound => {
                        return Err(CounselError::SessionNotFound(session_id));
                    }
                }
            }

            Command::DeleteSession { session_id } => {
                match self.engine.delete_session(&session_id)? {
                    DeleteDecision::Deleted(event) => Dispatched::with_event(
                        ok(ResponsePayload::SessionDeleted { session_id }),
                        event,
                    ),
                    DeleteDecision::NotFound => {
                        return Err(CounselError::SessionNotFound(session_id));
                    }
                }
            }

            Command::GetSession { session_id } => match self.engine.get_session(&session_id)? {
                Some(session) => Dispatched::reply(ok(ResponsePayload::Session(session))),
                None => return Err(CounselError::SessionNotFound(session_id)),
            },

            Command::ListSessions { filter } => {
                let sessions = self.engine.list_sessions(&filter)?;
                Dispatched::reply(ok(ResponsePayload::Sessions { sessions }))
            }

            Command::GetOverallStats => {
                let stats = self.analytics.overall_stats(now.date_naive())?;
                Dispatched::reply(ok(ResponsePayload::OverallStats(stats)))
            }

            Command::GetTimeSeries { period, start, end } => {
                let points = self.analytics.time_series(period, start, end)?;
                Dispatched::reply(ok(ResponsePayload::TimeSeries { points }))
            }

            Command::GetTopicAnalysis => {
                let categories = self.analytics.topic_analysis()?;
                Dispatched::reply(ok(ResponsePayload::Categories { categories }))
            }

            Command::GetParticipantTypeAnalysis => {
                let categories = self.analytics.participant_type_analysis()?;
                Dispatched::reply(ok(ResponsePayload::Categories { categories }))
            }

            Command::GetClassAnalysis => {
                let categories = self.analytics.class_analysis()?;
                Dispatched::reply(ok(ResponsePayload::Categories { categories }))
            }

            Command::GetSessionModeAnalysis => {
                let categories = self.analytics.session_mode_analysis()?;
                Dispatched::reply(ok(ResponsePayload::Categories { categories }))
            }

            Command::GetStudentStats { student_id } => {
                let stats = self.analytics.student_session_stats(&student_id)?;
                Dispatched::reply(ok(ResponsePayload::StudentStats(stats)))
            }

            Command::UpsertStudent { student } => {
                self.engine.upsert_student(&student)?;
                Dispatched::reply(ok(ResponsePayload::StudentUpserted))
            }

            Command::GetRecentAudit { limit } => {
                let audits = self
                    .store
                    .get_recent_audits(limit.min(MAX_AUDIT_ENTRIES))
                    .map_err(CounselError::from)?;
                let entries = audits
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| CounselError::internal(e.to_string()))?;
                Dispatched::reply(ok(ResponsePayload::Audit { entries }))
            }

            Command::SubscribeEvents => Dispatched::reply(ok(ResponsePayload::Subscribed {
                client_id: client_id.clone(),
            })),

            Command::UnsubscribeEvents => Dispatched::reply(ok(ResponsePayload::Unsubscribed)),

            Command::GetHealth => {
                let store_ok = self.store.is_healthy();
                Dispatched::reply(ok(ResponsePayload::Health(HealthStatus {
                    live: true,
                    ready: store_ok && sweeper_running,
                    store_ok,
                    sweeper_running,
                })))
            }

            Command::Ping => Dispatched::reply(ok(ResponsePayload::Pong)),
        };

        Ok(dispatched)
    }
}
