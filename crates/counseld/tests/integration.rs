//! Integration tests for counseld
//!
//! These tests verify the end-to-end behavior of the service: command
//! dispatch over a real store, the sweeper, and the IPC transport.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use counsel_api::{
    Command, CompletionInput, ErrorCode, EventPayload, NewSession, Request, Response,
    ResponsePayload, ResponseResult, SessionFilter, SessionState, SessionType, StudentRecord,
    TimeSeriesPeriod, UNSPECIFIED_CLASS,
};
use counsel_config::{parse_config, SweeperPolicy};
use counsel_core::AutoCompleteSweeper;
use counsel_ipc::{IpcClient, IpcServer, ServerMessage};
use counsel_store::{SqliteStore, Store};
use counsel_util::{ClientId, CounselorId, SessionId, StudentId};
use counseld::{event_payload, Dispatched, Dispatcher};
use std::sync::Arc;
use std::time::Duration;

fn local(date: &str, hour: u32, minute: u32) -> DateTime<Local> {
    let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap();
    Local.from_local_datetime(&naive).earliest().unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn new_session(topic: &str, session_date: &str, entry: &str) -> NewSession {
    NewSession {
        counselor_id: CounselorId::new("c-1"),
        session_type: SessionType::Individual,
        group_name: None,
        participant_type: "student".into(),
        relationship_type: None,
        topic: topic.into(),
        session_date: Some(date(session_date)),
        entry_time: Some(entry.parse().unwrap()),
        entry_period_id: None,
        entry_hour: None,
        session_mode: "face_to_face".into(),
        session_location: "Office".into(),
        discipline_status: None,
        institutional_cooperation: None,
        session_details: None,
    }
}

fn make_dispatcher() -> (Dispatcher, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    (Dispatcher::new(store.clone()), store)
}

fn dispatch(dispatcher: &Dispatcher, command: Command, now: DateTime<Local>) -> Dispatched {
    dispatcher.handle_request(&ClientId::new(), Request::new(1, command), now, true)
}

fn ok_payload(response: Response) -> ResponsePayload {
    match response.result {
        ResponseResult::Ok(payload) => payload,
        ResponseResult::Err(e) => panic!("unexpected error: {:?} {}", e.code, e.message),
    }
}

fn err_code(response: Response) -> ErrorCode {
    match response.result {
        ResponseResult::Err(e) => e.code,
        ResponseResult::Ok(payload) => panic!("unexpected success: {payload:?}"),
    }
}

fn start(dispatcher: &Dispatcher, input: NewSession, students: &[&str]) -> SessionId {
    let command = Command::StartSession {
        session: input,
        participant_ids: students.iter().map(|s| StudentId::from(*s)).collect(),
    };
    match ok_payload(dispatch(dispatcher, command, local("2024-01-01", 8, 0)).response) {
        ResponsePayload::SessionStarted(session) => session.id,
        other => panic!("unexpected payload: {other:?}"),
    }
}

fn complete(dispatcher: &Dispatcher, session_id: &SessionId, exit: &str) -> Response {
    let command = Command::CompleteSession {
        session_id: session_id.clone(),
        completion: CompletionInput {
            exit_time: Some(exit.parse().unwrap()),
            ..Default::default()
        },
    };
    dispatch(dispatcher, command, local("2024-01-01", 12, 0)).response
}

#[test]
fn test_start_and_complete_roundtrip() {
    let (dispatcher, _store) = make_dispatcher();

    let dispatched = dispatch(
        &dispatcher,
        Command::StartSession {
            session: new_session("Exam anxiety", "2024-01-01", "10:00"),
            participant_ids: vec![StudentId::from("s-1")],
        },
        local("2024-01-01", 10, 0),
    );
    let event = dispatched.event.expect("start should produce an event");
    let session = match ok_payload(dispatched.response) {
        ResponsePayload::SessionStarted(session) => session,
        other => panic!("unexpected payload: {other:?}"),
    };
    assert_eq!(session.state(), SessionState::Active);
    assert!(matches!(
        event_payload(event),
        EventPayload::SessionStarted { participant_count: 1, .. }
    ));

    let response = complete(&dispatcher, &session.id, "10:45");
    match ok_payload(response) {
        ResponsePayload::SessionCompleted(done) => {
            assert_eq!(done.state(), SessionState::Completed);
            assert_eq!(done.duration_minutes(), Some(45));
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    // Guarded: a second completion is rejected
    let response = complete(&dispatcher, &session.id, "11:00");
    assert_eq!(err_code(response), ErrorCode::AlreadyCompletedOrNotFound);

    let response = complete(&dispatcher, &SessionId::new(), "11:00");
    assert_eq!(err_code(response), ErrorCode::AlreadyCompletedOrNotFound);
}

#[test]
fn test_validation_failure_code() {
    let (dispatcher, store) = make_dispatcher();

    let mut input = new_session("", "2024-01-01", "10:00");
    input.session_location = String::new();
    let dispatched = dispatch(
        &dispatcher,
        Command::StartSession {
            session: input,
            participant_ids: vec![],
        },
        local("2024-01-01", 10, 0),
    );

    assert!(dispatched.event.is_none());
    assert_eq!(err_code(dispatched.response), ErrorCode::ValidationFailed);
    assert_eq!(store.count_sessions().unwrap(), 0);
}

#[test]
fn test_extend_delete_and_not_found() {
    let (dispatcher, _store) = make_dispatcher();
    let id = start(&dispatcher, new_session("Career", "2024-01-01", "10:00"), &["s-1"]);

    let first = dispatch(
        &dispatcher,
        Command::ExtendSession { session_id: id.clone() },
        local("2024-01-01", 10, 50),
    );
    assert!(first.event.is_some());
    assert!(matches!(
        ok_payload(first.response),
        ResponsePayload::SessionExtended { newly_granted: true, .. }
    ));

    let second = dispatch(
        &dispatcher,
        Command::ExtendSession { session_id: id.clone() },
        local("2024-01-01", 10, 55),
    );
    assert!(second.event.is_none());
    assert!(matches!(
        ok_payload(second.response),
        ResponsePayload::SessionExtended { newly_granted: false, .. }
    ));

    let deleted = dispatch(
        &dispatcher,
        Command::DeleteSession { session_id: id.clone() },
        local("2024-01-01", 11, 0),
    );
    assert!(matches!(
        ok_payload(deleted.response),
        ResponsePayload::SessionDeleted { .. }
    ));

    for command in [
        Command::GetSession { session_id: id.clone() },
        Command::DeleteSession { session_id: id.clone() },
        Command::ExtendSession { session_id: id.clone() },
    ] {
        let response = dispatch(&dispatcher, command, local("2024-01-01", 11, 0)).response;
        assert_eq!(err_code(response), ErrorCode::NotFound);
    }
}

#[test]
fn test_sweeper_closes_forgotten_session() {
    let (dispatcher, store) = make_dispatcher();
    let forgotten = start(&dispatcher, new_session("Family", "2024-01-01", "10:00"), &["s-1"]);
    let extended = start(&dispatcher, new_session("Family", "2024-01-01", "10:00"), &["s-2"]);
    dispatch(
        &dispatcher,
        Command::ExtendSession { session_id: extended.clone() },
        local("2024-01-01", 10, 30),
    );

    let sweeper = AutoCompleteSweeper::new(store.clone(), SweeperPolicy::default());
    let report = sweeper.sweep(local("2024-01-01", 11, 5)).unwrap();
    assert_eq!(report.auto_completed, vec![forgotten.clone()]);

    let session = store.get_session(&forgotten).unwrap().unwrap();
    assert_eq!(session.state(), SessionState::AutoCompleted);
    assert!(session.evaluation.detailed_notes.is_some());

    // The counselor arrives late: completion is rejected, notes are untouched
    let response = complete(&dispatcher, &forgotten, "11:10");
    assert_eq!(err_code(response), ErrorCode::AlreadyCompletedOrNotFound);

    let report = sweeper.sweep(local("2024-01-01", 11, 16)).unwrap();
    assert_eq!(report.auto_completed, vec![extended]);
}

#[test]
fn test_class_filter_and_analysis() {
    let (dispatcher, _store) = make_dispatcher();
    let now = local("2024-01-02", 9, 0);

    let directory = [
        ("s-1", "Ada", Some("9A")),
        ("s-2", "Ben", Some("9A")),
        ("s-3", "Cy", None),
    ];
    for (id, name, class) in directory {
        let student = StudentRecord {
            id: StudentId::from(id),
            name: name.into(),
            class_name: class.map(Into::into),
        };
        ok_payload(dispatch(&dispatcher, Command::UpsertStudent { student }, now).response);
    }

    let mut group = new_session("Study skills", "2024-01-01", "10:00");
    group.session_type = SessionType::Group;
    group.group_name = Some("Ninth graders".into());
    let group_id = start(&dispatcher, group, &["s-1", "s-2"]);
    start(&dispatcher, new_session("Career", "2024-01-01", "11:00"), &["s-3"]);

    let filter = SessionFilter {
        class_name: Some("9A".into()),
        ..Default::default()
    };
    match ok_payload(dispatch(&dispatcher, Command::ListSessions { filter }, now).response) {
        ResponsePayload::Sessions { sessions } => {
            assert_eq!(sessions.len(), 1);
            assert_eq!(sessions[0].id, group_id);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    match ok_payload(dispatch(&dispatcher, Command::GetClassAnalysis, now).response) {
        ResponsePayload::Categories { categories } => {
            let labels: Vec<_> = categories
                .iter()
                .map(|c| (c.label.as_str(), c.count))
                .collect();
            assert_eq!(labels, vec![("9A", 1), (UNSPECIFIED_CLASS, 1)]);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn test_daily_time_series_is_gap_filled() {
    let (dispatcher, _store) = make_dispatcher();
    start(&dispatcher, new_session("Career", "2024-01-01", "10:00"), &["s-1"]);
    start(&dispatcher, new_session("Career", "2024-01-03", "10:00"), &["s-1"]);

    let command = Command::GetTimeSeries {
        period: TimeSeriesPeriod::Daily,
        start: date("2024-01-01"),
        end: date("2024-01-03"),
    };
    match ok_payload(dispatch(&dispatcher, command, local("2024-01-04", 9, 0)).response) {
        ResponsePayload::TimeSeries { points } => {
            let counts: Vec<_> = points.iter().map(|p| (p.period.as_str(), p.count)).collect();
            assert_eq!(
                counts,
                vec![("2024-01-01", 1), ("2024-01-02", 0), ("2024-01-03", 1)]
            );
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    let inverted = Command::GetTimeSeries {
        period: TimeSeriesPeriod::Weekly,
        start: date("2024-01-03"),
        end: date("2024-01-01"),
    };
    let response = dispatch(&dispatcher, inverted, local("2024-01-04", 9, 0)).response;
    assert_eq!(err_code(response), ErrorCode::ValidationFailed);
}

#[test]
fn test_health_and_version_check() {
    let (dispatcher, _store) = make_dispatcher();
    let now = local("2024-01-01", 9, 0);

    let response = dispatcher
        .handle_request(&ClientId::new(), Request::new(1, Command::GetHealth), now, false)
        .response;
    match ok_payload(response) {
        ResponsePayload::Health(health) => {
            assert!(health.live);
            assert!(health.store_ok);
            assert!(!health.ready);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    let mut request = Request::new(2, Command::Ping);
    request.api_version += 1;
    let response = dispatcher
        .handle_request(&ClientId::new(), request, now, true)
        .response;
    assert_eq!(response.request_id, 2);
    assert_eq!(err_code(response), ErrorCode::InvalidRequest);
}

#[test]
fn test_audit_trail() {
    let (dispatcher, _store) = make_dispatcher();
    let id = start(&dispatcher, new_session("Career", "2024-01-01", "10:00"), &["s-1"]);
    complete(&dispatcher, &id, "10:30");

    let response = dispatch(
        &dispatcher,
        Command::GetRecentAudit { limit: 10 },
        local("2024-01-01", 12, 0),
    )
    .response;
    match ok_payload(response) {
        ResponsePayload::Audit { entries } => {
            let kinds: Vec<_> = entries
                .iter()
                .filter_map(|e| e["event"]["type"].as_str())
                .collect();
            assert_eq!(kinds, vec!["session_completed", "session_started"]);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn test_config_parsing() {
    let policy = parse_config(
        r#"
        config_version = 1

        [sweeper]
        threshold_minutes = 50
        extended_threshold_minutes = 70
        "#,
    )
    .unwrap();

    assert_eq!(policy.sweeper.threshold_for(false), 50);
    assert_eq!(policy.sweeper.threshold_for(true), 70);
}

#[tokio::test]
async fn test_ipc_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("counseld.sock");

    let mut server = IpcServer::new(&socket_path);
    server.start().await.unwrap();
    let server = Arc::new(server);
    let mut messages = server.take_message_receiver().await.unwrap();

    let accept = server.clone();
    tokio::spawn(async move {
        let _ = accept.run().await;
    });

    // Minimal service loop: dispatch and broadcast
    let (dispatcher, _store) = make_dispatcher();
    let loop_server = server.clone();
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            if let ServerMessage::Request { client_id, request } = msg {
                let dispatched =
                    dispatcher.handle_request(&client_id, request, local("2024-01-01", 10, 0), true);
                let _ = loop_server.send_response(&client_id, dispatched.response).await;
                if let Some(event) = dispatched.event {
                    loop_server.broadcast_event(counsel_api::Event::new(event_payload(event)));
                }
            }
        }
    });

    let subscriber = IpcClient::connect(&socket_path).await.unwrap();
    let mut events = subscriber.subscribe().await.unwrap();

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    let response = client
        .send(Command::StartSession {
            session: new_session("Exam anxiety", "2024-01-01", "10:00"),
            participant_ids: vec![StudentId::from("s-1")],
        })
        .await
        .unwrap();
    let session_id = match ok_payload(response) {
        ResponsePayload::SessionStarted(session) => session.id,
        other => panic!("unexpected payload: {other:?}"),
    };

    let event = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap()
        .unwrap();
    match event.payload {
        EventPayload::SessionStarted { session_id: id, .. } => assert_eq!(id, session_id),
        other => panic!("unexpected event: {other:?}"),
    }

    let response = client
        .send(Command::GetSession { session_id: session_id.clone() })
        .await
        .unwrap();
    assert!(matches!(ok_payload(response), ResponsePayload::Session(s) if s.id == session_id));
}
