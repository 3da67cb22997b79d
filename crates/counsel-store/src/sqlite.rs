//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use counsel_api::{CompletionInput, Session, SessionEvaluation, SessionFilter, StudentRecord};
use counsel_util::{ClockTime, SessionId, StudentId};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::query::{build_session_query, Predicates, SESSION_COLUMNS};
use crate::{
    ActiveSession, AuditEvent, CategoryField, SessionTiming, Store, StoreError, StoreResult,
};

/// SQLite's `LOWER` only folds ASCII. Topic matching needs the same
/// Unicode folding on both sides of the LIKE.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )
}

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        register_functions(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Counseling sessions
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                counselor_id TEXT NOT NULL,
                session_type TEXT NOT NULL CHECK (session_type IN ('individual', 'group')),
                group_name TEXT,
                participant_type TEXT NOT NULL,
                relationship_type TEXT,
                topic TEXT NOT NULL,
                session_date TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                exit_time TEXT,
                entry_period_id INTEGER,
                entry_hour TEXT,
                exit_period_id INTEGER,
                exit_hour TEXT,
                session_mode TEXT NOT NULL,
                session_location TEXT NOT NULL,
                discipline_status TEXT,
                institutional_cooperation TEXT,
                session_details TEXT,
                session_flow TEXT,
                student_participation_level TEXT,
                cooperation_level TEXT,
                emotional_state TEXT,
                physical_state TEXT,
                communication_quality TEXT,
                tags_json TEXT NOT NULL DEFAULT '[]',
                achieved_outcomes_json TEXT NOT NULL DEFAULT '[]',
                follow_up_needed INTEGER NOT NULL DEFAULT 0,
                follow_up_plan TEXT,
                action_items_json TEXT NOT NULL DEFAULT '[]',
                detailed_notes TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                auto_completed INTEGER NOT NULL DEFAULT 0,
                extension_granted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK ((completed = 0) = (exit_time IS NULL)),
                CHECK (auto_completed = 0 OR completed = 1)
            );

            -- Students linked to a session
            CREATE TABLE IF NOT EXISTS session_participants (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                student_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (session_id, student_id)
            );

            -- Student directory (class lookups only)
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                class_name TEXT
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions(session_date);
            CREATE INDEX IF NOT EXISTS idx_sessions_completed ON sessions(completed);
            CREATE INDEX IF NOT EXISTS idx_participants_student ON session_participants(student_id);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

/// Parse a text column through `FromStr`, reporting failures against the column
fn parsed<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let idx = row.as_ref().column_index(column)?;
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_opt<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let idx = row.as_ref().column_index(column)?;
    let text: Option<String> = row.get(idx)?;
    text.map(|t| t.parse())
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_list(row: &Row<'_>, column: &str) -> rusqlite::Result<Vec<String>> {
    let idx = row.as_ref().column_index(column)?;
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Local>> {
    let text: String = row.get(column)?;
    Ok(DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Local))
        .unwrap_or_else(|_| counsel_util::now()))
}

/// Map a row selected with [`SESSION_COLUMNS`]; participants are loaded separately
fn map_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let evaluation = SessionEvaluation {
        session_flow: row.get("session_flow")?,
        student_participation_level: row.get("student_participation_level")?,
        cooperation_level: row.get("cooperation_level")?,
        emotional_state: row.get("emotional_state")?,
        physical_state: row.get("physical_state")?,
        communication_quality: row.get("communication_quality")?,
        tags: json_list(row, "tags_json")?,
        achieved_outcomes: json_list(row, "achieved_outcomes_json")?,
        follow_up_needed: row.get("follow_up_needed")?,
        follow_up_plan: row.get("follow_up_plan")?,
        action_items: json_list(row, "action_items_json")?,
        detailed_notes: row.get("detailed_notes")?,
    };

    Ok(Session {
        id: parsed(row, "id")?,
        counselor_id: row.get::<_, String>("counselor_id")?.as_str().into(),
        session_type: parsed(row, "session_type")?,
        group_name: row.get("group_name")?,
        participant_type: row.get("participant_type")?,
        relationship_type: row.get("relationship_type")?,
        topic: row.get("topic")?,
        session_date: parsed(row, "session_date")?,
        entry_time: parsed(row, "entry_time")?,
        exit_time: parsed_opt(row, "exit_time")?,
        entry_period_id: row.get("entry_period_id")?,
        entry_hour: row.get("entry_hour")?,
        exit_period_id: row.get("exit_period_id")?,
        exit_hour: row.get("exit_hour")?,
        session_mode: row.get("session_mode")?,
        session_location: row.get("session_location")?,
        discipline_status: row.get("discipline_status")?,
        institutional_cooperation: row.get("institutional_cooperation")?,
        session_details: row.get("session_details")?,
        evaluation,
        completed: row.get("completed")?,
        auto_completed: row.get("auto_completed")?,
        extension_granted: row.get("extension_granted")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        participants: Vec::new(),
    })
}

fn load_participants(conn: &Connection, id: &SessionId) -> rusqlite::Result<Vec<StudentId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT student_id FROM session_participants WHERE session_id = ? ORDER BY position",
    )?;
    let rows = stmt.query_map([id.to_string()], |row| row.get::<_, String>(0))?;
    rows.map(|r| r.map(StudentId::from)).collect()
}

impl Store for SqliteStore {
    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let eval = &session.evaluation;
        tx.execute(
            "INSERT INTO sessions (
                id, counselor_id, session_type, group_name, participant_type, relationship_type,
                topic, session_date, entry_time, exit_time, entry_period_id, entry_hour,
                exit_period_id, exit_hour, session_mode, session_location, discipline_status,
                institutional_cooperation, session_details, session_flow,
                student_participation_level, cooperation_level, emotional_state, physical_state,
                communication_quality, tags_json, achieved_outcomes_json, follow_up_needed,
                follow_up_plan, action_items_json, detailed_notes, completed, auto_completed,
                extension_granted, created_at, updated_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )",
            params![
                session.id.to_string(),
                session.counselor_id.as_str(),
                session.session_type.as_str(),
                session.group_name,
                session.participant_type,
                session.relationship_type,
                session.topic,
                counsel_util::format_date(session.session_date),
                session.entry_time.to_string(),
                session.exit_time.map(|t| t.to_string()),
                session.entry_period_id,
                session.entry_hour,
                session.exit_period_id,
                session.exit_hour,
                session.session_mode,
                session.session_location,
                session.discipline_status,
                session.institutional_cooperation,
                session.session_details,
                eval.session_flow,
                eval.student_participation_level,
                eval.cooperation_level,
                eval.emotional_state,
                eval.physical_state,
                eval.communication_quality,
                serde_json::to_string(&eval.tags)?,
                serde_json::to_string(&eval.achieved_outcomes)?,
                eval.follow_up_needed,
                eval.follow_up_plan,
                serde_json::to_string(&eval.action_items)?,
                eval.detailed_notes,
                session.completed,
                session.auto_completed,
                session.extension_granted,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;

        {
            let mut link = tx.prepare(
                "INSERT INTO session_participants (session_id, student_id, position) VALUES (?, ?, ?)",
            )?;
            for (position, student) in session.participants.iter().enumerate() {
                link.execute(params![session.id.to_string(), student.as_str(), position as i64])?;
            }
        }

        tx.commit()?;
        debug!(
            session_id = %session.id,
            participants = session.participants.len(),
            "Session inserted"
        );
        Ok(())
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        let conn = self.conn()?;

        let session = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.id = ?"),
                [id.to_string()],
                map_session,
            )
            .optional()?;

        match session {
            Some(mut session) => {
                session.participants = load_participants(&conn, id)?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn session_exists(&self, id: &SessionId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row("SELECT 1 FROM sessions WHERE id = ?", [id.to_string()], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn complete_session(
        &self,
        id: &SessionId,
        exit_time: ClockTime,
        completion: &CompletionInput,
        at: DateTime<Local>,
    ) -> StoreResult<usize> {
        let conn = self.conn()?;
        let eval = &completion.evaluation;

        let changed = conn.execute(
            "UPDATE sessions SET
                exit_time = ?, exit_period_id = ?, exit_hour = ?,
                session_flow = ?, student_participation_level = ?, cooperation_level = ?,
                emotional_state = ?, physical_state = ?, communication_quality = ?,
                tags_json = ?, achieved_outcomes_json = ?, follow_up_needed = ?,
                follow_up_plan = ?, action_items_json = ?, detailed_notes = ?,
                completed = 1, auto_completed = 0, updated_at = ?
             WHERE id = ? AND completed = 0",
            params![
                exit_time.to_string(),
                completion.exit_period_id,
                completion.exit_hour,
                eval.session_flow,
                eval.student_participation_level,
                eval.cooperation_level,
                eval.emotional_state,
                eval.physical_state,
                eval.communication_quality,
                serde_json::to_string(&eval.tags)?,
                serde_json::to_string(&eval.achieved_outcomes)?,
                eval.follow_up_needed,
                eval.follow_up_plan,
                serde_json::to_string(&eval.action_items)?,
                eval.detailed_notes,
                at.to_rfc3339(),
                id.to_string(),
            ],
        )?;

        debug!(session_id = %id, changed, "Guarded manual completion");
        Ok(changed)
    }

    fn auto_complete_session(
        &self,
        id: &SessionId,
        exit_time: ClockTime,
        banner: &str,
        at: DateTime<Local>,
    ) -> StoreResult<usize> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE sessions SET
                exit_time = ?1, completed = 1, auto_completed = 1,
                detailed_notes = CASE
                    WHEN detailed_notes IS NULL OR detailed_notes = '' THEN ?2
                    ELSE detailed_notes || char(10) || char(10) || ?2
                END,
                updated_at = ?3
             WHERE id = ?4 AND completed = 0",
            params![exit_time.to_string(), banner, at.to_rfc3339(), id.to_string()],
        )?;

        debug!(session_id = %id, changed, "Guarded auto-completion");
        Ok(changed)
    }

    fn grant_extension(&self, id: &SessionId, at: DateTime<Local>) -> StoreResult<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sessions SET extension_granted = 1, updated_at = ?
             WHERE id = ? AND extension_granted = 0",
            params![at.to_rfc3339(), id.to_string()],
        )?;
        Ok(changed)
    }

    fn delete_session(&self, id: &SessionId) -> StoreResult<usize> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?", [id.to_string()])?;
        Ok(changed)
    }

    fn list_active_sessions(&self) -> StoreResult<Vec<ActiveSession>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, session_date, entry_time, extension_granted FROM sessions
             WHERE completed = 0 ORDER BY session_date, entry_time",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ActiveSession {
                id: parsed(row, "id")?,
                session_date: parsed(row, "session_date")?,
                entry_time: parsed(row, "entry_time")?,
                extension_granted: row.get("extension_granted")?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<Session>> {
        let conn = self.conn()?;
        let query = build_session_query(filter);
        let params = query.params();

        let mut sessions = {
            let mut stmt = conn.prepare(&query.sql)?;
            let rows = stmt.query_map(params.as_slice(), map_session)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for session in &mut sessions {
            session.participants = load_participants(&conn, &session.id)?;
        }

        debug!(
            predicates = query.predicate_count(),
            results = sessions.len(),
            "Session query"
        );
        Ok(sessions)
    }

    fn count_sessions(&self) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn session_timings(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> StoreResult<Vec<SessionTiming>> {
        let conn = self.conn()?;

        let mut predicates = Predicates::new();
        if let Some((start, end)) = range {
            predicates.push("s.session_date >= ?", counsel_util::format_date(start));
            predicates.push("s.session_date <= ?", counsel_util::format_date(end));
        }

        let sql = format!(
            "SELECT s.id, s.session_type, s.session_date, s.entry_time, s.exit_time, s.completed
             FROM sessions s{}",
            predicates.where_sql()
        );
        let params = predicates.params();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok(SessionTiming {
                id: parsed(row, "id")?,
                session_type: parsed(row, "session_type")?,
                session_date: parsed(row, "session_date")?,
                entry_time: parsed(row, "entry_time")?,
                exit_time: parsed_opt(row, "exit_time")?,
                completed: row.get("completed")?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count_by(&self, field: CategoryField) -> StoreResult<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let column = field.column();

        let mut stmt = conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM sessions GROUP BY {column}"
        ))?;
        let rows = stmt.query_map([], |row| {
            let label: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((label, count.max(0) as u64))
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn session_classes(&self) -> StoreResult<Vec<(SessionId, Option<String>)>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT sp.session_id, NULLIF(TRIM(st.class_name), '') AS class_name
             FROM session_participants sp
             LEFT JOIN students st ON st.id = sp.student_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((parsed(row, "session_id")?, row.get("class_name")?))
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn upsert_student(&self, student: &StudentRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO students (id, name, class_name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, class_name = excluded.class_name",
            params![student.id.as_str(), student.name, student.class_name],
        )?;
        debug!(student_id = %student.id, "Student upserted");
        Ok(())
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| counsel_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use counsel_api::SessionType;
    use counsel_util::{parse_date, CounselorId};

    fn clock(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn sample_session(date: &str, entry: &str, participants: &[&str]) -> Session {
        let now = counsel_util::now();
        let session_type = if participants.len() > 1 {
            SessionType::Group
        } else {
            SessionType::Individual
        };
        Session {
            id: SessionId::new(),
            counselor_id: CounselorId::new("c-1"),
            session_type,
            group_name: (session_type == SessionType::Group).then(|| "Group".to_string()),
            participant_type: "student".into(),
            relationship_type: None,
            topic: "Exam anxiety".into(),
            session_date: parse_date(date).unwrap(),
            entry_time: clock(entry),
            exit_time: None,
            entry_period_id: Some(3),
            entry_hour: Some("3rd period".into()),
            exit_period_id: None,
            exit_hour: None,
            session_mode: "face_to_face".into(),
            session_location: "Counseling office".into(),
            discipline_status: None,
            institutional_cooperation: None,
            session_details: Some("Initial meeting".into()),
            evaluation: SessionEvaluation::default(),
            completed: false,
            auto_completed: false,
            extension_granted: false,
            created_at: now,
            updated_at: now,
            participants: participants.iter().map(|p| StudentId::from(*p)).collect(),
        }
    }

    fn participant_rows(store: &SqliteStore, id: &SessionId) -> i64 {
        let conn = store.conn().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM session_participants WHERE session_id = ?",
            [id.to_string()],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        let event = AuditEvent::new(AuditEventType::ServiceStarted);
        store.append_audit(event).unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_insert_and_get_keeps_participant_order() {
        let store = SqliteStore::in_memory().unwrap();
        let session = sample_session("2024-01-01", "10:00", &["s-3", "s-1", "s-2"]);
        store.insert_session(&session).unwrap();

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.session_type, SessionType::Group);
        assert_eq!(loaded.entry_time, clock("10:00"));
        assert_eq!(loaded.exit_time, None);
        assert_eq!(
            loaded.participants,
            vec![StudentId::from("s-3"), StudentId::from("s-1"), StudentId::from("s-2")]
        );
        assert!(store.session_exists(&session.id).unwrap());
        assert!(store.get_session(&SessionId::new()).unwrap().is_none());
    }

    #[test]
    fn test_insert_is_atomic() {
        let store = SqliteStore::in_memory().unwrap();
        // Duplicate participant violates the link primary key
        let session = sample_session("2024-01-01", "10:00", &["s-1", "s-1"]);
        assert!(store.insert_session(&session).is_err());
        assert!(!store.session_exists(&session.id).unwrap());
        assert_eq!(store.count_sessions().unwrap(), 0);
    }

    #[test]
    fn test_complete_is_guarded() {
        let store = SqliteStore::in_memory().unwrap();
        let session = sample_session("2024-01-01", "10:00", &["s-1"]);
        store.insert_session(&session).unwrap();

        let completion = CompletionInput {
            exit_time: None,
            exit_period_id: Some(4),
            exit_hour: Some("4th period".into()),
            evaluation: SessionEvaluation {
                tags: vec!["stress".into(), "exams".into()],
                action_items: vec!["Call parents".into()],
                follow_up_needed: true,
                detailed_notes: Some("Went well".into()),
                ..Default::default()
            },
        };

        let now = counsel_util::now();
        assert_eq!(
            store.complete_session(&session.id, clock("10:40"), &completion, now).unwrap(),
            1
        );
        assert_eq!(
            store.complete_session(&session.id, clock("10:50"), &completion, now).unwrap(),
            0
        );

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert!(loaded.completed);
        assert!(!loaded.auto_completed);
        assert_eq!(loaded.exit_time, Some(clock("10:40")));
        assert_eq!(loaded.exit_period_id, Some(4));
        assert_eq!(loaded.evaluation.tags, vec!["stress", "exams"]);
        assert_eq!(loaded.evaluation.action_items, vec!["Call parents"]);
        assert!(loaded.evaluation.follow_up_needed);
        assert_eq!(loaded.duration_minutes(), Some(40));
    }

    #[test]
    fn test_auto_complete_appends_banner_once() {
        let store = SqliteStore::in_memory().unwrap();
        let mut session = sample_session("2024-01-01", "10:00", &["s-1"]);
        session.evaluation.detailed_notes = Some("Earlier notes".into());
        store.insert_session(&session).unwrap();

        let now = counsel_util::now();
        assert_eq!(
            store.auto_complete_session(&session.id, clock("11:05"), "[auto]", now).unwrap(),
            1
        );
        assert_eq!(
            store.auto_complete_session(&session.id, clock("11:06"), "[auto]", now).unwrap(),
            0
        );

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert!(loaded.completed);
        assert!(loaded.auto_completed);
        assert_eq!(loaded.exit_time, Some(clock("11:05")));
        assert_eq!(
            loaded.evaluation.detailed_notes.as_deref(),
            Some("Earlier notes\n\n[auto]")
        );
    }

    #[test]
    fn test_auto_complete_after_manual_changes_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        let session = sample_session("2024-01-01", "10:00", &["s-1"]);
        store.insert_session(&session).unwrap();

        let now = counsel_util::now();
        store
            .complete_session(&session.id, clock("10:30"), &CompletionInput::default(), now)
            .unwrap();
        assert_eq!(
            store.auto_complete_session(&session.id, clock("11:00"), "[auto]", now).unwrap(),
            0
        );

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert!(!loaded.auto_completed);
        assert_eq!(loaded.exit_time, Some(clock("10:30")));
        assert_eq!(loaded.evaluation.detailed_notes, None);
    }

    #[test]
    fn test_grant_extension_once() {
        let store = SqliteStore::in_memory().unwrap();
        let session = sample_session("2024-01-01", "10:00", &["s-1"]);
        store.insert_session(&session).unwrap();

        let now = counsel_util::now();
        assert_eq!(store.grant_extension(&session.id, now).unwrap(), 1);
        assert_eq!(store.grant_extension(&session.id, now).unwrap(), 0);
        assert_eq!(store.grant_extension(&SessionId::new(), now).unwrap(), 0);
        assert!(store.get_session(&session.id).unwrap().unwrap().extension_granted);
    }

    #[test]
    fn test_delete_cascades_to_participants() {
        let store = SqliteStore::in_memory().unwrap();
        let session = sample_session("2024-01-01", "10:00", &["s-1", "s-2"]);
        store.insert_session(&session).unwrap();
        assert_eq!(participant_rows(&store, &session.id), 2);

        assert_eq!(store.delete_session(&session.id).unwrap(), 1);
        assert_eq!(participant_rows(&store, &session.id), 0);
        assert_eq!(store.delete_session(&session.id).unwrap(), 0);
    }

    #[test]
    fn test_list_active_sessions() {
        let store = SqliteStore::in_memory().unwrap();
        let open = sample_session("2024-01-01", "10:00", &["s-1"]);
        let closed = sample_session("2024-01-01", "09:00", &["s-2"]);
        store.insert_session(&open).unwrap();
        store.insert_session(&closed).unwrap();
        store
            .complete_session(
                &closed.id,
                clock("09:30"),
                &CompletionInput::default(),
                counsel_util::now(),
            )
            .unwrap();

        let active = store.list_active_sessions().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);
        assert_eq!(active[0].entry_time, clock("10:00"));
        assert!(!active[0].extension_granted);
    }

    #[test]
    fn test_class_filter_returns_group_session_once() {
        let store = SqliteStore::in_memory().unwrap();
        for (id, class) in [("s-1", "9-A"), ("s-2", "9-A"), ("s-3", "10-B")] {
            store
                .upsert_student(&StudentRecord {
                    id: StudentId::from(id),
                    name: format!("Student {id}"),
                    class_name: Some(class.into()),
                })
                .unwrap();
        }

        let group = sample_session("2024-01-02", "10:00", &["s-1", "s-2"]);
        let other = sample_session("2024-01-03", "10:00", &["s-3"]);
        store.insert_session(&group).unwrap();
        store.insert_session(&other).unwrap();

        let filter = SessionFilter {
            class_name: Some("9-A".into()),
            ..Default::default()
        };
        let sessions = store.query_sessions(&filter).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, group.id);
        assert_eq!(sessions[0].participants.len(), 2);
    }

    #[test]
    fn test_query_orders_newest_first_and_limits() {
        let store = SqliteStore::in_memory().unwrap();
        let early = sample_session("2024-01-01", "09:00", &["s-1"]);
        let late_same_day = sample_session("2024-01-01", "14:00", &["s-1"]);
        let next_day = sample_session("2024-01-02", "08:00", &["s-1"]);
        for s in [&early, &late_same_day, &next_day] {
            store.insert_session(s).unwrap();
        }

        let all = store.query_sessions(&SessionFilter::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![next_day.id.clone(), late_same_day.id.clone(), early.id.clone()]);

        let filter = SessionFilter {
            start_date: Some(parse_date("2024-01-01").unwrap()),
            end_date: Some(parse_date("2024-01-01").unwrap()),
            limit: Some(1),
            ..Default::default()
        };
        let limited = store.query_sessions(&filter).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, late_same_day.id);
    }

    #[test]
    fn test_topic_filter_is_case_insensitive_and_literal() {
        let store = SqliteStore::in_memory().unwrap();
        let mut percent = sample_session("2024-01-01", "09:00", &["s-1"]);
        percent.topic = "100% attendance".into();
        let mut plain = sample_session("2024-01-01", "10:00", &["s-2"]);
        plain.topic = "1000 attendance".into();
        store.insert_session(&percent).unwrap();
        store.insert_session(&plain).unwrap();

        let filter = SessionFilter {
            topic: Some("100%".into()),
            ..Default::default()
        };
        let found = store.query_sessions(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, percent.id);

        let filter = SessionFilter {
            topic: Some("ATTENDANCE".into()),
            ..Default::default()
        };
        assert_eq!(store.query_sessions(&filter).unwrap().len(), 2);
    }

    #[test]
    fn test_topic_filter_folds_non_ascii() {
        let store = SqliteStore::in_memory().unwrap();
        let mut conflict = sample_session("2024-01-01", "09:00", &["s-1"]);
        conflict.topic = "Çatışma Yönetimi".into();
        let mut other = sample_session("2024-01-01", "10:00", &["s-2"]);
        other.topic = "Sınav kaygısı".into();
        store.insert_session(&conflict).unwrap();
        store.insert_session(&other).unwrap();

        for needle in ["Çatışma", "çatışma", "YÖNETIMI", "ma yö"] {
            let filter = SessionFilter {
                topic: Some(needle.into()),
                ..Default::default()
            };
            let found = store.query_sessions(&filter).unwrap();
            assert_eq!(found.len(), 1, "filter {needle:?}");
            assert_eq!(found[0].id, conflict.id);
        }

        let filter = SessionFilter {
            topic: Some("kaygı".into()),
            ..Default::default()
        };
        let found = store.query_sessions(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, other.id);
    }

    #[test]
    fn test_student_filter() {
        let store = SqliteStore::in_memory().unwrap();
        let with_student = sample_session("2024-01-01", "09:00", &["s-1", "s-2"]);
        let without = sample_session("2024-01-01", "10:00", &["s-3"]);
        store.insert_session(&with_student).unwrap();
        store.insert_session(&without).unwrap();

        let filter = SessionFilter {
            student_id: Some(StudentId::from("s-2")),
            completed: Some(false),
            ..Default::default()
        };
        let found = store.query_sessions(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, with_student.id);
    }

    #[test]
    fn test_session_timings_range() {
        let store = SqliteStore::in_memory().unwrap();
        for date in ["2023-12-31", "2024-01-01", "2024-01-05", "2024-01-06"] {
            store.insert_session(&sample_session(date, "10:00", &["s-1"])).unwrap();
        }

        let range = (parse_date("2024-01-01").unwrap(), parse_date("2024-01-05").unwrap());
        assert_eq!(store.session_timings(Some(range)).unwrap().len(), 2);
        assert_eq!(store.session_timings(None).unwrap().len(), 4);
    }

    #[test]
    fn test_count_by_and_classes() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert_student(&StudentRecord {
                id: StudentId::from("s-1"),
                name: "Ada".into(),
                class_name: Some("9-A".into()),
            })
            .unwrap();

        let mut a = sample_session("2024-01-01", "09:00", &["s-1"]);
        a.topic = "Career".into();
        let mut b = sample_session("2024-01-01", "10:00", &["s-unknown"]);
        b.topic = "Career".into();
        store.insert_session(&a).unwrap();
        store.insert_session(&b).unwrap();

        let topics = store.count_by(CategoryField::Topic).unwrap();
        assert_eq!(topics, vec![("Career".to_string(), 2)]);

        let mut classes = store.session_classes().unwrap();
        classes.sort_by_key(|(_, class)| class.clone());
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0], (b.id.clone(), None));
        assert_eq!(classes[1], (a.id.clone(), Some("9-A".to_string())));
    }

    #[test]
    fn test_upsert_student_updates_class() {
        let store = SqliteStore::in_memory().unwrap();
        let session = sample_session("2024-01-01", "10:00", &["s-1"]);
        store.insert_session(&session).unwrap();

        let mut student = StudentRecord {
            id: StudentId::from("s-1"),
            name: "Ada".into(),
            class_name: Some("9-A".into()),
        };
        store.upsert_student(&student).unwrap();

        student.class_name = Some("10-A".into());
        store.upsert_student(&student).unwrap();

        let classes = store.session_classes().unwrap();
        assert_eq!(classes, vec![(session.id.clone(), Some("10-A".to_string()))]);
    }

    #[test]
    fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("counseld.db");
        let session = sample_session("2024-01-01", "10:00", &["s-1"]);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_session(&session).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.session_exists(&session.id).unwrap());
        assert_eq!(store.list_active_sessions().unwrap().len(), 1);
    }
}
