//! Filtered session queries
//!
//! A [`SessionFilter`] becomes an ordered list of `(clause, parameter)`
//! pairs. Each clause is a fixed SQL fragment with a single `?`; values are
//! always bound, never spliced into the statement text. Clauses are joined
//! with `AND`.

use counsel_api::SessionFilter;
use rusqlite::ToSql;

/// Session columns in the order every session read selects them
pub(crate) const SESSION_COLUMNS: &str = "s.id, s.counselor_id, s.session_type, s.group_name, \
     s.participant_type, s.relationship_type, s.topic, s.session_date, s.entry_time, \
     s.exit_time, s.entry_period_id, s.entry_hour, s.exit_period_id, s.exit_hour, \
     s.session_mode, s.session_location, s.discipline_status, s.institutional_cooperation, \
     s.session_details, s.session_flow, s.student_participation_level, s.cooperation_level, \
     s.emotional_state, s.physical_state, s.communication_quality, s.tags_json, \
     s.achieved_outcomes_json, s.follow_up_needed, s.follow_up_plan, s.action_items_json, \
     s.detailed_notes, s.completed, s.auto_completed, s.extension_granted, \
     s.created_at, s.updated_at";

const ORDER_BY: &str = " ORDER BY s.session_date DESC, s.entry_time DESC";

/// One bound predicate
pub struct Predicate {
    pub clause: &'static str,
    pub param: Box<dyn ToSql>,
}

/// Ordered predicate list
#[derive(Default)]
pub struct Predicates {
    items: Vec<Predicate>,
}

impl Predicates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: &'static str, param: impl ToSql + 'static) {
        self.items.push(Predicate {
            clause,
            param: Box::new(param),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn clauses(&self) -> Vec<&'static str> {
        self.items.iter().map(|p| p.clause).collect()
    }

    /// ` WHERE a AND b`, or an empty string without predicates
    pub fn where_sql(&self) -> String {
        if self.items.is_empty() {
            return String::new();
        }
        format!(" WHERE {}", self.clauses().join(" AND "))
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.items.iter().map(|p| p.param.as_ref()).collect()
    }
}

/// A complete statement plus the values to bind, in placeholder order
pub struct SessionQuery {
    pub sql: String,
    predicates: Predicates,
    limit: Option<i64>,
}

impl SessionQuery {
    pub fn params(&self) -> Vec<&dyn ToSql> {
        let mut params = self.predicates.params();
        if let Some(limit) = &self.limit {
            params.push(limit as &dyn ToSql);
        }
        params
    }

    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }
}

/// Escape `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Translate a filter into predicates. Blank strings do not constrain.
pub fn session_predicates(filter: &SessionFilter) -> Predicates {
    let mut predicates = Predicates::new();

    if let Some(start) = filter.start_date {
        predicates.push("s.session_date >= ?", counsel_util::format_date(start));
    }
    if let Some(end) = filter.end_date {
        predicates.push("s.session_date <= ?", counsel_util::format_date(end));
    }
    if let Some(topic) = non_blank(&filter.topic) {
        predicates.push(
            "unicode_lower(s.topic) LIKE ? ESCAPE '\\'",
            format!("%{}%", escape_like(&topic.to_lowercase())),
        );
    }
    if let Some(class_name) = non_blank(&filter.class_name) {
        predicates.push("st.class_name = ?", class_name.to_string());
    }
    if let Some(completed) = filter.completed {
        predicates.push("s.completed = ?", completed);
    }
    if let Some(participant_type) = non_blank(&filter.participant_type) {
        predicates.push("s.participant_type = ?", participant_type.to_string());
    }
    if let Some(session_type) = filter.session_type {
        predicates.push("s.session_type = ?", session_type.as_str());
    }
    if let Some(mode) = non_blank(&filter.session_mode) {
        predicates.push("s.session_mode = ?", mode.to_string());
    }
    if let Some(student_id) = &filter.student_id {
        predicates.push("sp.student_id = ?", student_id.as_str().to_string());
    }

    predicates
}

/// Build the full `SELECT` for a filter.
///
/// Class and student predicates join through participant links, so the
/// select is `DISTINCT` and a group session still yields a single row.
pub fn build_session_query(filter: &SessionFilter) -> SessionQuery {
    let predicates = session_predicates(filter);

    let mut sql = if filter.needs_participant_join() {
        format!(
            "SELECT DISTINCT {SESSION_COLUMNS} FROM sessions s \
             JOIN session_participants sp ON sp.session_id = s.id \
             LEFT JOIN students st ON st.id = sp.student_id"
        )
    } else {
        format!("SELECT {SESSION_COLUMNS} FROM sessions s")
    };

    sql.push_str(&predicates.where_sql());
    sql.push_str(ORDER_BY);

    let limit = filter.limit.map(i64::from);
    if limit.is_some() {
        sql.push_str(" LIMIT ?");
    }

    SessionQuery {
        sql,
        predicates,
        limit,
    }
}
