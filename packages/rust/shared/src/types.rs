//! Core domain types: intents, entities, queries, and result rows.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// The classified purpose of a user question.
///
/// Declaration order is significant: when two intents score the same number
/// of trigger phrases, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ListStudents,
    SearchStudent,
    StudentGrades,
    CourseStatistics,
    AttentionCalls,
    Teachers,
    Schedules,
    Subjects,
    GeneralStatistics,
    Reports,
    Ambiguous,
}

impl Intent {
    /// Every intent, in declaration (tie-break) order.
    pub const ALL: [Intent; 11] = [
        Intent::ListStudents,
        Intent::SearchStudent,
        Intent::StudentGrades,
        Intent::CourseStatistics,
        Intent::AttentionCalls,
        Intent::Teachers,
        Intent::Schedules,
        Intent::Subjects,
        Intent::GeneralStatistics,
        Intent::Reports,
        Intent::Ambiguous,
    ];

    /// Stable label used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListStudents => "list_students",
            Self::SearchStudent => "search_student",
            Self::StudentGrades => "student_grades",
            Self::CourseStatistics => "course_statistics",
            Self::AttentionCalls => "attention_calls",
            Self::Teachers => "teachers",
            Self::Schedules => "schedules",
            Self::Subjects => "subjects",
            Self::GeneralStatistics => "general_statistics",
            Self::Reports => "reports",
            Self::Ambiguous => "ambiguous",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A school course reference such as `3° B`.
///
/// A missing division means "any division of that year".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
}

impl Course {
    pub fn new(year: u32, division: Option<&str>) -> Self {
        Self {
            year,
            division: division.map(|d| d.to_uppercase()),
        }
    }

    /// Whether both year and division are known.
    pub fn is_qualified(&self) -> bool {
        self.division.is_some()
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.division {
            Some(division) => write!(f, "{}° {division}", self.year),
            None => write!(f, "{}°", self.year),
        }
    }
}

/// Structured values extracted from a question. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<Course>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_name: Option<String>,
    /// Report topic keyword (e.g. `asistencia`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numbers: Vec<u64>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.course.is_none()
            && self.specialty.is_none()
            && self.subject.is_none()
            && self.shift.is_none()
            && self.person_name.is_none()
            && self.topic.is_none()
            && self.numbers.is_empty()
    }

    /// All free-text entity values, in a fixed order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        [
            self.topic.as_deref(),
            self.subject.as_deref(),
            self.specialty.as_deref(),
            self.shift.as_deref(),
            self.person_name.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

// ---------------------------------------------------------------------------
// QuerySpec
// ---------------------------------------------------------------------------

/// Which data source flavour queries are built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The school administration REST endpoint.
    #[default]
    Rest,
    /// A SQL database reached through bound-parameter statements.
    Sql,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest => f.write_str("rest"),
            Self::Sql => f.write_str("sql"),
        }
    }
}

/// A value bound to a positional `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// A single read-only statement plus its bound values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub text: String,
    #[serde(default)]
    pub params: Vec<SqlValue>,
}

/// A REST action name plus its query-string parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestQuery {
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl RestQuery {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }
}

/// Backend-agnostic description of what to fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum QuerySpec {
    Sql(SqlQuery),
    Rest(RestQuery),
}

impl QuerySpec {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Sql(_) => Backend::Sql,
            Self::Rest(_) => Backend::Rest,
        }
    }

    /// Short label for logs: the REST action or the first line of SQL.
    pub fn label(&self) -> String {
        match self {
            Self::Rest(q) => q.action.clone(),
            Self::Sql(q) => q
                .text
                .split_whitespace()
                .take(6)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

// ---------------------------------------------------------------------------
// Result rows
// ---------------------------------------------------------------------------

/// One row returned by a fetcher: field name to scalar value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRow(pub Map<String, Value>);

/// Ordered rows as returned by the backend.
pub type ResultSet = Vec<ResultRow>;

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Text form of a field. `None` for missing, null, or empty values.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Text form of a field, or `N/A`.
    pub fn text_or_na(&self, field: &str) -> String {
        self.text(field).unwrap_or_else(|| "N/A".to_string())
    }

    /// Numeric form of a field, coercing numeric strings (`"7.50"`, `"8,5"`).
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
        .filter(|n| n.is_finite())
    }

    /// Integer form of a field, coercing numeric strings.
    pub fn integer(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Truthiness the way the backend encodes flags (`1`, `"1"`, `true`).
    pub fn flag(&self, field: &str) -> bool {
        match self.0.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => {
                let s = s.trim();
                !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false")
            }
            _ => false,
        }
    }

    /// `nombre apellido`, trimmed.
    pub fn full_name(&self) -> String {
        let name = self.text("nombre").unwrap_or_default();
        let surname = self.text("apellido").unwrap_or_default();
        format!("{name} {surname}").trim().to_string()
    }

    /// `anio° division`, e.g. `3° B`.
    pub fn course_label(&self) -> String {
        format!(
            "{}° {}",
            self.text("anio").unwrap_or_default(),
            self.text("division").unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

impl From<Map<String, Value>> for ResultRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
