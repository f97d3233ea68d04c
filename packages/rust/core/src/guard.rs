//! Safety validation and row bounding for generated queries.
//!
//! Bound parameters are what keep user text out of query syntax; this
//! module is a second line that refuses anything that is not a plain read.

use std::sync::LazyLock;

use aulabot_shared::{AulabotError, QuerySpec, Result};
use regex::Regex;

/// Row bound used by [`optimize`].
pub const DEFAULT_BOUND: u32 = 50;

/// REST actions the backend may be asked for.
pub const ALLOWED_ACTIONS: &[&str] = &[
    "estudiantes",
    "estudiante",
    "estudiantes_curso",
    "buscar_estudiantes",
    "notas_estudiante",
    "profesores",
    "cursos",
    "materias",
    "especialidades",
    "llamados",
    "horarios",
    "estadisticas",
    "estadisticas_curso",
    "reporte_asistencia",
    "health",
];

static BLOCKED_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|drop|alter|create|truncate|exec|execute|union|replace|grant|attach|detach|pragma|vacuum)\b",
    )
    .expect("blocked keyword regex")
});

static LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\b").expect("limit regex"));

const BLOCKED_MARKERS: &[&str] = &["--", "/*", "*/", ";", "#"];

/// Whether a query may be sent to its backend.
pub fn validate(query: &QuerySpec) -> bool {
    check(query).is_ok()
}

/// Like [`validate`], with the reason for a rejection.
pub fn check(query: &QuerySpec) -> Result<()> {
    match query {
        QuerySpec::Sql(sql) => {
            let text = sql.text.trim();
            let starts_with_select = text
                .get(..6)
                .is_some_and(|head| head.eq_ignore_ascii_case("select"));
            if !starts_with_select {
                return Err(AulabotError::validation("statement must start with SELECT"));
            }
            if let Some(m) = BLOCKED_KEYWORD_RE.find(text) {
                return Err(AulabotError::validation(format!(
                    "keyword '{}' is not allowed",
                    m.as_str().to_lowercase()
                )));
            }
            if let Some(marker) = BLOCKED_MARKERS.iter().find(|m| text.contains(**m)) {
                return Err(AulabotError::validation(format!(
                    "marker '{marker}' is not allowed"
                )));
            }
            Ok(())
        }
        QuerySpec::Rest(rest) => {
            if ALLOWED_ACTIONS.contains(&rest.action.as_str()) {
                Ok(())
            } else {
                Err(AulabotError::validation(format!(
                    "action '{}' is not allowed",
                    rest.action
                )))
            }
        }
    }
}

/// Append a [`DEFAULT_BOUND`] row limit if none is present.
pub fn optimize(query: QuerySpec) -> QuerySpec {
    optimize_with(query, DEFAULT_BOUND)
}

/// Append a row limit of `bound` if none is present. Idempotent.
pub fn optimize_with(query: QuerySpec, bound: u32) -> QuerySpec {
    match query {
        QuerySpec::Sql(mut sql) => {
            if !LIMIT_RE.is_match(&sql.text) {
                sql.text = format!("{} LIMIT {bound}", sql.text.trim_end());
            }
            QuerySpec::Sql(sql)
        }
        QuerySpec::Rest(mut rest) => {
            rest.params
                .entry("limit".to_string())
                .or_insert_with(|| bound.to_string());
            QuerySpec::Rest(rest)
        }
    }
}
