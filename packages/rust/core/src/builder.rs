//! Intent + entities → a validated, row-bounded [`QuerySpec`].
//!
//! Building happens in two steps. [`QueryBuilder::plan`] picks a
//! backend-neutral [`DataRequest`] for the intent, resolving course and
//! student references through at most one auxiliary lookup. The request is
//! then lowered to SQL or REST, bounded, and checked by the guard. Nothing
//! here returns an error: unresolved entities widen the request, and a
//! query the guard refuses is replaced by the fallback listing.

use std::sync::Arc;

use aulabot_shared::{
    Backend, Course, EntitySet, Fetcher, Intent, QuerySpec, RowLimits, ResultSet,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{guard, rest, sql};

/// Words that route a report request to the attendance report.
const ATTENDANCE_KEYWORDS: &[&str] = &["asistencia", "inasistencia", "ausencia"];

// ---------------------------------------------------------------------------
// DataRequest
// ---------------------------------------------------------------------------

/// Which students of which course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseFilter {
    Any,
    /// A resolved course id.
    Id(i64),
    /// Every division of a year.
    Year(u32),
}

/// A backend-neutral description of the rows to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum DataRequest {
    Students {
        course: CourseFilter,
        search: Option<String>,
    },
    SearchStudents {
        term: String,
    },
    StudentGrades {
        student_id: i64,
        subject: Option<String>,
    },
    CourseStatistics {
        course_id: Option<i64>,
    },
    AttentionCalls {
        name: Option<String>,
        course: Option<Course>,
    },
    Teachers {
        name: Option<String>,
        subject: Option<String>,
    },
    Schedules {
        course: Option<Course>,
        subject: Option<String>,
    },
    Subjects {
        specialty: Option<String>,
        name: Option<String>,
    },
    GeneralStatistics,
    AttendanceReport,
    Courses,
    Health,
}

impl DataRequest {
    /// Every active student, unfiltered.
    pub fn all_students() -> Self {
        Self::Students {
            course: CourseFilter::Any,
            search: None,
        }
    }

    /// Filters the REST endpoint has no parameter for.
    pub(crate) fn has_unexpressible_rest_filters(&self) -> bool {
        match self {
            Self::Students { course, search } => {
                matches!(course, CourseFilter::Year(_))
                    || (search.is_some() && *course != CourseFilter::Any)
            }
            Self::StudentGrades { subject, .. } => subject.is_some(),
            Self::AttentionCalls { name, course } => name.is_some() || course.is_some(),
            Self::Teachers { name, subject } => name.is_some() || subject.is_some(),
            Self::Schedules { course, subject } => course.is_some() || subject.is_some(),
            Self::Subjects { specialty, name } => specialty.is_some() || name.is_some(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// QueryBuilder
// ---------------------------------------------------------------------------

/// Maps (intent, entities) to a backend query.
///
/// Holds a [`Fetcher`] only for the auxiliary lookups (course listing,
/// student search) some intents need before the final query can be built.
pub struct QueryBuilder {
    backend: Backend,
    limits: RowLimits,
    lookup: Arc<dyn Fetcher>,
}

impl QueryBuilder {
    pub fn new(backend: Backend, limits: RowLimits, lookup: Arc<dyn Fetcher>) -> Self {
        Self {
            backend,
            limits,
            lookup,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Build the query for an intent. Always returns a query that passes
    /// [`guard::validate`].
    #[instrument(skip_all, fields(intent = %intent, backend = %self.backend))]
    pub async fn build(&self, intent: Intent, entities: &EntitySet) -> QuerySpec {
        if intent == Intent::Ambiguous {
            debug!("ambiguous question, using capped default listing");
            return self.fallback();
        }
        let request = self.plan(intent, entities).await;
        let query = self.lower(&request);
        if let Err(e) = guard::check(&query) {
            warn!(error = %e, ?request, "generated query rejected, using fallback");
            return self.fallback();
        }
        info!(query = %query.label(), "query built");
        query
    }

    /// Choose the request for an intent, resolving entity references.
    pub async fn plan(&self, intent: Intent, entities: &EntitySet) -> DataRequest {
        match intent {
            Intent::ListStudents => {
                let course = match &entities.course {
                    Some(course) if course.is_qualified() => self
                        .resolve_course(course)
                        .await
                        .map_or(CourseFilter::Any, CourseFilter::Id),
                    Some(course) => CourseFilter::Year(course.year),
                    None => CourseFilter::Any,
                };
                DataRequest::Students {
                    course,
                    search: None,
                }
            }
            Intent::SearchStudent => match &entities.person_name {
                Some(name) => DataRequest::SearchStudents { term: name.clone() },
                None => DataRequest::all_students(),
            },
            Intent::StudentGrades => {
                let Some(name) = &entities.person_name else {
                    debug!("no student name, falling back to student list");
                    return DataRequest::all_students();
                };
                match self.resolve_student(name).await {
                    Some(student_id) => DataRequest::StudentGrades {
                        student_id,
                        subject: entities.subject.clone(),
                    },
                    None => DataRequest::all_students(),
                }
            }
            Intent::CourseStatistics => {
                let course_id = match &entities.course {
                    Some(course) if course.is_qualified() => self.resolve_course(course).await,
                    _ => None,
                };
                DataRequest::CourseStatistics { course_id }
            }
            Intent::AttentionCalls => DataRequest::AttentionCalls {
                name: entities.person_name.clone(),
                course: entities.course.clone(),
            },
            Intent::Teachers => DataRequest::Teachers {
                name: entities.person_name.clone(),
                subject: entities.subject.clone(),
            },
            Intent::Schedules => DataRequest::Schedules {
                course: entities.course.clone(),
                subject: entities.subject.clone(),
            },
            Intent::Subjects => DataRequest::Subjects {
                specialty: entities.specialty.clone(),
                name: entities.subject.clone(),
            },
            Intent::GeneralStatistics => DataRequest::GeneralStatistics,
            Intent::Reports => {
                if mentions_attendance(entities) {
                    DataRequest::AttendanceReport
                } else {
                    DataRequest::CourseStatistics { course_id: None }
                }
            }
            Intent::Ambiguous => DataRequest::all_students(),
        }
    }

    /// Lower a request for this builder's backend and apply its row bound.
    pub fn lower(&self, request: &DataRequest) -> QuerySpec {
        let query = match self.backend {
            Backend::Sql => QuerySpec::Sql(sql::lower(request)),
            Backend::Rest => QuerySpec::Rest(rest::lower(request)),
        };
        guard::optimize_with(query, self.bound_for(request))
    }

    /// The capped default listing used when anything goes wrong.
    pub fn fallback(&self) -> QuerySpec {
        let query = match self.backend {
            Backend::Sql => QuerySpec::Sql(sql::lower(&DataRequest::all_students())),
            Backend::Rest => QuerySpec::Rest(rest::lower(&DataRequest::all_students())),
        };
        guard::optimize_with(query, self.limits.default)
    }

    fn bound_for(&self, request: &DataRequest) -> u32 {
        match request {
            DataRequest::SearchStudents { .. } => self.limits.search,
            DataRequest::Students { .. }
            | DataRequest::StudentGrades { .. }
            | DataRequest::Schedules { .. }
            | DataRequest::Subjects { .. }
            | DataRequest::Courses => self.limits.list,
            _ => self.limits.default,
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Course id for an exact year + division match in the course listing.
    async fn resolve_course(&self, course: &Course) -> Option<i64> {
        let division = course.division.as_deref()?;
        let rows = self.lookup_rows(&DataRequest::Courses).await?;

        let found = rows.iter().find(|row| {
            row.integer("anio") == Some(i64::from(course.year))
                && row
                    .text("division")
                    .is_some_and(|d| d.eq_ignore_ascii_case(division))
        });

        match found.and_then(|row| row.integer("id")) {
            Some(id) => {
                debug!(%course, course_id = id, "course resolved");
                Some(id)
            }
            None => {
                debug!(%course, "course not found, widening query");
                None
            }
        }
    }

    /// Id of the first student whose name matches.
    async fn resolve_student(&self, name: &str) -> Option<i64> {
        let rows = self
            .lookup_rows(&DataRequest::SearchStudents {
                term: name.to_string(),
            })
            .await?;
        let id = rows.first().and_then(|row| row.integer("id"));
        debug!(name, student_id = ?id, candidates = rows.len(), "student lookup");
        id
    }

    async fn lookup_rows(&self, request: &DataRequest) -> Option<ResultSet> {
        let query = self.lower(request);
        match self.lookup.fetch(&query).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(error = %e, query = %query.label(), "lookup failed, widening query");
                None
            }
        }
    }
}

fn mentions_attendance(entities: &EntitySet) -> bool {
    entities
        .texts()
        .any(|text| ATTENDANCE_KEYWORDS.iter().any(|k| text.contains(k)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use aulabot_shared::{AulabotError, Result, ResultRow, SqlValue};

    /// Answers course listings and student searches from fixed rows and
    /// records every query it sees.
    struct Directory {
        seen: Mutex<Vec<QuerySpec>>,
        fail: bool,
    }

    impl Directory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn lookups(&self) -> usize {
            self.seen.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl Fetcher for Directory {
        fn name(&self) -> &str {
            "directory"
        }

        async fn fetch(&self, query: &QuerySpec) -> Result<ResultSet> {
            self.seen.lock().expect("lock").push(query.clone());
            if self.fail {
                return Err(AulabotError::Timeout("lookup".into()));
            }
            let label = query.label();
            if label.contains("cursos") || label.contains("c.id, c.anio") {
                Ok(vec![
                    ResultRow::new().with("id", "1").with("anio", "1").with("division", "A"),
                    ResultRow::new().with("id", "5").with("anio", "3").with("division", "B"),
                ])
            } else {
                Ok(vec![
                    ResultRow::new().with("id", 13).with("nombre", "María").with("apellido", "López"),
                ])
            }
        }
    }

    fn builder(backend: Backend, lookup: Arc<Directory>) -> QueryBuilder {
        QueryBuilder::new(backend, RowLimits::default(), lookup)
    }

    fn entities_with_course(year: u32, division: Option<&str>) -> EntitySet {
        EntitySet {
            course: Some(Course::new(year, division)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn qualified_course_is_resolved_with_one_lookup() {
        let lookup = Directory::new();
        let b = builder(Backend::Rest, lookup.clone());
        let query = b
            .build(Intent::ListStudents, &entities_with_course(3, Some("B")))
            .await;

        assert_eq!(lookup.lookups(), 1);
        let QuerySpec::Rest(q) = query else {
            panic!("expected REST")
        };
        assert_eq!(q.action, "estudiantes_curso");
        assert_eq!(q.params.get("curso_id").map(String::as_str), Some("5"));
        assert_eq!(q.params.get("limit").map(String::as_str), Some("100"));
    }

    #[tokio::test]
    async fn unknown_course_widens_to_all_students() {
        let b = builder(Backend::Rest, Directory::new());
        let request = b
            .plan(Intent::ListStudents, &entities_with_course(6, Some("Z")))
            .await;
        assert_eq!(request, DataRequest::all_students());
    }

    #[tokio::test]
    async fn failed_lookup_widens_instead_of_failing() {
        let b = builder(Backend::Sql, Directory::failing());
        let request = b
            .plan(Intent::CourseStatistics, &entities_with_course(3, Some("B")))
            .await;
        assert_eq!(request, DataRequest::CourseStatistics { course_id: None });
    }

    #[tokio::test]
    async fn year_only_course_skips_lookup() {
        let lookup = Directory::new();
        let b = builder(Backend::Sql, lookup.clone());
        let request = b.plan(Intent::ListStudents, &entities_with_course(2, None)).await;
        assert_eq!(
            request,
            DataRequest::Students {
                course: CourseFilter::Year(2),
                search: None
            }
        );
        assert_eq!(lookup.lookups(), 0);
    }

    #[tokio::test]
    async fn grades_resolve_student_then_bind_id() {
        let b = builder(Backend::Sql, Directory::new());
        let entities = EntitySet {
            person_name: Some("María López".into()),
            ..Default::default()
        };
        let QuerySpec::Sql(q) = b.build(Intent::StudentGrades, &entities).await else {
            panic!("expected SQL")
        };
        assert!(q.text.contains("n.estudiante_id = ?"));
        assert_eq!(q.params, vec![SqlValue::Integer(13)]);
        assert!(q.text.ends_with("LIMIT 100"));
    }

    #[tokio::test]
    async fn grades_without_name_fall_back_to_students() {
        let lookup = Directory::new();
        let b = builder(Backend::Rest, lookup.clone());
        let request = b.plan(Intent::StudentGrades, &EntitySet::default()).await;
        assert_eq!(request, DataRequest::all_students());
        assert_eq!(lookup.lookups(), 0);
    }

    #[tokio::test]
    async fn reports_sniff_attendance() {
        let b = builder(Backend::Rest, Directory::new());
        let attendance = EntitySet {
            topic: Some("asistencia".into()),
            ..Default::default()
        };
        assert_eq!(
            b.plan(Intent::Reports, &attendance).await,
            DataRequest::AttendanceReport
        );
        assert_eq!(
            b.plan(Intent::Reports, &EntitySet::default()).await,
            DataRequest::CourseStatistics { course_id: None }
        );
    }

    #[tokio::test]
    async fn every_intent_builds_a_valid_bounded_query() {
        let entity_sets = [
            EntitySet::default(),
            EntitySet {
                course: Some(Course::new(3, Some("B"))),
                person_name: Some("x'; DROP TABLE notas; --".into()),
                subject: Some("matemática".into()),
                specialty: Some("informática".into()),
                topic: Some("asistencia".into()),
                ..Default::default()
            },
        ];

        for backend in [Backend::Sql, Backend::Rest] {
            let b = builder(backend, Directory::new());
            for intent in Intent::ALL {
                for entities in &entity_sets {
                    let query = b.build(intent, entities).await;
                    assert!(guard::validate(&query), "{intent} {query:?}");
                    assert_eq!(guard::optimize(query.clone()), query, "{intent} unbounded");
                }
            }
        }
    }

    #[tokio::test]
    async fn ambiguous_uses_default_bound() {
        let b = builder(Backend::Rest, Directory::new());
        let QuerySpec::Rest(q) = b.build(Intent::Ambiguous, &EntitySet::default()).await else {
            panic!("expected REST")
        };
        assert_eq!(q.action, "estudiantes");
        assert_eq!(q.params.get("limit").map(String::as_str), Some("50"));

        // an explicit listing is bounded by the larger list limit
        let QuerySpec::Rest(list) = b.build(Intent::ListStudents, &EntitySet::default()).await
        else {
            panic!("expected REST")
        };
        assert_eq!(list.params.get("limit").map(String::as_str), Some("100"));
    }
}
