//! The question-answering pipeline and the direct read operations.
//!
//! ```text
//! classify -> extract -> build -> fetch -> analyze -> render
//! ```
//!
//! Only the fetch step can fail; its error is reported inside the
//! [`Answer`] rather than returned.

use std::sync::Arc;
use std::time::Instant;

use aulabot_nlp::{EntityExtractor, IntentClassifier};
use aulabot_shared::{
    AulabotError, Backend, EntitySet, Fetcher, Intent, Result, ResultSet, RowLimits,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::analyzer::{Analysis, Analyzer, SystemStatistics};
use crate::builder::{CourseFilter, DataRequest, QueryBuilder};
use crate::guard;
use crate::render::{self, Renderer};

/// Everything produced for one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub success: bool,
    pub question: String,
    pub response: String,
    pub data: ResultSet,
    pub analysis: Analysis,
    pub intent: Intent,
    pub entities: EntitySet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of the backend probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_estudiantes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Wires the pipeline components to one [`Fetcher`].
pub struct Assistant {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    builder: QueryBuilder,
    analyzer: Analyzer,
    renderer: Renderer,
    fetcher: Arc<dyn Fetcher>,
}

impl Assistant {
    /// `fetcher` serves both the builder's lookups and the final query.
    pub fn new(backend: Backend, limits: RowLimits, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            extractor: EntityExtractor::new(),
            builder: QueryBuilder::new(backend, limits, fetcher.clone()),
            analyzer: Analyzer::new(),
            renderer: Renderer::new(),
            fetcher,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn backend(&self) -> Backend {
        self.builder.backend()
    }

    /// Answer a natural-language question.
    #[instrument(skip_all, fields(backend = %self.builder.backend()))]
    pub async fn answer(&self, question: &str) -> Answer {
        let start = Instant::now();
        let question = question.trim();
        let intent = self.classifier.classify(question);
        let entities = self.extractor.extract(question);
        info!(%intent, ?entities, "question understood");

        if question.is_empty() {
            return failure(
                question,
                intent,
                entities,
                AulabotError::validation("question is empty"),
            );
        }

        let query = self.builder.build(intent, &entities).await;
        let rows = match self.fetcher.fetch(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, %intent, "fetch failed");
                return failure(question, intent, entities, e);
            }
        };

        let analysis = self.analyzer.analyze(&rows, intent);
        let response = self.renderer.render(&rows, &analysis, intent);
        info!(
            %intent,
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "question answered"
        );

        Answer {
            success: true,
            question: question.to_string(),
            response,
            data: rows,
            analysis,
            intent,
            entities,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Probe the backend with a cheap count query.
    pub async fn health(&self) -> HealthReport {
        let query = self.builder.lower(&DataRequest::Health);
        let (healthy, total_estudiantes, error) = match self.fetcher.fetch(&query).await {
            Ok(rows) => (
                true,
                rows.first().and_then(|row| row.integer("total_estudiantes")),
                None,
            ),
            Err(e) => {
                warn!(error = %e, "health probe failed");
                (false, None, Some(e.to_string()))
            }
        };

        HealthReport {
            healthy,
            backend: self.fetcher.name().to_string(),
            total_estudiantes,
            error,
            timestamp: Utc::now(),
        }
    }

    /// Aggregate counts with per-student ratios.
    pub async fn system_statistics(&self) -> Result<SystemStatistics> {
        let rows = self.run(&DataRequest::GeneralStatistics).await?;
        let row = rows
            .first()
            .ok_or_else(|| AulabotError::Backend("no statistics returned".into()))?;
        Ok(SystemStatistics::from_row(row, Utc::now()))
    }

    /// Active students, optionally in one course and/or matching a name.
    pub async fn list_students(
        &self,
        course_id: Option<i64>,
        search: Option<&str>,
    ) -> Result<ResultSet> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        self.run(&DataRequest::Students {
            course: course_id.map_or(CourseFilter::Any, CourseFilter::Id),
            search: search.map(str::to_string),
        })
        .await
    }

    pub async fn list_courses(&self) -> Result<ResultSet> {
        self.run(&DataRequest::Courses).await
    }

    async fn run(&self, request: &DataRequest) -> Result<ResultSet> {
        let query = self.builder.lower(request);
        guard::check(&query)?;
        debug!(query = %query.label(), "direct listing");
        self.fetcher.fetch(&query).await
    }
}

fn failure(question: &str, intent: Intent, entities: EntitySet, error: AulabotError) -> Answer {
    Answer {
        success: false,
        question: question.to_string(),
        response: render::GENERIC_ERROR.to_string(),
        data: Vec::new(),
        analysis: Analysis::NoData,
        intent,
        entities,
        error: Some(error.to_string()),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use aulabot_fetch::{RetryPolicy, RetryingFetcher};
    use aulabot_shared::{Course, QuerySpec, ResultRow};
    use aulabot_storage::Storage;
    use uuid::Uuid;

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("aulabot_core_test_{}.db", Uuid::now_v7()))
    }

    async fn demo_assistant(path: &PathBuf) -> Assistant {
        let storage = Storage::open(path).await.expect("open storage");
        storage.seed_demo().await.expect("seed");
        Assistant::new(Backend::Sql, RowLimits::default(), Arc::new(storage))
            .with_analyzer(Analyzer::with_reference_year(2025))
    }

    #[tokio::test]
    async fn answers_course_listing_end_to_end() {
        let path = temp_db();
        let assistant = demo_assistant(&path).await;

        let answer = assistant.answer("¿Cuántos estudiantes hay en 3° B?").await;

        assert!(answer.success, "{:?}", answer.error);
        assert_eq!(answer.intent, Intent::ListStudents);
        assert_eq!(answer.entities.course, Some(Course::new(3, Some("B"))));
        assert_eq!(answer.data.len(), 12);
        let Analysis::Students(students) = &answer.analysis else {
            panic!("expected student analysis")
        };
        assert_eq!(students.course_distribution.get("3° B"), Some(&12));
        assert_eq!(students.specialty_distribution.get("Informática"), Some(&12));
        assert!(answer.response.starts_with("Encontré 12 estudiantes:"));
        assert!(answer.response.contains("1. Ana Acosta - 3° B"));
        assert!(answer.response.ends_with("... y 2 estudiantes más."));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn answers_grades_by_student_name() {
        let path = temp_db();
        let assistant = demo_assistant(&path).await;

        let answer = assistant.answer("Mostrame las notas de Ana Acosta").await;

        assert!(answer.success);
        assert_eq!(answer.intent, Intent::StudentGrades);
        assert_eq!(answer.data.len(), 4);
        let Analysis::Grades(grades) = &answer.analysis else {
            panic!("expected grade analysis")
        };
        assert_eq!(grades.average_grade, Some(7.25));
        assert!(answer.response.contains("Promedio general: 7.25"));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn injection_attempt_is_just_a_name() {
        let path = temp_db();
        let assistant = demo_assistant(&path).await;

        let answer = assistant
            .answer("llamados de atención de Robert'); DROP TABLE estudiantes; --")
            .await;
        assert!(answer.success);

        let still_there = assistant.list_students(None, None).await.expect("list");
        assert_eq!(still_there.len(), 19);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn direct_listings_and_stats() {
        let path = temp_db();
        let assistant = demo_assistant(&path).await;

        let course = assistant.list_students(Some(5), None).await.expect("course");
        assert_eq!(course.len(), 12);
        assert_eq!(course[0].full_name(), "Ana Acosta");

        let found = assistant
            .list_students(None, Some("  lópez "))
            .await
            .expect("search");
        assert_eq!(found.len(), 1);

        let courses = assistant.list_courses().await.expect("courses");
        assert_eq!(courses.len(), 5);

        let stats = assistant.system_statistics().await.expect("stats");
        assert_eq!(stats.estudiantes, 19);
        assert_eq!(stats.llamados, 5);
        assert_eq!(stats.llamados_por_estudiante, 0.26);

        let health = assistant.health().await;
        assert!(health.healthy);
        assert_eq!(health.backend, "sql");
        assert_eq!(health.total_estudiantes, Some(19));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn empty_question_is_a_failure_not_a_panic() {
        let path = temp_db();
        let assistant = demo_assistant(&path).await;

        let answer = assistant.answer("   ").await;
        assert!(!answer.success);
        assert_eq!(answer.intent, Intent::Ambiguous);
        assert_eq!(answer.response, render::GENERIC_ERROR);

        let _ = std::fs::remove_file(&path);
    }

    /// Times out a fixed number of times, then answers.
    struct Flaky {
        timeouts: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch(&self, _query: &QuerySpec) -> Result<ResultSet> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.timeouts {
                return Err(AulabotError::Timeout(format!("attempt {call}")));
            }
            Ok(vec![
                ResultRow::new()
                    .with("nombre", "Laura")
                    .with("apellido", "Correa")
                    .with("email", "laura.correa@escuela.edu")
                    .with("activo", 1),
            ])
        }
    }

    fn retrying(timeouts: u32) -> (Arc<Flaky>, Assistant) {
        let flaky = Arc::new(Flaky {
            timeouts,
            calls: AtomicU32::new(0),
        });
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        };
        let fetcher = Arc::new(RetryingFetcher::new(flaky.clone(), policy));
        let assistant = Assistant::new(Backend::Rest, RowLimits::default(), fetcher);
        (flaky, assistant)
    }

    #[tokio::test]
    async fn two_timeouts_then_success_is_invisible() {
        let (flaky, assistant) = retrying(2);
        let answer = assistant.answer("listar profesores").await;

        assert!(answer.success);
        assert!(answer.error.is_none());
        assert_eq!(answer.intent, Intent::Teachers);
        assert!(answer.response.contains("Laura Correa - laura.correa@escuela.edu"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn three_timeouts_fail_with_timeout_message() {
        let (flaky, assistant) = retrying(3);
        let answer = assistant.answer("listar profesores").await;

        assert!(!answer.success);
        let error = answer.error.expect("error message");
        assert!(error.starts_with("timeout"), "{error}");
        assert!(error.contains("after 3 attempts"), "{error}");
        assert!(answer.data.is_empty());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }
}
