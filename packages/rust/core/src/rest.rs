//! REST lowering of [`DataRequest`]s to `api_ia.php` actions.
//!
//! The endpoint has one action per listing and few filters; filters it
//! cannot express are dropped and the broader listing is requested.

use aulabot_shared::RestQuery;
use tracing::debug;

use crate::builder::{CourseFilter, DataRequest};

pub(crate) fn lower(request: &DataRequest) -> RestQuery {
    let query = match request {
        DataRequest::Students { course, search } => match (course, search) {
            (_, Some(term)) => RestQuery::new("buscar_estudiantes").param("search", term.trim()),
            (CourseFilter::Id(id), None) => RestQuery::new("estudiantes_curso").param("curso_id", id),
            (CourseFilter::Any | CourseFilter::Year(_), None) => RestQuery::new("estudiantes"),
        },
        DataRequest::SearchStudents { term } => {
            RestQuery::new("buscar_estudiantes").param("search", term.trim())
        }
        DataRequest::StudentGrades { student_id, .. } => {
            RestQuery::new("notas_estudiante").param("estudiante_id", student_id)
        }
        DataRequest::CourseStatistics { course_id: Some(id) } => {
            RestQuery::new("estadisticas_curso").param("curso_id", id)
        }
        DataRequest::CourseStatistics { course_id: None } | DataRequest::Courses => {
            RestQuery::new("cursos")
        }
        DataRequest::AttentionCalls { .. } => RestQuery::new("llamados"),
        DataRequest::Teachers { .. } => RestQuery::new("profesores"),
        DataRequest::Schedules { .. } => RestQuery::new("horarios"),
        DataRequest::Subjects { .. } => RestQuery::new("materias"),
        DataRequest::GeneralStatistics => RestQuery::new("estadisticas"),
        DataRequest::AttendanceReport => RestQuery::new("reporte_asistencia"),
        DataRequest::Health => RestQuery::new("health"),
    };

    if request.has_unexpressible_rest_filters() {
        debug!(action = %query.action, "filters not supported by the REST API were dropped");
    }
    query
}
