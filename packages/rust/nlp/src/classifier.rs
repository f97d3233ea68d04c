//! Keyword-count intent classification.

use aulabot_shared::Intent;
use tracing::debug;

/// Trigger phrases per intent. Matched as substrings of the lower-cased input.
fn triggers(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::ListStudents => &[
            "estudiantes",
            "alumnos",
            "listar estudiantes",
            "mostrar estudiantes",
            "cuántos estudiantes",
            "todos los estudiantes",
            "ver estudiantes",
        ],
        Intent::SearchStudent => &[
            "buscar estudiante",
            "encontrar estudiante",
            "estudiante específico",
            "datos de",
            "información de",
            "ficha de",
        ],
        Intent::StudentGrades => &[
            "notas de",
            "calificaciones de",
            "promedio de",
            "rendimiento de",
            "notas del estudiante",
            "calificaciones del alumno",
        ],
        Intent::CourseStatistics => &[
            "estadísticas del curso",
            "promedio del curso",
            "rendimiento del curso",
            "curso",
            "año",
            "división",
            "estadísticas de",
        ],
        Intent::AttentionCalls => &[
            "llamados de atención",
            "amonestaciones",
            "sanciones",
            "disciplina",
            "problemas de conducta",
            "llamados",
        ],
        Intent::Teachers => &[
            "profesores",
            "docentes",
            "maestros",
            "listar profesores",
            "profesor de",
            "docente de",
        ],
        Intent::Schedules => &[
            "horarios",
            "horario de clases",
            "cuándo es",
            "qué día",
            "horario del curso",
            "clases de",
        ],
        Intent::Subjects => &[
            "materias",
            "asignaturas",
            "materia de",
            "asignatura de",
            "qué materias",
            "listar materias",
        ],
        Intent::GeneralStatistics => &[
            "estadísticas",
            "estadísticas generales",
            "resumen",
            "totales",
            "cuántos hay",
            "cantidad total",
            "resumen del sistema",
        ],
        Intent::Reports => &[
            "reporte",
            "reportes",
            "generar reporte",
            "informe",
            "análisis de",
            "estudio de",
        ],
        Intent::Ambiguous => &[],
    }
}

/// Maps free text to an [`Intent`] by counting trigger-phrase hits.
///
/// The intent with the highest non-zero count wins. Ties go to the intent
/// declared first in [`Intent::ALL`]. No hits at all yields
/// [`Intent::Ambiguous`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a question.
    pub fn classify(&self, text: &str) -> Intent {
        let mut best = Intent::Ambiguous;
        let mut best_score = 0;

        for (intent, score) in self.scores(text) {
            // strict: an equal score never displaces an earlier intent
            if score > best_score {
                best = intent;
                best_score = score;
            }
        }

        debug!(intent = %best, score = best_score, "classified question");
        best
    }

    /// Trigger hit counts for every intent, in declaration order.
    pub fn scores(&self, text: &str) -> Vec<(Intent, usize)> {
        let normalized = text.trim().to_lowercase();
        Intent::ALL
            .iter()
            .map(|&intent| {
                let hits = triggers(intent)
                    .iter()
                    .filter(|phrase| normalized.contains(*phrase))
                    .count();
                (intent, hits)
            })
            .collect()
    }
}
