//! Spanish reply templates.

use std::fmt::{self, Write};

use aulabot_shared::{Intent, ResultRow, ResultSet};
use tracing::warn;

use crate::analyzer::{Analysis, AttendanceAnalysis, GeneralAnalysis, GradeAnalysis};
use crate::anomaly::Anomaly;

/// Reply for an empty result set.
pub const NO_DATA: &str = "No hay datos disponibles para mostrar";

/// Reply when a question could not be answered.
pub const GENERIC_ERROR: &str = "Hubo un error procesando tu consulta. Intenta reformularla.";

/// Rows enumerated inline for list replies.
pub const LIST_DISPLAY_LIMIT: usize = 10;

/// Rows enumerated inline for attention calls.
pub const CALLS_DISPLAY_LIMIT: usize = 5;

/// Turns rows and their analysis into a reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, rows: &ResultSet, analysis: &Analysis, intent: Intent) -> String {
        if rows.is_empty() {
            return NO_DATA.to_string();
        }

        let mut out = String::new();
        match self.write_reply(&mut out, rows, analysis, intent) {
            Ok(()) => out,
            Err(e) => {
                warn!(error = %e, %intent, "reply rendering failed");
                GENERIC_ERROR.to_string()
            }
        }
    }

    fn write_reply(
        &self,
        out: &mut String,
        rows: &ResultSet,
        analysis: &Analysis,
        intent: Intent,
    ) -> fmt::Result {
        match (intent, analysis) {
            (Intent::SearchStudent, _) => student_card(out, &rows[0]),
            (Intent::StudentGrades, Analysis::Grades(grades)) => grade_lines(out, rows, grades),
            (Intent::ListStudents | Intent::StudentGrades, _) => student_list(out, rows),
            (Intent::CourseStatistics, _) | (Intent::Reports, Analysis::CourseStats(_)) => {
                course_blocks(out, rows)
            }
            (Intent::AttentionCalls, _) => attention_calls(out, rows),
            (Intent::Teachers, _) => teachers(out, rows),
            (Intent::Schedules, _) => schedules(out, rows),
            (Intent::Subjects, _) => subjects(out, rows),
            (Intent::GeneralStatistics, Analysis::GeneralStats(stats)) => general_stats(out, stats),
            (Intent::Reports, Analysis::Attendance(report)) => attendance(out, rows, report),
            _ => write!(
                out,
                "Se encontraron {} registros que coinciden con tu consulta.",
                rows.len()
            ),
        }
    }
}

fn student_list(out: &mut String, rows: &ResultSet) -> fmt::Result {
    writeln!(out, "Encontré {} estudiantes:\n", rows.len())?;
    for (i, student) in rows.iter().take(LIST_DISPLAY_LIMIT).enumerate() {
        writeln!(out, "{}. {} - {}", i + 1, student.full_name(), student.course_label())?;
    }
    more(out, rows.len(), LIST_DISPLAY_LIMIT, "estudiantes")
}

fn student_card(out: &mut String, student: &ResultRow) -> fmt::Result {
    writeln!(out, "Datos de {}:", student.full_name())?;
    writeln!(out, "• Curso: {}", student.course_label())?;
    writeln!(out, "• DNI: {}", student.text_or_na("dni"))?;
    writeln!(out, "• Email: {}", student.text_or_na("email"))?;
    writeln!(out, "• Teléfono: {}", student.text_or_na("telefono_celular"))
}

fn grade_lines(out: &mut String, rows: &ResultSet, grades: &GradeAnalysis) -> fmt::Result {
    writeln!(out, "Notas de {}:\n", rows[0].full_name())?;
    for grade in rows {
        writeln!(
            out,
            "• {}: {} (Cuatrimestre {})",
            grade.text_or_na("materia"),
            grade.text_or_na("nota"),
            grade.text_or_na("cuatrimestre")
        )?;
    }
    if let Some(average) = grades.average_grade {
        write!(out, "\nPromedio general: {average:.2}")?;
    }
    for anomaly in &grades.anomalies {
        if let Anomaly::OutlierGrade {
            grade,
            expected_range,
            ..
        } = anomaly
        {
            write!(out, "\nNota atípica: {grade} (rango esperado {expected_range})")?;
        }
    }
    Ok(())
}

fn course_blocks(out: &mut String, rows: &ResultSet) -> fmt::Result {
    writeln!(out, "Estadísticas del curso:\n")?;
    for course in rows {
        let average = course
            .number("promedio_notas")
            .map_or_else(|| "N/A".to_string(), |avg| format!("{avg:.2}"));
        writeln!(out, "• {}:", course.course_label())?;
        writeln!(
            out,
            "  - Estudiantes: {}",
            course.integer("total_estudiantes").unwrap_or(0)
        )?;
        writeln!(out, "  - Promedio de notas: {average}")?;
    }
    Ok(())
}

fn attention_calls(out: &mut String, rows: &ResultSet) -> fmt::Result {
    writeln!(out, "Llamados de atención ({} registros):\n", rows.len())?;
    for call in rows.iter().take(CALLS_DISPLAY_LIMIT) {
        writeln!(out, "• {} - {}", call.full_name(), call.text_or_na("fecha"))?;
        writeln!(out, "  Motivo: {}\n", call.text_or_na("motivo"))?;
    }
    more(out, rows.len(), CALLS_DISPLAY_LIMIT, "llamados")
}

fn teachers(out: &mut String, rows: &ResultSet) -> fmt::Result {
    writeln!(out, "Profesores ({} registros):\n", rows.len())?;
    for teacher in rows.iter().take(LIST_DISPLAY_LIMIT) {
        writeln!(out, "• {} - {}", teacher.full_name(), teacher.text_or_na("email"))?;
    }
    more(out, rows.len(), LIST_DISPLAY_LIMIT, "profesores")
}

fn schedules(out: &mut String, rows: &ResultSet) -> fmt::Result {
    writeln!(out, "Horarios ({} registros):\n", rows.len())?;
    for slot in rows.iter().take(LIST_DISPLAY_LIMIT) {
        writeln!(
            out,
            "• {} {}-{} - {} - {} ({})",
            slot.text_or_na("dia"),
            slot.text_or_na("hora_inicio"),
            slot.text_or_na("hora_fin"),
            slot.course_label(),
            slot.text_or_na("materia"),
            slot.text_or_na("aula")
        )?;
    }
    more(out, rows.len(), LIST_DISPLAY_LIMIT, "horarios")
}

fn subjects(out: &mut String, rows: &ResultSet) -> fmt::Result {
    writeln!(out, "Materias ({} registros):\n", rows.len())?;
    for subject in rows.iter().take(LIST_DISPLAY_LIMIT) {
        write!(out, "• {}", subject.text_or_na("nombre"))?;
        if let Some(code) = subject.text("codigo") {
            write!(out, " ({code})")?;
        }
        writeln!(out, " - {}", subject.text_or_na("especialidad"))?;
    }
    more(out, rows.len(), LIST_DISPLAY_LIMIT, "materias")
}

fn general_stats(out: &mut String, stats: &GeneralAnalysis) -> fmt::Result {
    writeln!(out, "Estadísticas del sistema:\n")?;
    for (table, total) in &stats.system_stats {
        writeln!(out, "• {}: {total}", capitalize(table))?;
    }
    Ok(())
}

fn attendance(out: &mut String, rows: &ResultSet, report: &AttendanceAnalysis) -> fmt::Result {
    writeln!(
        out,
        "Reporte de asistencia ({} estudiantes con inasistencias):\n",
        report.students_with_absences
    )?;
    for student in rows.iter().take(LIST_DISPLAY_LIMIT) {
        writeln!(
            out,
            "• {} - {}: {} inasistencias ({} justificadas)",
            student.full_name(),
            student.course_label(),
            student.integer("total_inasistencias").unwrap_or(0),
            student.integer("inasistencias_justificadas").unwrap_or(0)
        )?;
    }
    more(out, rows.len(), LIST_DISPLAY_LIMIT, "estudiantes")?;

    let flagged: Vec<&str> = report
        .anomalies
        .iter()
        .filter_map(|a| match a {
            Anomaly::HighAbsences { student, .. } => Some(student.as_str()),
            Anomaly::OutlierGrade { .. } => None,
        })
        .collect();
    if !flagged.is_empty() {
        write!(
            out,
            "\nSuperan el límite de inasistencias: {}",
            flagged.join(", ")
        )?;
    }
    Ok(())
}

/// `... y N <noun> más.` when the list was cut.
fn more(out: &mut String, total: usize, shown: usize, noun: &str) -> fmt::Result {
    if total > shown {
        write!(out, "\n... y {} {noun} más.", total - shown)?;
    }
    Ok(())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;

    fn render(rows: &ResultSet, intent: Intent) -> String {
        let analysis = Analyzer::with_reference_year(2025).analyze(rows, intent);
        Renderer::new().render(rows, &analysis, intent)
    }

    fn student(i: usize) -> ResultRow {
        ResultRow::new()
            .with("nombre", format!("Alumno{i}"))
            .with("apellido", "Pérez")
            .with("anio", 3)
            .with("division", "B")
    }

    #[test]
    fn empty_rows_render_no_data_for_every_intent() {
        for intent in Intent::ALL {
            assert_eq!(render(&Vec::new(), intent), NO_DATA, "{intent}");
        }
    }

    #[test]
    fn student_list_is_capped_with_suffix() {
        let rows: ResultSet = (1..=12).map(student).collect();
        let text = render(&rows, Intent::ListStudents);
        assert!(text.starts_with("Encontré 12 estudiantes:"));
        assert!(text.contains("10. Alumno10 Pérez - 3° B"));
        assert!(!text.contains("Alumno11"));
        assert!(text.ends_with("... y 2 estudiantes más."));
    }

    #[test]
    fn short_list_has_no_suffix() {
        let rows: ResultSet = (1..=3).map(student).collect();
        assert!(!render(&rows, Intent::ListStudents).contains("más."));
    }

    #[test]
    fn search_renders_first_match_card() {
        let rows = vec![student(1).with("dni", "44111222"), student(2)];
        let text = render(&rows, Intent::SearchStudent);
        assert!(text.starts_with("Datos de Alumno1 Pérez:"));
        assert!(text.contains("• DNI: 44111222"));
        assert!(text.contains("• Email: N/A"));
        assert!(!text.contains("Alumno2"));
    }

    #[test]
    fn grades_list_every_subject_and_average() {
        let rows = vec![
            student(1)
                .with("materia", "Matemática")
                .with("nota", 9.5)
                .with("cuatrimestre", 1),
            student(1)
                .with("materia", "Física")
                .with("nota", 5.0)
                .with("cuatrimestre", 2),
        ];
        let text = render(&rows, Intent::StudentGrades);
        assert!(text.starts_with("Notas de Alumno1 Pérez:"));
        assert!(text.contains("• Matemática: 9.5 (Cuatrimestre 1)"));
        assert!(text.contains("Promedio general: 7.25"));
    }

    #[test]
    fn attention_calls_cap_at_five() {
        let rows: ResultSet = (1..=7)
            .map(|i| {
                student(i)
                    .with("motivo", "Llegada tarde")
                    .with("fecha", "2025-04-01")
            })
            .collect();
        let text = render(&rows, Intent::AttentionCalls);
        assert!(text.starts_with("Llamados de atención (7 registros):"));
        assert_eq!(text.matches("Motivo:").count(), 5);
        assert!(text.ends_with("... y 2 llamados más."));
    }

    #[test]
    fn course_stats_block_per_course() {
        let rows = vec![
            ResultRow::new()
                .with("anio", 3)
                .with("division", "B")
                .with("total_estudiantes", 12)
                .with("promedio_notas", 7.254),
            ResultRow::new()
                .with("anio", 1)
                .with("division", "A")
                .with("total_estudiantes", 3),
        ];
        let text = render(&rows, Intent::CourseStatistics);
        assert!(text.contains("• 3° B:\n  - Estudiantes: 12\n  - Promedio de notas: 7.25"));
        assert!(text.contains("  - Promedio de notas: N/A"));
    }

    #[test]
    fn general_stats_capitalize_table_names() {
        let rows = vec![
            ResultRow::new()
                .with("estudiantes", 19)
                .with("profesores", 4),
        ];
        let text = render(&rows, Intent::GeneralStatistics);
        assert!(text.contains("• Estudiantes: 19"));
        assert!(text.contains("• Profesores: 4"));
    }

    #[test]
    fn attendance_report_names_flagged_students() {
        let rows = vec![
            student(1)
                .with("total_inasistencias", 12)
                .with("inasistencias_justificadas", 3),
            student(2)
                .with("total_inasistencias", 2)
                .with("inasistencias_justificadas", 0),
        ];
        let text = render(&rows, Intent::Reports);
        assert!(text.starts_with("Reporte de asistencia (2 estudiantes con inasistencias):"));
        assert!(text.contains("• Alumno1 Pérez - 3° B: 12 inasistencias (3 justificadas)"));
        assert!(text.ends_with("Superan el límite de inasistencias: Alumno1 Pérez"));
    }

    #[test]
    fn ambiguous_reports_record_count() {
        let rows: ResultSet = (1..=4).map(student).collect();
        assert_eq!(
            render(&rows, Intent::Ambiguous),
            "Se encontraron 4 registros que coinciden con tu consulta."
        );
    }

    #[test]
    fn subjects_and_schedules_are_listed() {
        let subjects = vec![
            ResultRow::new()
                .with("nombre", "Programación")
                .with("codigo", "PRG3")
                .with("especialidad", "Informática"),
        ];
        assert!(render(&subjects, Intent::Subjects).contains("• Programación (PRG3) - Informática"));

        let schedules = vec![
            ResultRow::new()
                .with("dia", "Lunes")
                .with("hora_inicio", "08:00")
                .with("hora_fin", "09:20")
                .with("anio", 3)
                .with("division", "B")
                .with("materia", "Matemática")
                .with("aula", "Aula 12"),
        ];
        assert!(
            render(&schedules, Intent::Schedules)
                .contains("• Lunes 08:00-09:20 - 3° B - Matemática (Aula 12)")
        );
    }
}
