//! Intent-specific aggregates over a [`ResultSet`].
//!
//! Every branch is total: missing or malformed fields are skipped, never
//! reported as errors, and an empty result set always analyses to
//! [`Analysis::NoData`].

use std::collections::BTreeMap;

use aulabot_shared::{Intent, ResultRow, ResultSet};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::anomaly::{self, Anomaly, AnomalyKind};

const NO_SPECIALTY: &str = "Sin especialidad";
const NO_SHIFT: &str = "Sin turno";

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Derived summary of one result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Analysis {
    NoData,
    Students(StudentAnalysis),
    Grades(GradeAnalysis),
    CourseStats(CourseAnalysis),
    AttentionCalls(AttentionAnalysis),
    Teachers(TeacherAnalysis),
    GeneralStats(GeneralAnalysis),
    Attendance(AttendanceAnalysis),
    Generic(GenericAnalysis),
}

impl Analysis {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAnalysis {
    pub total_students: usize,
    pub course_distribution: BTreeMap<String, u64>,
    pub specialty_distribution: BTreeMap<String, u64>,
    pub shift_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeAnalysis {
    pub total_grades: usize,
    pub average_grade: Option<f64>,
    pub max_grade: Option<f64>,
    pub min_grade: Option<f64>,
    pub grade_distribution: GradeBuckets,
    pub subject_averages: BTreeMap<String, f64>,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GradeBuckets {
    #[serde(rename = "Excelente (9-10)")]
    pub excellent: u64,
    #[serde(rename = "Bueno (7-8.9)")]
    pub good: u64,
    #[serde(rename = "Regular (6-6.9)")]
    pub regular: u64,
    #[serde(rename = "Insuficiente (<6)")]
    pub insufficient: u64,
}

impl GradeBuckets {
    fn record(&mut self, grade: f64) {
        match grade {
            g if g >= 9.0 => self.excellent += 1,
            g if g >= 7.0 => self.good += 1,
            g if g >= 6.0 => self.regular += 1,
            _ => self.insufficient += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAnalysis {
    pub total_students: i64,
    pub overall_average: Option<f64>,
    pub largest_course: Option<LargestCourse>,
    pub best_performing_course: Option<BestCourse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LargestCourse {
    pub course: String,
    pub students: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestCourse {
    pub course: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttentionAnalysis {
    pub total_calls: usize,
    pub calls_per_student: BTreeMap<String, u64>,
    pub student_with_most_calls: Option<StudentCalls>,
    pub motive_distribution: MotiveBuckets,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentCalls {
    pub name: String,
    pub calls: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MotiveBuckets {
    #[serde(rename = "Llegadas tarde")]
    pub late_arrivals: u64,
    #[serde(rename = "Uso de celular")]
    pub phone_use: u64,
    #[serde(rename = "Falta de material")]
    pub missing_material: u64,
    #[serde(rename = "Otros")]
    pub other: u64,
}

impl MotiveBuckets {
    /// First matching rule wins.
    fn record(&mut self, motive: &str) {
        let motive = motive.to_lowercase();
        if motive.contains("tarde") {
            self.late_arrivals += 1;
        } else if motive.contains("celular") {
            self.phone_use += 1;
        } else if motive.contains("falta") {
            self.missing_material += 1;
        } else {
            self.other += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherAnalysis {
    pub total_teachers: usize,
    pub active_teachers: usize,
    pub inactive_teachers: usize,
    pub experience_distribution: TenureBuckets,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TenureBuckets {
    #[serde(rename = "Nuevos (0-2 años)")]
    pub new: u64,
    #[serde(rename = "Intermedios (3-10 años)")]
    pub intermediate: u64,
    #[serde(rename = "Experimentados (10+ años)")]
    pub experienced: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralAnalysis {
    pub system_stats: BTreeMap<String, i64>,
    pub total_records: i64,
    pub largest_table: Option<TableCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub records: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceAnalysis {
    pub students_with_absences: usize,
    pub total_absences: i64,
    pub justified_absences: i64,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenericAnalysis {
    pub record_count: usize,
    pub available_fields: Vec<String>,
}

/// Aggregate counts plus per-student ratios, as served by the stats
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatistics {
    pub estudiantes: i64,
    pub profesores: i64,
    pub cursos: i64,
    pub materias: i64,
    pub notas: i64,
    pub llamados: i64,
    pub promedio_notas_por_estudiante: f64,
    pub llamados_por_estudiante: f64,
    pub timestamp: DateTime<Utc>,
}

impl SystemStatistics {
    /// Build from the general statistics row. Missing counts read as zero.
    pub fn from_row(row: &ResultRow, timestamp: DateTime<Utc>) -> Self {
        let count = |field: &str| row.integer(field).unwrap_or(0);
        let estudiantes = count("estudiantes");
        let notas = count("notas");
        let llamados = count("llamados");
        let per_student = |n: i64| {
            if estudiantes > 0 {
                round2(n as f64 / estudiantes as f64)
            } else {
                0.0
            }
        };

        Self {
            estudiantes,
            profesores: count("profesores"),
            cursos: count("cursos"),
            materias: count("materias"),
            notas,
            llamados,
            promedio_notas_por_estudiante: per_student(notas),
            llamados_por_estudiante: per_student(llamados),
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Computes an [`Analysis`] for an intent's rows.
#[derive(Debug, Clone)]
pub struct Analyzer {
    reference_year: i32,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            reference_year: Utc::now().year(),
        }
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the year teacher tenure is measured against.
    pub fn with_reference_year(year: i32) -> Self {
        Self {
            reference_year: year,
        }
    }

    pub fn analyze(&self, rows: &ResultSet, intent: Intent) -> Analysis {
        if rows.is_empty() {
            return Analysis::NoData;
        }

        match intent {
            Intent::ListStudents | Intent::SearchStudent => Analysis::Students(students(rows)),
            // without a resolved student the builder falls back to a student listing
            Intent::StudentGrades if has_field(rows, "nota") => Analysis::Grades(grades(rows)),
            Intent::StudentGrades => Analysis::Students(students(rows)),
            Intent::CourseStatistics => Analysis::CourseStats(course_stats(rows)),
            Intent::AttentionCalls => Analysis::AttentionCalls(attention_calls(rows)),
            Intent::Teachers => Analysis::Teachers(self.teachers(rows)),
            Intent::GeneralStatistics => Analysis::GeneralStats(general_stats(rows)),
            Intent::Reports if has_field(rows, "total_inasistencias") => {
                Analysis::Attendance(attendance(rows))
            }
            Intent::Reports => Analysis::CourseStats(course_stats(rows)),
            Intent::Schedules | Intent::Subjects | Intent::Ambiguous => {
                Analysis::Generic(generic(rows))
            }
        }
    }

    fn teachers(&self, rows: &ResultSet) -> TeacherAnalysis {
        let active = rows.iter().filter(|row| row.flag("activo")).count();
        let mut tenure = TenureBuckets::default();

        for row in rows {
            let Some(hired) = row.text("fecha_ingreso").and_then(|date| hire_year(&date)) else {
                continue;
            };
            match self.reference_year - hired {
                years if years <= 2 => tenure.new += 1,
                years if years <= 10 => tenure.intermediate += 1,
                _ => tenure.experienced += 1,
            }
        }

        TeacherAnalysis {
            total_teachers: rows.len(),
            active_teachers: active,
            inactive_teachers: rows.len() - active,
            experience_distribution: tenure,
        }
    }
}

fn students(rows: &ResultSet) -> StudentAnalysis {
    let mut course_distribution = BTreeMap::new();
    let mut specialty_distribution = BTreeMap::new();
    let mut shift_distribution = BTreeMap::new();

    for row in rows {
        let course = format!("{}° {}", row.text_or_na("anio"), row.text_or_na("division"));
        *course_distribution.entry(course).or_insert(0) += 1;

        let specialty = row.text("especialidad").unwrap_or_else(|| NO_SPECIALTY.into());
        *specialty_distribution.entry(specialty).or_insert(0) += 1;

        let shift = row.text("turno").unwrap_or_else(|| NO_SHIFT.into());
        *shift_distribution.entry(shift).or_insert(0) += 1;
    }

    StudentAnalysis {
        total_students: rows.len(),
        course_distribution,
        specialty_distribution,
        shift_distribution,
    }
}

fn grades(rows: &ResultSet) -> GradeAnalysis {
    let values: Vec<f64> = rows.iter().filter_map(|row| row.number("nota")).collect();

    let mut grade_distribution = GradeBuckets::default();
    for &grade in &values {
        grade_distribution.record(grade);
    }

    let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        if let Some(grade) = row.number("nota") {
            by_subject
                .entry(row.text_or_na("materia"))
                .or_default()
                .push(grade);
        }
    }
    let subject_averages = by_subject
        .into_iter()
        .filter_map(|(subject, grades)| Some((subject, round2(anomaly::mean(&grades)?))))
        .collect();

    GradeAnalysis {
        total_grades: values.len(),
        average_grade: anomaly::mean(&values).map(round2),
        max_grade: values.iter().copied().reduce(f64::max),
        min_grade: values.iter().copied().reduce(f64::min),
        grade_distribution,
        subject_averages,
        anomalies: anomaly::detect_anomalies(rows, AnomalyKind::Grades),
    }
}

fn course_stats(rows: &ResultSet) -> CourseAnalysis {
    let total_students = rows
        .iter()
        .filter_map(|row| row.integer("total_estudiantes"))
        .sum();

    let averages: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.number("promedio_notas"))
        .collect();

    let largest_course = first_max(rows.iter().map(|row| {
        (row, row.integer("total_estudiantes").unwrap_or(0))
    }))
    .map(|(row, students)| LargestCourse {
        course: row.course_label(),
        students,
    });

    let best_performing_course = first_max(
        rows.iter()
            .filter_map(|row| Some((row, row.number("promedio_notas")?))),
    )
    .map(|(row, average)| BestCourse {
        course: row.course_label(),
        average,
    });

    CourseAnalysis {
        total_students,
        overall_average: anomaly::mean(&averages).map(round2),
        largest_course,
        best_performing_course,
    }
}

fn attention_calls(rows: &ResultSet) -> AttentionAnalysis {
    // first-appearance order, so ties go to whoever appears first
    let mut per_student: Vec<(String, u64)> = Vec::new();
    let mut motive_distribution = MotiveBuckets::default();

    for row in rows {
        let name = row.full_name();
        match per_student.iter_mut().find(|(n, _)| *n == name) {
            Some((_, calls)) => *calls += 1,
            None => per_student.push((name, 1)),
        }
        motive_distribution.record(&row.text_or_na("motivo"));
    }

    let student_with_most_calls = first_max(per_student.iter().map(|(n, c)| (n, *c)))
        .map(|(name, calls)| StudentCalls {
            name: name.clone(),
            calls,
        });

    AttentionAnalysis {
        total_calls: rows.len(),
        calls_per_student: per_student.into_iter().collect(),
        student_with_most_calls,
        motive_distribution,
    }
}

fn general_stats(rows: &ResultSet) -> GeneralAnalysis {
    let counts: Vec<(String, i64)> = if has_field(rows, "tabla") {
        rows.iter()
            .filter_map(|row| Some((row.text("tabla")?, row.integer("total").unwrap_or(0))))
            .collect()
    } else {
        // a single row with one column per table
        rows[0]
            .0
            .keys()
            .filter_map(|field| Some((field.clone(), rows[0].integer(field)?)))
            .collect()
    };

    let largest_table = first_max(counts.iter().map(|(t, n)| (t, *n))).map(|(table, records)| {
        TableCount {
            table: table.clone(),
            records,
        }
    });

    GeneralAnalysis {
        total_records: counts.iter().map(|(_, n)| n).sum(),
        system_stats: counts.into_iter().collect(),
        largest_table,
    }
}

fn attendance(rows: &ResultSet) -> AttendanceAnalysis {
    let sum = |field: &str| -> i64 { rows.iter().filter_map(|row| row.integer(field)).sum() };
    AttendanceAnalysis {
        students_with_absences: rows
            .iter()
            .filter(|row| row.integer("total_inasistencias").unwrap_or(0) > 0)
            .count(),
        total_absences: sum("total_inasistencias"),
        justified_absences: sum("inasistencias_justificadas"),
        anomalies: anomaly::detect_anomalies(rows, AnomalyKind::Attendance),
    }
}

fn generic(rows: &ResultSet) -> GenericAnalysis {
    GenericAnalysis {
        record_count: rows.len(),
        available_fields: rows.first().map(ResultRow::field_names).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The first item holding the maximum key.
fn first_max<T, K: PartialOrd>(items: impl Iterator<Item = (T, K)>) -> Option<(T, K)> {
    let mut best: Option<(T, K)> = None;
    for (item, key) in items {
        if best.as_ref().is_none_or(|(_, best_key)| key > *best_key) {
            best = Some((item, key));
        }
    }
    best
}

fn has_field(rows: &ResultSet, field: &str) -> bool {
    rows.iter().any(|row| row.get(field).is_some())
}

/// Year prefix of a `YYYY-MM-DD` date.
fn hire_year(date: &str) -> Option<i32> {
    date.split('-').next()?.trim().parse().ok()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
