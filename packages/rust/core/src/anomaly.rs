//! Outlier and threshold detection over result rows.

use aulabot_shared::{ResultRow, ResultSet};
use serde::Serialize;

/// Absence count above which a student is flagged.
pub const ABSENCE_THRESHOLD: i64 = 10;

/// Which detector to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    Grades,
    Attendance,
}

/// A single flagged row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    /// A grade more than two standard deviations from the mean.
    OutlierGrade {
        student: String,
        grade: f64,
        expected_range: String,
    },
    HighAbsences {
        student: String,
        absences: i64,
        threshold: i64,
    },
}

pub fn detect_anomalies(rows: &ResultSet, kind: AnomalyKind) -> Vec<Anomaly> {
    match kind {
        AnomalyKind::Grades => grade_outliers(rows),
        AnomalyKind::Attendance => high_absences(rows),
    }
}

fn grade_outliers(rows: &ResultSet) -> Vec<Anomaly> {
    let grades: Vec<f64> = rows.iter().filter_map(|row| row.number("nota")).collect();
    let Some(mean) = mean(&grades) else {
        return Vec::new();
    };
    let deviation = sample_std_dev(&grades, mean);
    let (low, high) = (mean - 2.0 * deviation, mean + 2.0 * deviation);

    rows.iter()
        .filter_map(|row| {
            let grade = row.number("nota")?;
            (grade < low || grade > high).then(|| Anomaly::OutlierGrade {
                student: row.full_name(),
                grade,
                expected_range: format!("{low:.1} - {high:.1}"),
            })
        })
        .collect()
}

fn high_absences(rows: &ResultSet) -> Vec<Anomaly> {
    rows.iter()
        .filter_map(|row: &ResultRow| {
            let absences = row.integer("total_inasistencias")?;
            (absences > ABSENCE_THRESHOLD).then(|| Anomaly::HighAbsences {
                student: row.full_name(),
                absences,
                threshold: ABSENCE_THRESHOLD,
            })
        })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation; zero for fewer than two values.
fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}
