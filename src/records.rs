use sqlx::PgPool;

use crate::db;
use crate::error::AppError;
use crate::models::{AttendanceRecord, GradeKind, GradeRecord, RecordSummary};

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(round2(sum / count as f64))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derives the grade and attendance indicators the scorer needs.
///
/// Grades average over every record; the exam average only over exams.
/// Attendance counts present and excused sessions against all sessions.
pub fn summarize(grades: &[GradeRecord], attendance: &[AttendanceRecord]) -> RecordSummary {
    let attended = attendance
        .iter()
        .filter(|record| record.status.counts_as_attended())
        .count();
    let attendance_percentage = if attendance.is_empty() {
        None
    } else {
        Some(round2(attended as f64 * 100.0 / attendance.len() as f64))
    };

    RecordSummary {
        grade_count: grades.len(),
        average_grade: mean(grades.iter().map(|record| record.grade)),
        exam_average: mean(
            grades
                .iter()
                .filter(|record| record.kind == GradeKind::Exam)
                .map(|record| record.grade),
        ),
        attendance_sessions: attendance.len(),
        attendance_percentage,
    }
}

/// Loads a known student's records and summarizes them.
pub async fn load_summary(pool: &PgPool, student_id: &str) -> Result<RecordSummary, AppError> {
    let student = db::fetch_student(pool, student_id).await?;
    let grades = db::list_grades(pool, &student.id).await?;
    let attendance = db::list_attendance(pool, &student.id).await?;
    Ok(summarize(&grades, &attendance))
}
