use serde::Deserialize;

use crate::error::{FieldError, ValidationErrors};
use crate::models::{
    Metrics, NewAttendance, NewGrade, NewStudent, Participation, RecordSummary, StudentUpdate,
};

/// A numeric field as sent by the caller. Anything that is not a JSON number
/// is kept so validation can report it against its field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Other(serde_json::Value),
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Metrics as they arrive from a form, a JSON body or CLI flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsInput {
    pub average_grade: Option<MetricValue>,
    pub attendance_percentage: Option<MetricValue>,
    pub weekly_study_hours: Option<MetricValue>,
    pub class_participation: Option<String>,
    pub assignment_submission_percentage: Option<MetricValue>,
    pub exam_average: Option<MetricValue>,
}

impl MetricsInput {
    /// Fills fields the caller left out from stored grade and attendance
    /// records. Values the caller did send always win.
    pub fn fill_from_records(mut self, summary: &RecordSummary) -> Self {
        if self.average_grade.is_none() {
            self.average_grade = summary.average_grade.map(MetricValue::from);
        }
        if self.attendance_percentage.is_none() {
            self.attendance_percentage = summary.attendance_percentage.map(MetricValue::from);
        }
        if self.exam_average.is_none() {
            self.exam_average = summary.exam_average.map(MetricValue::from);
        }
        self
    }

    /// Checks every field and reports all problems at once.
    pub fn validate(self) -> Result<Metrics, ValidationErrors> {
        let mut errors = Vec::new();

        let average_grade = bounded(&mut errors, "averageGrade", self.average_grade, 0.0, 10.0);
        let attendance_percentage = bounded(
            &mut errors,
            "attendancePercentage",
            self.attendance_percentage,
            0.0,
            100.0,
        );
        let weekly_study_hours = bounded(
            &mut errors,
            "weeklyStudyHours",
            self.weekly_study_hours,
            0.0,
            168.0,
        );
        let assignment_submission_percentage = bounded(
            &mut errors,
            "assignmentSubmissionPercentage",
            self.assignment_submission_percentage,
            0.0,
            100.0,
        );
        let exam_average = bounded(&mut errors, "examAverage", self.exam_average, 0.0, 10.0);

        let class_participation = match self.class_participation.as_deref() {
            None => Some(Participation::Medium),
            Some(raw) => match raw.parse::<Participation>() {
                Ok(level) => Some(level),
                Err(message) => {
                    errors.push(FieldError {
                        field: "classParticipation",
                        message,
                    });
                    None
                }
            },
        };

        match (
            average_grade,
            attendance_percentage,
            weekly_study_hours,
            class_participation,
            assignment_submission_percentage,
            exam_average,
        ) {
            (Some(g), Some(a), Some(h), Some(p), Some(s), Some(e)) if errors.is_empty() => {
                Ok(Metrics {
                    average_grade: g,
                    attendance_percentage: a,
                    weekly_study_hours: h,
                    class_participation: p,
                    assignment_submission_percentage: s,
                    exam_average: e,
                })
            }
            _ => Err(ValidationErrors(errors)),
        }
    }
}

pub fn check_new_student(student: &NewStudent) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    required_text(&mut errors, "id", &student.id);
    required_text(&mut errors, "firstName", &student.first_name);
    required_text(&mut errors, "lastName", &student.last_name);
    email(&mut errors, &student.email);
    semester(&mut errors, student.semester);
    finish(errors)
}

pub fn check_student_update(update: &StudentUpdate) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    if let Some(first_name) = &update.first_name {
        required_text(&mut errors, "firstName", first_name);
    }
    if let Some(last_name) = &update.last_name {
        required_text(&mut errors, "lastName", last_name);
    }
    if let Some(value) = &update.email {
        email(&mut errors, value);
    }
    if let Some(value) = update.semester {
        semester(&mut errors, value);
    }
    finish(errors)
}

pub fn check_new_grade(grade: &NewGrade) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    required_text(&mut errors, "subject", &grade.subject);
    bounded(
        &mut errors,
        "grade",
        Some(MetricValue::Number(grade.grade)),
        0.0,
        10.0,
    );
    finish(errors)
}

pub fn check_new_attendance(attendance: &NewAttendance) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    required_text(&mut errors, "subject", &attendance.subject);
    finish(errors)
}

fn finish(errors: Vec<FieldError>) -> Result<(), ValidationErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn required_text(errors: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError {
            field,
            message: "must not be empty".to_string(),
        });
    }
}

fn email(errors: &mut Vec<FieldError>, value: &str) {
    let valid = value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        errors.push(FieldError {
            field: "email",
            message: "must be a valid email address".to_string(),
        });
    }
}

fn semester(errors: &mut Vec<FieldError>, value: i32) {
    if !(1..=12).contains(&value) {
        errors.push(FieldError {
            field: "semester",
            message: "must be between 1 and 12".to_string(),
        });
    }
}

fn bounded(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: Option<MetricValue>,
    min: f64,
    max: f64,
) -> Option<f64> {
    let message = match value {
        None => "is required".to_string(),
        Some(MetricValue::Other(_)) => "must be a number".to_string(),
        Some(MetricValue::Number(v)) if !v.is_finite() => "must be a finite number".to_string(),
        Some(MetricValue::Number(v)) if v < min || v > max => {
            format!("must be between {min} and {max}")
        }
        Some(MetricValue::Number(v)) => return Some(v),
    };
    errors.push(FieldError { field, message });
    None
}
