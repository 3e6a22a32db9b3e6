use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub semester: i32,
    pub career: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default = "default_semester")]
    pub semester: i32,
    pub career: Option<String>,
}

fn default_semester() -> i32 {
    1
}

/// Partial update; absent fields keep their stored value.
///
/// `career` distinguishes an absent key (`None`) from an explicit `null`
/// (`Some(None)`), which clears the stored career.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub semester: Option<i32>,
    #[serde(default, deserialize_with = "present")]
    pub career: Option<Option<String>>,
    pub active: Option<bool>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participation {
    Low,
    Medium,
    High,
}

impl FromStr for Participation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown participation level '{other}'")),
        }
    }
}

/// Snapshot of a student's indicators. Grades and exam averages use the 0-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub average_grade: f64,
    pub attendance_percentage: f64,
    pub weekly_study_hours: f64,
    pub class_participation: Participation,
    pub assignment_submission_percentage: f64,
    pub exam_average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            60..=u8::MAX => Self::High,
            30..=59 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            other => Err(format!("unknown risk tier '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Computing,
    Completed,
    Failed,
}

impl PredictionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Computing => "Computing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl FromStr for PredictionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Computing" => Ok(Self::Computing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            other => Err(format!("unknown prediction status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub tier: RiskTier,
    pub score: u8,
    pub factors: Vec<String>,
}

/// Immutable outcome of one scoring call. Recalculating inserts a new record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: Uuid,
    pub student_id: String,
    pub risk_tier: RiskTier,
    pub score: u8,
    pub key_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub status: PredictionStatus,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn completed(
        student_id: &str,
        assessment: RiskAssessment,
        recommendations: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            risk_tier: assessment.tier,
            score: assessment.score,
            key_factors: assessment.factors,
            recommendations,
            status: PredictionStatus::Completed,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    pub id: Uuid,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub risk_tier: RiskTier,
    pub score: u8,
    pub key_factors: Vec<String>,
    pub status: PredictionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn for_tier(tier: RiskTier) -> Self {
        match tier {
            RiskTier::Low => Self::Low,
            RiskTier::Medium => Self::Medium,
            RiskTier::High => Self::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub student_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn for_prediction(record: &PredictionRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: record.student_id.clone(),
            kind: "prediction".to_string(),
            title: "New risk prediction".to_string(),
            message: format!(
                "Risk assessed as {} (score {}/100)",
                record.risk_tier, record.score
            ),
            priority: Priority::for_tier(record.risk_tier),
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeKind {
    Exam,
    Assignment,
    Quiz,
    Project,
}

impl GradeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exam => "exam",
            Self::Assignment => "assignment",
            Self::Quiz => "quiz",
            Self::Project => "project",
        }
    }
}

impl FromStr for GradeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "exam" => Ok(Self::Exam),
            "assignment" => Ok(Self::Assignment),
            "quiz" => Ok(Self::Quiz),
            "project" => Ok(Self::Project),
            other => Err(format!("unknown grade kind '{other}'")),
        }
    }
}

/// One graded assessment on the 0-10 scale.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub id: Uuid,
    pub student_id: String,
    pub subject: String,
    pub kind: GradeKind,
    pub grade: f64,
    pub recorded_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGrade {
    pub subject: String,
    pub kind: GradeKind,
    pub grade: f64,
    /// Defaults to today.
    pub recorded_on: Option<NaiveDate>,
}

impl GradeRecord {
    pub fn new(student_id: &str, grade: NewGrade) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            subject: grade.subject.trim().to_string(),
            kind: grade.kind,
            grade: grade.grade,
            recorded_on: grade.recorded_on.unwrap_or_else(|| now.date_naive()),
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Excused,
    Late,
}

impl AttendanceStatus {
    /// Present and excused sessions count as attended; late arrivals do not.
    pub fn counts_as_attended(self) -> bool {
        matches!(self, Self::Present | Self::Excused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Excused => "excused",
            Self::Late => "late",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "excused" => Ok(Self::Excused),
            "late" => Ok(Self::Late),
            other => Err(format!("unknown attendance status '{other}'")),
        }
    }
}

/// Attendance for one class session. A student has at most one record per
/// subject and date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: String,
    pub subject: String,
    pub class_date: NaiveDate,
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttendance {
    pub subject: String,
    pub class_date: NaiveDate,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn new(student_id: &str, attendance: NewAttendance) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            subject: attendance.subject.trim().to_string(),
            class_date: attendance.class_date,
            status: attendance.status,
            created_at: Utc::now(),
        }
    }
}

/// Indicators derived from stored grade and attendance records. A metric is
/// `None` when there are no records to derive it from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub grade_count: usize,
    pub average_grade: Option<f64>,
    pub exam_average: Option<f64>,
    pub attendance_sessions: usize,
    pub attendance_percentage: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participation_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Participation>(), Ok(Participation::High));
        assert_eq!(" low ".parse::<Participation>(), Ok(Participation::Low));
        assert!("sometimes".parse::<Participation>().is_err());
    }

    #[test]
    fn tier_and_status_round_trip_through_storage_labels() {
        for tier in [RiskTier::Low, RiskTier::Medium, RiskTier::High] {
            assert_eq!(tier.as_str().parse::<RiskTier>(), Ok(tier));
        }
        assert_eq!(
            "Completed".parse::<PredictionStatus>(),
            Ok(PredictionStatus::Completed)
        );
    }

    #[test]
    fn notification_priority_follows_tier() {
        let record = PredictionRecord::completed(
            "S-1",
            RiskAssessment {
                tier: RiskTier::High,
                score: 75,
                factors: vec![],
            },
            vec![],
        );
        let notification = Notification::for_prediction(&record);
        assert_eq!(notification.priority, Priority::High);
        assert_eq!(notification.student_id, "S-1");
        assert!(notification.message.contains("75/100"));
        assert!(!notification.read);
    }

    #[test]
    fn update_tells_absent_career_from_explicit_null() {
        let absent: StudentUpdate = serde_json::from_str(r#"{"semester": 4}"#).unwrap();
        assert_eq!(absent.career, None);

        let cleared: StudentUpdate = serde_json::from_str(r#"{"career": null}"#).unwrap();
        assert_eq!(cleared.career, Some(None));

        let changed: StudentUpdate = serde_json::from_str(r#"{"career": "Law"}"#).unwrap();
        assert_eq!(changed.career, Some(Some("Law".to_string())));
    }

    #[test]
    fn record_labels_round_trip_through_storage() {
        for kind in [
            GradeKind::Exam,
            GradeKind::Assignment,
            GradeKind::Quiz,
            GradeKind::Project,
        ] {
            assert_eq!(kind.as_str().parse::<GradeKind>(), Ok(kind));
        }
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Excused,
            AttendanceStatus::Late,
        ] {
            assert_eq!(status.as_str().parse::<AttendanceStatus>(), Ok(status));
        }
    }

    #[test]
    fn new_grade_defaults_to_today_and_trims_subject() {
        let record = GradeRecord::new(
            "S-2",
            NewGrade {
                subject: " Calculus ".to_string(),
                kind: GradeKind::Exam,
                grade: 6.5,
                recorded_on: None,
            },
        );
        assert_eq!(record.subject, "Calculus");
        assert_eq!(record.recorded_on, record.created_at.date_naive());
    }
}
