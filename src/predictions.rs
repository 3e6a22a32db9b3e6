use sqlx::PgPool;

use crate::db;
use crate::error::AppError;
use crate::events::{Event, EventBus};
use crate::models::{Metrics, Notification, PredictionRecord};
use crate::records;
use crate::risk;
use crate::validate::MetricsInput;

/// Scores validated metrics into a fresh record without touching storage.
pub fn assess(student_id: &str, metrics: &Metrics) -> PredictionRecord {
    PredictionRecord::completed(
        student_id,
        risk::score(metrics),
        risk::recommendations(metrics),
    )
}

/// Validates, scores and persists a new prediction for an existing student.
///
/// Nothing is written when validation fails or the student is unknown. Each
/// call appends a new record; earlier predictions are left untouched.
pub async fn generate(
    pool: &PgPool,
    events: &EventBus,
    student_id: &str,
    input: MetricsInput,
) -> Result<PredictionRecord, AppError> {
    let metrics = input.validate().map_err(|errors| {
        let fields: Vec<&str> = errors.fields().collect();
        tracing::debug!(student = %student_id, ?fields, "metrics rejected");
        errors
    })?;
    let student = db::fetch_student(pool, student_id).await?;

    let record = assess(&student.id, &metrics);
    db::insert_prediction(pool, &record).await?;

    let notification = Notification::for_prediction(&record);
    if let Err(error) = db::insert_notification(pool, &notification).await {
        tracing::warn!(%error, student = %student.id, "failed to store prediction notification");
    }

    tracing::info!(
        prediction = %record.id,
        student = %student.id,
        tier = %record.risk_tier,
        score = record.score,
        "prediction generated"
    );
    events.publish(Event::PredictionCreated(record.clone()));

    Ok(record)
}

/// Like [`generate`], but average grade, attendance and exam average fall
/// back to the student's stored grade and attendance records when omitted.
pub async fn generate_from_records(
    pool: &PgPool,
    events: &EventBus,
    student_id: &str,
    input: MetricsInput,
) -> Result<PredictionRecord, AppError> {
    let summary = records::load_summary(pool, student_id).await?;
    tracing::debug!(
        student = %student_id,
        grades = summary.grade_count,
        sessions = summary.attendance_sessions,
        "metrics derived from records"
    );
    generate(pool, events, student_id, input.fill_from_records(&summary)).await
}
