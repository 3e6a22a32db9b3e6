use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{from_insert_error, AppError};
use crate::models::{
    AttendanceRecord, GradeRecord, NewStudent, Notification, PredictionRecord, PredictionSummary,
    Student, StudentUpdate,
};

const STUDENT_COLUMNS: &str =
    "id, first_name, last_name, email, semester, career, active, created_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> Result<(), AppError> {
    let students = vec![
        ("1723456789", "Avery", "Lee", "avery.lee@example.edu", 3, "Software Engineering"),
        ("1709876543", "Jules", "Moreno", "jules.moreno@example.edu", 5, "Economics"),
        ("1754321098", "Kiara", "Patel", "kiara.patel@example.edu", 1, "Biology"),
    ];

    for (id, first_name, last_name, email, semester, career) in students {
        sqlx::query(
            r#"
            INSERT INTO student_risk.students (id, first_name, last_name, email, semester, career)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                semester = EXCLUDED.semester,
                career = EXCLUDED.career
            "#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(semester)
        .bind(career)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

fn student_from_row(row: &PgRow) -> Result<Student, sqlx::Error> {
    Ok(Student {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        semester: row.try_get("semester")?,
        career: row.try_get("career")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn score_from_row(row: &PgRow) -> Result<u8, sqlx::Error> {
    let score: i16 = row.try_get("score")?;
    u8::try_from(score).map_err(|_| decode_error(format!("score {score} out of range")))
}

fn prediction_from_row(row: &PgRow) -> Result<PredictionRecord, sqlx::Error> {
    let tier: String = row.try_get("risk_tier")?;
    let status: String = row.try_get("status")?;
    Ok(PredictionRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        risk_tier: tier.parse().map_err(decode_error)?,
        score: score_from_row(row)?,
        key_factors: row.try_get("key_factors")?,
        recommendations: row.try_get("recommendations")?,
        status: status.parse().map_err(decode_error)?,
        created_at: row.try_get("created_at")?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<PredictionSummary, sqlx::Error> {
    let tier: String = row.try_get("risk_tier")?;
    let status: String = row.try_get("status")?;
    Ok(PredictionSummary {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        risk_tier: tier.parse().map_err(decode_error)?,
        score: score_from_row(row)?,
        key_factors: row.try_get("key_factors")?,
        status: status.parse().map_err(decode_error)?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, sqlx::Error> {
    let priority: String = row.try_get("priority")?;
    Ok(Notification {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        kind: row.try_get("kind")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        priority: priority.parse().map_err(decode_error)?,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_student(pool: &PgPool, student: &NewStudent) -> Result<Student, AppError> {
    let query = format!(
        "INSERT INTO student_risk.students (id, first_name, last_name, email, semester, career) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {STUDENT_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(&student.id)
        .bind(&student.first_name)
        .bind(&student.last_name)
        .bind(&student.email)
        .bind(student.semester)
        .bind(&student.career)
        .fetch_one(pool)
        .await
        .map_err(|error| from_insert_error(error, "student"))?;

    Ok(student_from_row(&row)?)
}

pub async fn fetch_student(pool: &PgPool, id: &str) -> Result<Student, AppError> {
    let query = format!("SELECT {STUDENT_COLUMNS} FROM student_risk.students WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("student", id))?;

    Ok(student_from_row(&row)?)
}

pub async fn list_students(pool: &PgPool) -> Result<Vec<Student>, AppError> {
    let query = format!(
        "SELECT {STUDENT_COLUMNS} FROM student_risk.students ORDER BY last_name, first_name"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    let students = rows
        .iter()
        .map(student_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub async fn search_students(pool: &PgPool, term: &str) -> Result<Vec<Student>, AppError> {
    let query = format!(
        "SELECT {STUDENT_COLUMNS} FROM student_risk.students \
         WHERE first_name ILIKE $1 OR last_name ILIKE $1 OR email ILIKE $1 OR id ILIKE $1 \
         ORDER BY last_name, first_name"
    );
    let rows = sqlx::query(&query)
        .bind(like_pattern(term.trim()))
        .fetch_all(pool)
        .await?;
    let students = rows
        .iter()
        .map(student_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

pub async fn update_student(
    pool: &PgPool,
    id: &str,
    update: &StudentUpdate,
) -> Result<Student, AppError> {
    let query = format!(
        "UPDATE student_risk.students SET \
         first_name = COALESCE($2, first_name), \
         last_name = COALESCE($3, last_name), \
         email = COALESCE($4, email), \
         semester = COALESCE($5, semester), \
         career = CASE WHEN $8 THEN $6 ELSE career END, \
         active = COALESCE($7, active) \
         WHERE id = $1 RETURNING {STUDENT_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.email)
        .bind(update.semester)
        .bind(update.career.clone().flatten())
        .bind(update.active)
        .bind(update.career.is_some())
        .fetch_optional(pool)
        .await
        .map_err(|error| from_insert_error(error, "email"))?
        .ok_or_else(|| AppError::not_found("student", id))?;

    Ok(student_from_row(&row)?)
}

pub async fn delete_student(pool: &PgPool, id: &str) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM student_risk.students WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("student", id));
    }
    Ok(())
}

/// Inserts imported students in one transaction. Rows whose id or email
/// already exists are skipped; the count of new rows is returned.
pub async fn import_students(pool: &PgPool, students: &[NewStudent]) -> Result<usize, AppError> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for student in students {
        let result = sqlx::query(
            r#"
            INSERT INTO student_risk.students (id, first_name, last_name, email, semester, career)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&student.id)
        .bind(&student.first_name)
        .bind(&student.last_name)
        .bind(&student.email)
        .bind(student.semester)
        .bind(&student.career)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn insert_prediction(pool: &PgPool, record: &PredictionRecord) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO student_risk.predictions
        (id, student_id, risk_tier, score, key_factors, recommendations, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(record.id)
    .bind(&record.student_id)
    .bind(record.risk_tier.as_str())
    .bind(i16::from(record.score))
    .bind(&record.key_factors)
    .bind(&record.recommendations)
    .bind(record.status.as_str())
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_prediction(pool: &PgPool, id: Uuid) -> Result<PredictionRecord, AppError> {
    let row = sqlx::query("SELECT * FROM student_risk.predictions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("prediction", id.to_string()))?;

    Ok(prediction_from_row(&row)?)
}

pub async fn list_predictions(pool: &PgPool) -> Result<Vec<PredictionSummary>, AppError> {
    let rows = sqlx::query(
        "SELECT p.id, p.student_id, s.first_name, s.last_name, p.risk_tier, p.score, \
         p.key_factors, p.status, p.created_at \
         FROM student_risk.predictions p \
         JOIN student_risk.students s ON s.id = p.student_id \
         ORDER BY p.created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    let summaries = rows
        .iter()
        .map(summary_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(summaries)
}

pub async fn list_predictions_for_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<PredictionRecord>, AppError> {
    let rows = sqlx::query(
        "SELECT * FROM student_risk.predictions WHERE student_id = $1 ORDER BY created_at DESC",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let records = rows
        .iter()
        .map(prediction_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub async fn insert_notification(
    pool: &PgPool,
    notification: &Notification,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO student_risk.notifications
        (id, student_id, kind, title, message, priority, read, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(notification.id)
    .bind(&notification.student_id)
    .bind(&notification.kind)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.priority.as_str())
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_notifications(
    pool: &PgPool,
    student_id: &str,
    unread_only: bool,
) -> Result<Vec<Notification>, AppError> {
    let rows = sqlx::query(
        "SELECT * FROM student_risk.notifications \
         WHERE student_id = $1 AND (NOT $2 OR read = FALSE) \
         ORDER BY created_at DESC",
    )
    .bind(student_id)
    .bind(unread_only)
    .fetch_all(pool)
    .await?;

    let notifications = rows
        .iter()
        .map(notification_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notifications)
}

pub async fn mark_notification_read(pool: &PgPool, id: Uuid) -> Result<Notification, AppError> {
    let row = sqlx::query(
        "UPDATE student_risk.notifications SET read = TRUE WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("notification", id.to_string()))?;

    Ok(notification_from_row(&row)?)
}

fn grade_from_row(row: &PgRow) -> Result<GradeRecord, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    Ok(GradeRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject: row.try_get("subject")?,
        kind: kind.parse().map_err(decode_error)?,
        grade: row.try_get("grade")?,
        recorded_on: row.try_get("recorded_on")?,
        created_at: row.try_get("created_at")?,
    })
}

fn attendance_from_row(row: &PgRow) -> Result<AttendanceRecord, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(AttendanceRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject: row.try_get("subject")?,
        class_date: row.try_get("class_date")?,
        status: status.parse().map_err(decode_error)?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_grade(pool: &PgPool, grade: &GradeRecord) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO student_risk.grades
        (id, student_id, subject, kind, grade, recorded_on, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(grade.id)
    .bind(&grade.student_id)
    .bind(&grade.subject)
    .bind(grade.kind.as_str())
    .bind(grade.grade)
    .bind(grade.recorded_on)
    .bind(grade.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_grades(pool: &PgPool, student_id: &str) -> Result<Vec<GradeRecord>, AppError> {
    let rows = sqlx::query(
        "SELECT * FROM student_risk.grades WHERE student_id = $1 \
         ORDER BY recorded_on DESC, created_at DESC",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let grades = rows
        .iter()
        .map(grade_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(grades)
}

/// Records attendance for a session, replacing the status of an existing
/// record for the same subject and date.
pub async fn record_attendance(
    pool: &PgPool,
    attendance: &AttendanceRecord,
) -> Result<AttendanceRecord, AppError> {
    let row = sqlx::query(
        r#"
        INSERT INTO student_risk.attendance
        (id, student_id, subject, class_date, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, subject, class_date) DO UPDATE
        SET status = EXCLUDED.status
        RETURNING *
        "#,
    )
    .bind(attendance.id)
    .bind(&attendance.student_id)
    .bind(&attendance.subject)
    .bind(attendance.class_date)
    .bind(attendance.status.as_str())
    .bind(attendance.created_at)
    .fetch_one(pool)
    .await?;

    Ok(attendance_from_row(&row)?)
}

pub async fn list_attendance(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<AttendanceRecord>, AppError> {
    let rows = sqlx::query(
        "SELECT * FROM student_risk.attendance WHERE student_id = $1 \
         ORDER BY class_date DESC, subject",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let records = rows
        .iter()
        .map(attendance_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}
