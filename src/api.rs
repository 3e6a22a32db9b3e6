use actix_web::error::JsonPayloadError;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, FieldError, ValidationErrors};
use crate::events::{Event, EventBus};
use crate::export;
use crate::models::{
    AttendanceRecord, GradeRecord, NewAttendance, NewGrade, NewStudent, RiskAssessment,
    StudentUpdate,
};
use crate::predictions;
use crate::records;
use crate::report;
use crate::risk;
use crate::validate::{self, MetricsInput};

/// Shared per-process context handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub events: EventBus,
}

type HandlerResult = Result<HttpResponse, AppError>;

/// Bodies that are not valid JSON for the target type are reported like any
/// other validation failure.
fn json_error(error: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::Validation(ValidationErrors(vec![FieldError {
        field: "body",
        message: error.to_string(),
    }]))
    .into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .route("/health", web::get().to(health))
        .route("/score", web::post().to(score))
        .route("/events", web::get().to(event_stream))
        .service(
            web::scope("/students")
                .route("", web::get().to(list_students))
                .route("", web::post().to(create_student))
                .route("/export/csv", web::get().to(export_students))
                .route("/{id}", web::get().to(get_student))
                .route("/{id}", web::put().to(update_student))
                .route("/{id}", web::delete().to(delete_student))
                .route("/{id}/grades", web::get().to(list_grades))
                .route("/{id}/grades", web::post().to(add_grade))
                .route("/{id}/attendance", web::get().to(list_attendance))
                .route("/{id}/attendance", web::post().to(record_attendance))
                .route("/{id}/records/summary", web::get().to(record_summary)),
        )
        .service(
            web::scope("/predictions")
                .route("", web::get().to(list_predictions))
                .route("/summary", web::get().to(prediction_summary))
                .route("/generate", web::post().to(generate_prediction))
                .route("/student/{id}", web::get().to(predictions_for_student))
                .route("/{id}", web::get().to(get_prediction))
                .route("/{id}/report", web::get().to(prediction_report)),
        )
        .service(
            web::scope("/notifications")
                .route("/{student_id}", web::get().to(list_notifications))
                .route("/{id}/read", web::post().to(mark_notification_read)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
    }))
}

fn sse_frame(event: &Event) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {payload}\n\n", event.name()))
}

/// Server-sent events feed of everything published on the bus.
async fn event_stream(state: web::Data<AppState>) -> HttpResponse {
    let receiver = state.events.subscribe();
    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match sse_frame(&event) {
                    Ok(frame) => {
                        return Some((Ok::<_, std::convert::Infallible>(web::Bytes::from(frame)), receiver));
                    }
                    Err(error) => tracing::warn!(%error, "failed to encode event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream)
}

#[derive(Serialize)]
struct ScoreResponse {
    #[serde(flatten)]
    assessment: RiskAssessment,
    recommendations: Vec<String>,
}

async fn score(body: web::Json<MetricsInput>) -> HandlerResult {
    let metrics = body.into_inner().validate()?;
    Ok(HttpResponse::Ok().json(ScoreResponse {
        assessment: risk::score(&metrics),
        recommendations: risk::recommendations(&metrics),
    }))
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Option<String>,
}

async fn list_students(state: web::Data<AppState>, query: web::Query<SearchQuery>) -> HandlerResult {
    let students = match query.search.as_deref().map(str::trim) {
        Some(term) if !term.is_empty() => db::search_students(&state.pool, term).await?,
        _ => db::list_students(&state.pool).await?,
    };
    Ok(HttpResponse::Ok().json(students))
}

async fn create_student(state: web::Data<AppState>, body: web::Json<NewStudent>) -> HandlerResult {
    let new_student = body.into_inner();
    validate::check_new_student(&new_student)?;

    let student = db::insert_student(&state.pool, &new_student).await?;
    tracing::info!(student = %student.id, "student created");
    state.events.publish(Event::StudentCreated(student.clone()));
    Ok(HttpResponse::Created().json(student))
}

async fn export_students(state: web::Data<AppState>) -> HandlerResult {
    let students = db::list_students(&state.pool).await?;
    let body = export::students_csv(&students)?;
    let filename = format!("students-{}.csv", chrono::Utc::now().format("%Y-%m-%d"));
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(body))
}

async fn get_student(state: web::Data<AppState>, id: web::Path<String>) -> HandlerResult {
    let student = db::fetch_student(&state.pool, &id).await?;
    Ok(HttpResponse::Ok().json(student))
}

async fn update_student(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<StudentUpdate>,
) -> HandlerResult {
    let update = body.into_inner();
    validate::check_student_update(&update)?;

    let student = db::update_student(&state.pool, &id, &update).await?;
    tracing::info!(student = %student.id, "student updated");
    state.events.publish(Event::StudentUpdated(student.clone()));
    Ok(HttpResponse::Ok().json(student))
}

async fn delete_student(state: web::Data<AppState>, id: web::Path<String>) -> HandlerResult {
    let id = id.into_inner();
    db::delete_student(&state.pool, &id).await?;
    tracing::info!(student = %id, "student deleted");
    state.events.publish(Event::StudentDeleted { id: id.clone() });
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": format!("student {id} deleted") })))
}

async fn list_grades(state: web::Data<AppState>, id: web::Path<String>) -> HandlerResult {
    let student = db::fetch_student(&state.pool, &id).await?;
    let grades = db::list_grades(&state.pool, &student.id).await?;
    Ok(HttpResponse::Ok().json(grades))
}

async fn add_grade(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<NewGrade>,
) -> HandlerResult {
    let new_grade = body.into_inner();
    validate::check_new_grade(&new_grade)?;

    let student = db::fetch_student(&state.pool, &id).await?;
    let grade = GradeRecord::new(&student.id, new_grade);
    db::insert_grade(&state.pool, &grade).await?;
    tracing::info!(student = %student.id, subject = %grade.subject, "grade recorded");
    Ok(HttpResponse::Created().json(grade))
}

async fn list_attendance(state: web::Data<AppState>, id: web::Path<String>) -> HandlerResult {
    let student = db::fetch_student(&state.pool, &id).await?;
    let attendance = db::list_attendance(&state.pool, &student.id).await?;
    Ok(HttpResponse::Ok().json(attendance))
}

async fn record_attendance(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<NewAttendance>,
) -> HandlerResult {
    let new_attendance = body.into_inner();
    validate::check_new_attendance(&new_attendance)?;

    let student = db::fetch_student(&state.pool, &id).await?;
    let stored =
        db::record_attendance(&state.pool, &AttendanceRecord::new(&student.id, new_attendance))
            .await?;
    tracing::info!(
        student = %student.id,
        subject = %stored.subject,
        date = %stored.class_date,
        "attendance recorded"
    );
    Ok(HttpResponse::Created().json(stored))
}

async fn record_summary(state: web::Data<AppState>, id: web::Path<String>) -> HandlerResult {
    let summary = records::load_summary(&state.pool, &id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

async fn list_predictions(state: web::Data<AppState>) -> HandlerResult {
    let predictions = db::list_predictions(&state.pool).await?;
    Ok(HttpResponse::Ok().json(predictions))
}

async fn prediction_summary(state: web::Data<AppState>) -> HandlerResult {
    let predictions = db::list_predictions(&state.pool).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/markdown; charset=utf-8")
        .body(report::cohort_summary(&predictions)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    student_id: String,
    #[serde(default)]
    metrics: MetricsInput,
    /// Fill omitted grade, attendance and exam metrics from stored records.
    #[serde(default)]
    from_records: bool,
}

async fn generate_prediction(
    state: web::Data<AppState>,
    body: web::Json<GenerateRequest>,
) -> HandlerResult {
    let request = body.into_inner();
    let record = if request.from_records {
        predictions::generate_from_records(
            &state.pool,
            &state.events,
            &request.student_id,
            request.metrics,
        )
        .await?
    } else {
        predictions::generate(&state.pool, &state.events, &request.student_id, request.metrics)
            .await?
    };
    Ok(HttpResponse::Created().json(record))
}

async fn predictions_for_student(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> HandlerResult {
    let student = db::fetch_student(&state.pool, &id).await?;
    let records = db::list_predictions_for_student(&state.pool, &student.id).await?;
    Ok(HttpResponse::Ok().json(records))
}

async fn get_prediction(state: web::Data<AppState>, id: web::Path<Uuid>) -> HandlerResult {
    let record = db::fetch_prediction(&state.pool, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}

async fn prediction_report(state: web::Data<AppState>, id: web::Path<Uuid>) -> HandlerResult {
    let record = db::fetch_prediction(&state.pool, id.into_inner()).await?;
    let student = db::fetch_student(&state.pool, &record.student_id).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/markdown; charset=utf-8")
        .body(report::prediction_report(&student, &record)))
}

#[derive(Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread: bool,
}

async fn list_notifications(
    state: web::Data<AppState>,
    student_id: web::Path<String>,
    query: web::Query<NotificationQuery>,
) -> HandlerResult {
    let notifications = db::list_notifications(&state.pool, &student_id, query.unread).await?;
    Ok(HttpResponse::Ok().json(notifications))
}

async fn mark_notification_read(state: web::Data<AppState>, id: web::Path<Uuid>) -> HandlerResult {
    let notification = db::mark_notification_read(&state.pool, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(notification))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, App};
    use sqlx::postgres::PgPoolOptions;

    fn state() -> AppState {
        AppState {
            pool: PgPoolOptions::new()
                .max_connections(1)
                .connect_lazy("postgres://localhost/unused")
                .unwrap(),
            events: EventBus::new(),
        }
    }

    #[test]
    fn sse_frames_carry_event_name_and_json() {
        let frame = sse_frame(&Event::StudentDeleted {
            id: "S-4".to_string(),
        })
        .unwrap();
        assert_eq!(
            frame,
            "event: student:deleted\ndata: {\"type\":\"studentDeleted\",\"payload\":{\"id\":\"S-4\"}}\n\n"
        );
    }

    #[actix_web::test]
    async fn health_reports_healthy() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(configure),
        )
        .await;
        let request = actix_test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["status"], "healthy");
    }

    #[actix_web::test]
    async fn score_returns_assessment_without_storage() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(configure),
        )
        .await;
        let request = actix_test::TestRequest::post()
            .uri("/score")
            .set_json(serde_json::json!({
                "averageGrade": 5.5,
                "attendancePercentage": 95,
                "weeklyStudyHours": 20,
                "classParticipation": "high",
                "assignmentSubmissionPercentage": 95,
                "examAverage": 8
            }))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["tier"], "Low");
        assert_eq!(body["score"], 15);
        assert_eq!(body["factors"][0], "Low average grade (5.5/10)");
        assert!(body["recommendations"].as_array().is_some());
    }

    #[actix_web::test]
    async fn score_rejects_out_of_range_input() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(configure),
        )
        .await;
        let request = actix_test::TestRequest::post()
            .uri("/score")
            .set_json(serde_json::json!({
                "averageGrade": 75,
                "attendancePercentage": 95,
                "weeklyStudyHours": 20,
                "assignmentSubmissionPercentage": 95,
                "examAverage": 8
            }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = actix_test::read_body_json(response).await;
        assert_eq!(body["fields"][0]["field"], "averageGrade");
    }

    #[actix_web::test]
    async fn generate_validates_before_looking_up_student() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(configure),
        )
        .await;
        let request = actix_test::TestRequest::post()
            .uri("/predictions/generate")
            .set_json(serde_json::json!({ "studentId": "S-1", "metrics": {} }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn create_student_rejects_invalid_body() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(configure),
        )
        .await;
        let request = actix_test::TestRequest::post()
            .uri("/students")
            .set_json(serde_json::json!({
                "id": "1723456789",
                "firstName": "Avery",
                "lastName": "Lee",
                "email": "not-an-email"
            }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn non_numeric_metric_is_a_field_error() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(configure),
        )
        .await;
        let request = actix_test::TestRequest::post()
            .uri("/score")
            .set_json(serde_json::json!({
                "averageGrade": "abc",
                "attendancePercentage": 95,
                "weeklyStudyHours": 20,
                "assignmentSubmissionPercentage": 95,
                "examAverage": 8
            }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = actix_test::read_body_json(response).await;
        assert_eq!(body["fields"][0]["field"], "averageGrade");
        assert_eq!(body["fields"][0]["message"], "must be a number");
    }

    #[actix_web::test]
    async fn malformed_json_is_reported_as_json() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(configure),
        )
        .await;
        let request = actix_test::TestRequest::post()
            .uri("/score")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"averageGrade\": ")
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = actix_test::read_body_json(response).await;
        assert_eq!(body["fields"][0]["field"], "body");
    }

    #[actix_web::test]
    async fn grade_is_validated_before_student_lookup() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(configure),
        )
        .await;
        let request = actix_test::TestRequest::post()
            .uri("/students/S-1/grades")
            .set_json(serde_json::json!({ "subject": "Chemistry", "kind": "exam", "grade": 12 }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = actix_test::read_body_json(response).await;
        assert_eq!(body["fields"][0]["field"], "grade");
    }
}
