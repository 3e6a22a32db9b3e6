use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|error| error.field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    Validation(ValidationErrors),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldError]>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let fields = match self {
            Self::Validation(errors) => Some(errors.0.as_slice()),
            _ => None,
        };
        let error = match self {
            Self::Database(_) | Self::Csv(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { error, fields })
    }
}

/// Maps unique-constraint violations to `Conflict`, everything else to `Database`.
pub fn from_insert_error(error: sqlx::Error, what: &str) -> AppError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{what} already exists"))
        }
        _ => AppError::Database(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let invalid = AppError::Validation(ValidationErrors(vec![FieldError {
            field: "attendancePercentage",
            message: "must be between 0 and 100".to_string(),
        }]));
        assert_eq!(invalid.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AppError::not_found("student", "S-9").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("student already exists".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn validation_message_lists_every_field() {
        let errors = ValidationErrors(vec![
            FieldError {
                field: "averageGrade",
                message: "is required".to_string(),
            },
            FieldError {
                field: "examAverage",
                message: "must be between 0 and 10".to_string(),
            },
        ]);
        assert_eq!(
            errors.to_string(),
            "averageGrade: is required; examAverage: must be between 0 and 10"
        );
        assert_eq!(
            AppError::not_found("prediction", "abc").to_string(),
            "prediction abc not found"
        );
    }

    #[test]
    fn validation_errors_propagate_through_anyhow() {
        fn checked() -> anyhow::Result<()> {
            let result: Result<(), ValidationErrors> = Err(ValidationErrors(vec![FieldError {
                field: "weeklyStudyHours",
                message: "is required".to_string(),
            }]));
            result?;
            Ok(())
        }

        let error = checked().unwrap_err();
        assert_eq!(error.to_string(), "weeklyStudyHours: is required");
        assert!(error.downcast_ref::<ValidationErrors>().is_some());
    }
}
