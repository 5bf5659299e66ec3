use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;
use crate::streaks::{CompletionError, LedgerError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::HabitNotFound => AppError::NotFound("Habit not found".into()),
            StoreError::CompletionNotFound => AppError::NotFound("Completion not found".into()),
            StoreError::EmailTaken => AppError::Conflict("Email already registered".into()),
            StoreError::Completion(e) => e.into(),
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<CompletionError> for AppError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::BeforeCreation { .. } | CompletionError::InFuture { .. } => {
                AppError::Validation(format!("Invalid date: {}", err))
            }
            CompletionError::Ledger(LedgerError::DuplicateCompletion(_)) => {
                AppError::Conflict(format!("Habit {}", err))
            }
            CompletionError::Ledger(LedgerError::NotFound(_)) => AppError::NotFound(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "code": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 4).unwrap()
    }

    #[test]
    fn test_store_errors_map_to_http_status() {
        let cases = [
            (StoreError::HabitNotFound, StatusCode::NOT_FOUND),
            (StoreError::CompletionNotFound, StatusCode::NOT_FOUND),
            (StoreError::EmailTaken, StatusCode::CONFLICT),
            (
                StoreError::Completion(CompletionError::InFuture { date: day(), today: day() }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                StoreError::Completion(LedgerError::DuplicateCompletion(day()).into()),
                StatusCode::CONFLICT,
            ),
        ];

        for (err, status) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_database_errors_are_opaque() {
        let response = AppError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
