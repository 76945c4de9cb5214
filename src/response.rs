use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::question_selector::SelectionError;
use crate::services::topic_aggregator::AggregationError;
use crate::services::topic_mastery::ActivityError;

#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn no_questions(message: impl Into<String>) -> Self {
        Self::operational(
            StatusCode::UNPROCESSABLE_ENTITY,
            "NO_QUESTIONS_AVAILABLE",
            message,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn operational(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_operational {
            self.message
        } else {
            "internal server error".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

pub fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> AppError {
    AppError {
        status,
        code: code.into(),
        message: message.into(),
        is_operational: true,
    }
}

impl From<SelectionError> for AppError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::InvalidCriteria(message) => AppError::validation(message),
            SelectionError::NoSources | SelectionError::EmptyPool => {
                AppError::no_questions(err.to_string())
            }
            SelectionError::Store(store_err) => {
                tracing::error!(error = %store_err, "question selection failed");
                AppError::internal(store_err.to_string())
            }
        }
    }
}

impl From<AggregationError> for AppError {
    fn from(err: AggregationError) -> Self {
        tracing::error!(error = %err, "topic aggregation failed");
        AppError::internal(err.to_string())
    }
}

impl From<ActivityError> for AppError {
    fn from(err: ActivityError) -> Self {
        match err {
            ActivityError::InvalidInput(message) => AppError::validation(message),
            ActivityError::ResourceNotFound(_) => AppError::not_found(err.to_string()),
            ActivityError::Forbidden => AppError::forbidden(err.to_string()),
            ActivityError::Store(store_err) => {
                tracing::error!(error = %store_err, "activity recording failed");
                AppError::internal(store_err.to_string())
            }
        }
    }
}
