mod domains;
mod health;
mod practice_tests;
mod topics;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::response::{json_error, AppError};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/topics", topics::router())
        .nest("/api/tests", practice_tests::router())
        .nest("/api/domains", domains::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}

fn validation_rejection(rejection: impl std::fmt::Display) -> AppError {
    AppError::validation(rejection.to_string())
}

fn require_user_id(user_id: &str) -> Result<&str, AppError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    Ok(trimmed)
}
