use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::services::exam_profile;
use crate::services::question_selector::{self, SelectionCriteria};
use crate::state::AppState;
use crate::types::{ExamContext, TestType};

use super::validation_rejection;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/select", post(select_questions))
        .route("/recommendation", get(recommendation))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationQuery {
    test_type: TestType,
    exam_context: ExamContext,
    #[serde(default)]
    mastery_level: Option<f64>,
}

async fn select_questions(
    State(state): State<AppState>,
    payload: Result<Json<SelectionCriteria>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(criteria) = payload.map_err(validation_rejection)?;

    let store = state.store();
    let mut rng = state.selection_rng();
    let selected =
        question_selector::select_questions_for_test(store.as_ref(), &criteria, &mut rng).await?;

    Ok(ok(selected))
}

async fn recommendation(
    query: Result<Query<RecommendationQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query.map_err(validation_rejection)?;

    Ok(ok(exam_profile::recommend_test(
        query.test_type,
        query.exam_context,
        query.mastery_level,
    )))
}
