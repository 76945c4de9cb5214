use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::services::topic_aggregator;
use crate::services::topic_mastery::{self, RecordActivityInput};
use crate::state::AppState;
use crate::types::{ExamContext, Subject};

use super::{require_user_id, validation_rejection};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_topics))
        .route("/resources/:id", get(get_resource))
        .route("/activities", post(record_activity))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicsQuery {
    user_id: String,
    subject: Subject,
    exam_context: ExamContext,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceQuery {
    user_id: String,
}

async fn list_topics(
    State(state): State<AppState>,
    query: Result<Query<TopicsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query.map_err(validation_rejection)?;
    let user_id = require_user_id(&query.user_id)?;

    let store = state.store();
    let resources = topic_aggregator::aggregate_topics(
        store.as_ref(),
        user_id,
        query.subject,
        query.exam_context,
        state.aggregation(),
    )
    .await?;

    Ok(ok(resources))
}

async fn get_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    query: Result<Query<ResourceQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query.map_err(validation_rejection)?;
    let user_id = require_user_id(&query.user_id)?;

    let store = state.store();
    let resource = topic_aggregator::topic_resource(
        store.as_ref(),
        user_id,
        &resource_id,
        state.aggregation(),
    )
    .await?
    .ok_or_else(|| AppError::not_found(format!("topic resource {resource_id} not found")))?;

    Ok(ok(resource))
}

async fn record_activity(
    State(state): State<AppState>,
    payload: Result<Json<RecordActivityInput>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = payload.map_err(validation_rejection)?;

    let store = state.store();
    let progress = topic_mastery::record_topic_activity(store.as_ref(), input).await?;

    Ok(ok(progress))
}
