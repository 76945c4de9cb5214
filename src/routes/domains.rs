use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::response::{ok, AppError};
use crate::services::domain_classifier::{self, DomainTaxonomy};
use crate::services::domain_report;
use crate::state::AppState;
use crate::types::Subject;

use super::{require_user_id, validation_rejection};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/classify", get(classify))
        .route("/report", get(report))
}

#[derive(Debug, Deserialize)]
struct ClassifyQuery {
    #[serde(default)]
    topic: String,
    subject: Subject,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyResponse {
    topic: String,
    subject: Subject,
    domain: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportQuery {
    user_id: String,
    subject: Subject,
}

async fn classify(
    State(state): State<AppState>,
    query: Result<Query<ClassifyQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query.map_err(validation_rejection)?;

    let taxonomies = state.taxonomies();
    let domain =
        domain_classifier::classify_topic_to_domain(&taxonomies, &query.topic, query.subject);

    Ok(ok(ClassifyResponse {
        topic: query.topic,
        subject: query.subject,
        domain,
    }))
}

async fn report(
    State(state): State<AppState>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query.map_err(validation_rejection)?;
    let user_id = require_user_id(&query.user_id)?;

    let store = state.store();
    let source_ids: Vec<String> = store
        .question_sources(user_id, query.subject, true)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .into_iter()
        .map(|source| source.id)
        .collect();
    let questions = if source_ids.is_empty() {
        Vec::new()
    } else {
        store
            .questions_for_sources(&source_ids)
            .await
            .map_err(|err| AppError::internal(err.to_string()))?
    };

    let taxonomies = state.taxonomies();
    let reports = match taxonomies.get(query.subject) {
        Some(taxonomy) => domain_report::summarize_domains(taxonomy, &questions),
        None => domain_report::summarize_domains(
            &DomainTaxonomy::new(query.subject, Vec::new()),
            &questions,
        ),
    };

    Ok(ok(reports))
}
