use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::models::{CreateJobRequest, JobCreatedResponse, JobListItem};
use crate::api::AppState;
use crate::errors::LanternError;
use crate::models::templates::find_template;
use crate::models::{Finding, JobRecord, JobState, Policy};

const MAX_LIST_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobCreatedResponse>), LanternError> {
    let policy = match (req.policy, req.template.as_deref()) {
        (Some(policy), _) => policy,
        (None, Some(id)) => find_template(id)
            .map(|t| t.policy)
            .ok_or_else(|| LanternError::Configuration(format!("unknown template '{}'", id)))?,
        (None, None) => Policy::default(),
    };
    let id = state.engine.create_job(req.targets.into_targets(), policy)?;
    Ok((StatusCode::CREATED, Json(JobCreatedResponse { id, state: JobState::Queued })))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, LanternError> {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT);
    let jobs: Vec<JobListItem> = state
        .engine
        .list_jobs(limit)
        .await?
        .into_iter()
        .map(JobListItem::from)
        .collect();
    Ok(Json(json!({ "jobs": jobs, "total": jobs.len() })))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, LanternError> {
    Ok(Json(state.engine.job(&id).await?))
}

pub async fn get_findings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Finding>>, LanternError> {
    Ok(Json(state.engine.job_findings(&id).await?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, LanternError> {
    let previous = state.engine.cancel_job(&id).await?;
    Ok(Json(json!({
        "id": id,
        "state": previous,
        "cancel_requested": !previous.is_terminal(),
    })))
}
