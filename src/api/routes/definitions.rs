use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::models::JobCreatedResponse;
use crate::api::AppState;
use crate::errors::LanternError;
use crate::models::{JobState, NewScanDefinition, ScanDefinition};

pub async fn create_definition(
    State(state): State<AppState>,
    Json(def): Json<NewScanDefinition>,
) -> Result<(StatusCode, Json<ScanDefinition>), LanternError> {
    let saved = state.engine.register_scan_definition(def)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn list_definitions(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScanDefinition>>, LanternError> {
    Ok(Json(state.engine.list_definitions()?))
}

/// Start a job from a saved definition right away.
pub async fn run_definition(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<JobCreatedResponse>), LanternError> {
    let job_id = state.engine.run_definition(id)?;
    Ok((StatusCode::CREATED, Json(JobCreatedResponse { id: job_id, state: JobState::Queued })))
}
