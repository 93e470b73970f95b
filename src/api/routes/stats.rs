use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::errors::LanternError;
use crate::reporting::SeveritySummary;

#[derive(Deserialize)]
pub struct ThroughputQuery {
    pub days: Option<i64>,
}

pub async fn summary(State(state): State<AppState>) -> Result<Json<SeveritySummary>, LanternError> {
    Ok(Json(state.engine.stats_summary().await?))
}

/// `{labels, counts}`, one entry per day, oldest first.
pub async fn throughput(
    State(state): State<AppState>,
    Query(query): Query<ThroughputQuery>,
) -> Result<Json<Value>, LanternError> {
    let points = state.engine.stats_throughput(query.days.unwrap_or(14)).await?;
    let labels: Vec<String> = points.iter().map(|p| p.day.to_string()).collect();
    let counts: Vec<usize> = points.iter().map(|p| p.jobs).collect();
    Ok(Json(json!({ "labels": labels, "counts": counts })))
}
