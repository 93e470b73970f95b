use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "build_timestamp": env!("BUILD_TIMESTAMP"),
        "git_hash": option_env!("GIT_HASH").unwrap_or("unknown"),
        "active_jobs": state.engine.registry().len(),
    }))
}
