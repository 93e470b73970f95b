pub mod errors;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::LanternConfig;
use crate::db::{Database, JobStore};
use crate::errors::LanternError;
use crate::pipeline::ScanEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: ScanEngine,
}

pub fn create_app_state(config: &LanternConfig) -> Result<AppState, LanternError> {
    let db = Database::new(&config.storage.database)?;
    let store: Arc<dyn JobStore> = Arc::new(db);
    Ok(AppState { engine: ScanEngine::from_config(config, store) })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/jobs", post(routes::jobs::create_job).get(routes::jobs::list_jobs))
        .route("/api/jobs/{id}", get(routes::jobs::get_job))
        .route("/api/jobs/{id}/findings", get(routes::jobs::get_findings))
        .route("/api/jobs/{id}/stream", get(routes::stream::stream_job))
        .route("/api/jobs/{id}/log", get(routes::stream::get_log))
        .route("/api/jobs/{id}/cancel", post(routes::jobs::cancel_job))
        .route("/api/jobs/{id}/export", get(routes::exports::export_job))
        .route(
            "/api/definitions",
            post(routes::definitions::create_definition).get(routes::definitions::list_definitions),
        )
        .route("/api/definitions/{id}/run", post(routes::definitions::run_definition))
        .route("/api/stats/summary", get(routes::stats::summary))
        .route("/api/stats/throughput", get(routes::stats::throughput))
        .route("/api/templates", get(routes::templates::list_templates))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
