use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use crate::errors::LanternError;

impl IntoResponse for LanternError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            LanternError::Configuration(_)
            | LanternError::InvalidPolicy(_)
            | LanternError::InvalidTarget(_)
            | LanternError::Cron(_) => StatusCode::BAD_REQUEST,
            LanternError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
