use axum::Json;

use crate::models::templates::{builtin_templates, ScanTemplate};

pub async fn list_templates() -> Json<Vec<ScanTemplate>> {
    Json(builtin_templates())
}
