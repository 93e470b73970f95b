use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::errors::LanternError;
use crate::reporting::ExportFormat;

#[derive(Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

pub async fn export_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, LanternError> {
    let format: ExportFormat = query.format.as_deref().unwrap_or("json").parse()?;
    let document = state.engine.export_job(&id, format).await?;
    let disposition = format!("attachment; filename={}", document.file_name(&id));
    let body = document.to_bytes()?;
    Ok((
        [
            (header::CONTENT_TYPE, document.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
