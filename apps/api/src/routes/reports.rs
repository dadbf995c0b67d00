use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};

use crate::assessment::artifacts::{is_safe_component, REPORT_FILE};
use crate::errors::AppError;
use crate::state::AppState;

/// GET /report/:run_id
/// Redirects so relative image links in the report resolve inside the run directory.
pub async fn handle_report(Path(run_id): Path<String>) -> Result<Redirect, AppError> {
    if !is_safe_component(&run_id) {
        return Err(AppError::NotFound(format!("Run {run_id} not found")));
    }
    Ok(Redirect::to(&format!("/report/{run_id}/{REPORT_FILE}")))
}

/// GET /report/:run_id/:file
pub async fn handle_report_file(
    State(state): State<AppState>,
    Path((run_id, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    if !is_safe_component(&run_id) || !is_safe_component(&file) {
        return Err(AppError::NotFound(format!("{run_id}/{file} not found")));
    }

    let path = state.config.output_dir.join(&run_id).join(&file);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::NotFound(format!("{run_id}/{file} not found")))?;

    Ok(([(header::CONTENT_TYPE, content_type(FsPath::new(&file)))], bytes).into_response())
}

fn content_type(file: &FsPath) -> &'static str {
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
