use std::path::{Path, PathBuf};

use axum::extract::{Multipart, State};
use axum::response::Html;
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::assessment::artifacts::{new_run_id, View, ViewPaths};
use crate::assessment::exercises::Exercise;
use crate::assessment::pipeline::{AnalysisMode, AssessmentRequest, PipelineWarning};
use crate::errors::AppError;
use crate::state::AppState;

const UPLOAD_PAGE: &str = include_str!("../../templates/upload.html");

/// Upload extensions accepted as-is; anything else is stored as `.jpg`.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "JPG", "JPEG", "PNG", "WEBP"];

#[derive(Debug, Serialize)]
pub struct AssessmentResponse {
    pub run_id: String,
    pub posture_score: Option<u32>,
    pub exercises: Vec<Exercise>,
    pub warnings: Vec<PipelineWarning>,
    pub report_url: Option<String>,
}

/// GET /
pub async fn handle_upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE)
}

/// POST /api/v1/assessments
///
/// Multipart fields: `front`, `left`, `right`, `back` (files, all required),
/// `height` (cm, optional) and `mode` (`image` or `hybrid`, default `image`).
pub async fn handle_create_assessment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AssessmentResponse>, AppError> {
    let mut uploads: [Option<(String, Bytes)>; 4] = Default::default();
    let mut height_cm = None;
    let mut mode = AnalysisMode::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(view) = View::ALL.iter().copied().find(|v| v.stem() == name) {
            let file_name = upload_name(view, field.file_name());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("could not read {name} upload: {e}")))?;
            if data.is_empty() {
                return Err(AppError::Validation(format!("{name} image is empty")));
            }
            uploads[view as usize] = Some((file_name, data));
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| AppError::Validation(format!("could not read field {name}: {e}")))?;
        match name.as_str() {
            "height" => height_cm = parse_height(&text)?,
            "mode" => mode = text.parse()?,
            _ => {}
        }
    }

    // Nothing touches OUTPUT_DIR until the whole form has validated.
    let [front, left, right, back] = require_views(uploads)?;
    let run_id = new_run_id();
    let run_dir = state.config.output_dir.join(&run_id);
    tokio::fs::create_dir_all(&run_dir).await?;

    let images = ViewPaths {
        front: save_upload(&run_dir, front).await?,
        left: save_upload(&run_dir, left).await?,
        right: save_upload(&run_dir, right).await?,
        back: save_upload(&run_dir, back).await?,
    };
    info!("Assessment {run_id} received ({mode:?})");

    let cancel = state.shutdown.child_token();
    let outcome = state
        .pipeline
        .run(
            AssessmentRequest {
                images,
                height_cm,
                mode,
                run_dir,
            },
            &cancel,
        )
        .await?;

    let (posture_score, exercises, report_url) = match &outcome.report {
        Some(report) => (
            Some(report.posture_score),
            report.exercises.clone(),
            Some(format!("/report/{run_id}/report.html")),
        ),
        None => (None, Vec::new(), None),
    };

    Ok(Json(AssessmentResponse {
        run_id,
        posture_score,
        exercises,
        warnings: outcome.warnings,
        report_url,
    }))
}

/// `<view>.<ext>` keeping a recognised image extension from the client's file name.
fn upload_name(view: View, client_name: Option<&str>) -> String {
    let ext = client_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| ALLOWED_EXTENSIONS.contains(e))
        .unwrap_or("jpg");
    format!("{}.{ext}", view.stem())
}

/// Blank means "not provided"; otherwise a positive number of centimetres.
fn parse_height(text: &str) -> Result<Option<f64>, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(h) if h.is_finite() && h > 0.0 => Ok(Some(h)),
        _ => Err(AppError::Validation(format!(
            "height must be a positive number of centimetres, got '{text}'"
        ))),
    }
}

/// Every view slot filled, in `View::ALL` order, or the first missing view as an error.
fn require_views<T>(slots: [Option<T>; 4]) -> Result<[T; 4], AppError> {
    let [front, left, right, back] = slots;
    let require = |slot: Option<T>, view: View| {
        slot.ok_or_else(|| AppError::Validation(format!("Missing {} image", view.stem())))
    };
    Ok([
        require(front, View::Front)?,
        require(left, View::Left)?,
        require(right, View::Right)?,
        require(back, View::Back)?,
    ])
}

async fn save_upload(run_dir: &Path, (file_name, data): (String, Bytes)) -> Result<PathBuf, AppError> {
    let path = run_dir.join(file_name);
    tokio::fs::write(&path, &data).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_name_keeps_known_extensions() {
        assert_eq!(upload_name(View::Front, Some("IMG_0001.PNG")), "front.PNG");
        assert_eq!(upload_name(View::Left, Some("photo.webp")), "left.webp");
        assert_eq!(upload_name(View::Back, Some("../../etc/passwd")), "back.jpg");
        assert_eq!(upload_name(View::Right, None), "right.jpg");
    }

    #[test]
    fn test_parse_height() {
        assert_eq!(parse_height("").unwrap(), None);
        assert_eq!(parse_height(" 172.5 ").unwrap(), Some(172.5));
        assert!(parse_height("0").is_err());
        assert!(parse_height("tall").is_err());
        assert!(parse_height("NaN").is_err());
    }

    #[test]
    fn test_require_views_needs_every_view() {
        let views = require_views([Some("f"), Some("l"), Some("r"), Some("b")]).unwrap();
        assert_eq!(views, ["f", "l", "r", "b"]);

        let err = require_views([Some("f"), None, Some("r"), None]).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg == "Missing left image"));
    }
}
