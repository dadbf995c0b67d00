//! One assessment run, end to end:
//!
//! copy inputs → (hybrid) extract measurements → compose prompt → call provider →
//! persist raw text → clean/parse → enrich → persist analysis → render report.
//!
//! Configuration, extraction and provider failures abort the run. Everything after the
//! provider call degrades to a `PipelineWarning` so the raw response is never lost.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assessment::artifacts::{
    copy_view_image, discover_input_images, write_json, View, ViewPaths, ANALYSIS_FILE,
    METRICS_FILE, RAW_RESPONSE_FILE, REPORT_FILE,
};
use crate::assessment::contract::{posture_schema, validate_ranges};
use crate::assessment::exercises::RecommendationConfig;
use crate::assessment::measurement::LandmarkExtractor;
use crate::assessment::models::MeasurementSet;
use crate::assessment::normalize::{clean_response, parse_document};
use crate::assessment::prompt::{compose, PromptTemplates};
use crate::assessment::render::ReportRenderer;
use crate::assessment::report::{enrich, EnrichedReport};
use crate::errors::AppError;
use crate::llm_client::{SchemaEnforcement, VisionProvider};

/// Non-fatal conditions collected over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    #[error("{view:?} image unavailable at {path}: {reason}")]
    PartialInput {
        view: View,
        path: String,
        reason: String,
    },

    #[error("contract violation at {path}: {message}")]
    ContractViolation { path: String, message: String },

    #[error("provider response could not be parsed: {message}")]
    MalformedResponse { message: String },

    #[error("could not write {path}: {reason}")]
    ArtifactWriteFailed { path: String, reason: String },

    #[error("report rendering failed: {message}")]
    RenderFailed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Prompt plus the four images.
    #[default]
    ImageOnly,
    /// Landmark measurements substituted into the prompt alongside the images.
    Hybrid,
}

impl FromStr for AnalysisMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "image" | "image_only" => Ok(AnalysisMode::ImageOnly),
            "hybrid" => Ok(AnalysisMode::Hybrid),
            other => Err(AppError::Validation(format!(
                "unknown mode '{other}', expected 'image' or 'hybrid'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub images: ViewPaths,
    pub height_cm: Option<f64>,
    pub mode: AnalysisMode,
    /// Unique per run; created by the caller.
    pub run_dir: PathBuf,
}

/// Everything a run produced. `report` is `None` when the response could not be parsed.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub measurements: Option<MeasurementSet>,
    pub raw_response: String,
    pub report: Option<EnrichedReport>,
    pub warnings: Vec<PipelineWarning>,
}

impl RunOutcome {
    pub fn posture_score(&self) -> Option<u32> {
        self.report.as_ref().map(|r| r.posture_score)
    }
}

/// Collaborators and limits shared by every run. Holds no per-run state.
#[derive(Clone)]
pub struct Pipeline {
    pub provider: Arc<dyn VisionProvider>,
    pub extractor: Arc<dyn LandmarkExtractor>,
    pub renderer: Arc<dyn ReportRenderer>,
    pub templates: PromptTemplates,
    pub recommendations: RecommendationConfig,
    pub extractor_timeout: Duration,
    pub provider_timeout: Duration,
}

impl Pipeline {
    pub async fn run(
        &self,
        request: AssessmentRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AppError> {
        let AssessmentRequest {
            images,
            height_cm,
            mode,
            run_dir,
        } = request;
        let mut warnings = Vec::new();

        info!("Starting posture analysis ({:?}) into {}", mode, run_dir.display());
        copy_inputs(&images, &run_dir, &mut warnings).await;

        let measurements = match mode {
            AnalysisMode::ImageOnly => None,
            AnalysisMode::Hybrid => {
                info!("Extracting pose landmarks...");
                let set = bounded(
                    "extraction",
                    self.extractor_timeout,
                    cancel,
                    self.extractor.extract(&images, height_cm, &run_dir),
                )
                .await?;
                for (name, metric) in set.entries() {
                    info!(
                        "  {}: {:.1} {} (confidence: {:.2})",
                        name, metric.value, metric.unit, metric.confidence
                    );
                }
                persist_json(&run_dir.join(METRICS_FILE), &set, &mut warnings).await;
                Some(set)
            }
        };

        let composed = compose(&self.templates, &images, measurements.as_ref()).await?;
        warnings.extend(composed.warnings);

        info!(
            "Calling {} ({})...",
            self.provider.name(),
            self.provider.model()
        );
        let raw_response = bounded(
            "provider",
            self.provider_timeout,
            cancel,
            self.provider.generate(&composed.request),
        )
        .await?;

        let raw_path = run_dir.join(RAW_RESPONSE_FILE);
        if let Err(e) = tokio::fs::write(&raw_path, &raw_response).await {
            record(
                &mut warnings,
                PipelineWarning::ArtifactWriteFailed {
                    path: raw_path.display().to_string(),
                    reason: e.to_string(),
                },
            );
        }

        let cleaned = clean_response(&raw_response);
        if self.provider.enforcement() == SchemaEnforcement::PostValidation {
            check_contract(cleaned, &mut warnings);
        }

        let document = match parse_document(cleaned) {
            Ok(doc) => doc,
            Err(e) => {
                record(
                    &mut warnings,
                    PipelineWarning::MalformedResponse {
                        message: e.to_string(),
                    },
                );
                return Ok(RunOutcome {
                    run_dir,
                    measurements,
                    raw_response,
                    report: None,
                    warnings,
                });
            }
        };

        let report = enrich(document, images.input_images(), &self.recommendations);
        info!(
            "Posture score: {} with {} exercise(s)",
            report.posture_score,
            report.exercises.len()
        );

        persist_json(&run_dir.join(ANALYSIS_FILE), &report, &mut warnings).await;
        render_report(self.renderer.as_ref(), &report, &run_dir.join(REPORT_FILE), &mut warnings);

        Ok(RunOutcome {
            run_dir,
            measurements,
            raw_response,
            report: Some(report),
            warnings,
        })
    }
}

/// Re-derives score, regions and exercises from a saved `analysis.json` (raw or already
/// enriched) and re-renders `report.html` beside it.
pub fn render_saved(
    json_path: &Path,
    renderer: &dyn ReportRenderer,
    recommendations: &RecommendationConfig,
) -> Result<EnrichedReport, AppError> {
    let text = std::fs::read_to_string(json_path)
        .map_err(|e| AppError::NotFound(format!("{}: {e}", json_path.display())))?;
    let document = parse_document(clean_response(&text))
        .map_err(|e| AppError::MalformedResponse(e.to_string()))?;

    let dir = json_path.parent().unwrap_or_else(|| Path::new("."));
    let report = enrich(document, discover_input_images(dir), recommendations);
    renderer
        .render(&report, &dir.join(REPORT_FILE))
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(report)
}

/// Races `fut` against the deadline and the run's cancellation token.
async fn bounded<T, E, F>(
    stage: &'static str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    AppError: From<E>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(inner) => inner.map_err(AppError::from),
            Err(_) => Err(AppError::Timeout { stage, secs: limit.as_secs() }),
        },
    }
}

fn record(warnings: &mut Vec<PipelineWarning>, warning: PipelineWarning) {
    warn!("{}", warning);
    warnings.push(warning);
}

/// A missing source is left for the composer to report; any other failure is a write warning.
async fn copy_inputs(images: &ViewPaths, run_dir: &Path, warnings: &mut Vec<PipelineWarning>) {
    for view in View::ALL {
        let source = images.get(view);
        if !source.is_file() {
            continue;
        }
        if let Err(e) = copy_view_image(view, source, run_dir).await {
            record(
                warnings,
                PipelineWarning::ArtifactWriteFailed {
                    path: source.display().to_string(),
                    reason: e.to_string(),
                },
            );
        }
    }
}

async fn persist_json<T: Serialize>(path: &Path, value: &T, warnings: &mut Vec<PipelineWarning>) {
    if let Err(e) = write_json(path, value).await {
        record(
            warnings,
            PipelineWarning::ArtifactWriteFailed {
                path: path.display().to_string(),
                reason: format!("{e:#}"),
            },
        );
    }
}

fn render_report(
    renderer: &dyn ReportRenderer,
    report: &EnrichedReport,
    path: &Path,
    warnings: &mut Vec<PipelineWarning>,
) {
    if let Err(e) = renderer.render(report, path) {
        record(
            warnings,
            PipelineWarning::RenderFailed {
                message: e.to_string(),
            },
        );
    }
}

/// Post-hoc contract check for providers that only guarantee well-formed JSON.
/// Unparseable text is left for the document parser to report.
fn check_contract(cleaned: &str, warnings: &mut Vec<PipelineWarning>) {
    let Ok(value) = serde_json::from_str::<Value>(cleaned) else {
        return;
    };
    let violations = posture_schema()
        .validate(&value)
        .into_iter()
        .chain(validate_ranges(&value));
    for v in violations {
        record(
            warnings,
            PipelineWarning::ContractViolation {
                path: v.path,
                message: v.message,
            },
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
