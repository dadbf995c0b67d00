//! Measurement Adapter: runs the external landmark extractor and reads its Measurement Set.
//!
//! The extractor prints diagnostic lines before its JSON payload on the same stream.
//! Everything before the first line that opens a JSON object is discarded.
//!
//! The adapter never retries or varies parameters between attempts: identical images and
//! height must produce identical measurements, and that guarantee belongs to the extractor.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::assessment::artifacts::ViewPaths;
use crate::assessment::models::MeasurementSet;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("could not start extractor '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extractor exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("extractor produced no JSON object on stdout")]
    NoJson,

    #[error("extractor JSON could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Narrow capability: four view images (plus optional height) in, Measurement Set out.
/// Swappable so the pipeline does not depend on the concrete tool.
#[async_trait]
pub trait LandmarkExtractor: Send + Sync {
    async fn extract(
        &self,
        images: &ViewPaths,
        height_cm: Option<f64>,
        output_dir: &Path,
    ) -> Result<MeasurementSet, ExtractionError>;
}

/// The extractor's stdout payload. `landmarks` and `calibration` are ignored.
#[derive(Debug, Deserialize)]
struct ExtractorOutput {
    metrics: MeasurementSet,
}

/// Returns the JSON suffix of `output`: everything from the first line that starts with `{`.
pub fn json_suffix(output: &str) -> Option<&str> {
    let mut offset = 0;
    for line in output.split_inclusive('\n') {
        if line.starts_with('{') {
            return Some(&output[offset..]);
        }
        offset += line.len();
    }
    None
}

/// Parses raw extractor stdout into a Measurement Set.
pub fn parse_extractor_output(stdout: &str) -> Result<MeasurementSet, ExtractionError> {
    let json = json_suffix(stdout).ok_or(ExtractionError::NoJson)?;
    let parsed: ExtractorOutput = serde_json::from_str(json)?;
    Ok(parsed.metrics)
}

/// Invokes the extractor as `program [script] front left right back [height] output_dir`.
#[derive(Debug, Clone)]
pub struct ProcessExtractor {
    pub program: String,
    /// Leading arguments placed before the positional ones (e.g. the script path).
    pub leading_args: Vec<String>,
}

impl ProcessExtractor {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Builds the positional argument list. Height is only passed when it is positive.
    pub fn arguments(&self, images: &ViewPaths, height_cm: Option<f64>, output_dir: &Path) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend(
            [&images.front, &images.left, &images.right, &images.back]
                .iter()
                .map(|p| p.display().to_string()),
        );
        if let Some(height) = height_cm.filter(|h| *h > 0.0) {
            args.push(format!("{height:.1}"));
        }
        args.push(output_dir.display().to_string());
        args
    }
}

#[async_trait]
impl LandmarkExtractor for ProcessExtractor {
    async fn extract(
        &self,
        images: &ViewPaths,
        height_cm: Option<f64>,
        output_dir: &Path,
    ) -> Result<MeasurementSet, ExtractionError> {
        let args = self.arguments(images, height_cm, output_dir);
        info!("Running landmark extractor: {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtractionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Extractor stderr:\n{}", stderr.trim_end());
        }

        if !output.status.success() {
            return Err(ExtractionError::NonZeroExit {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        let metrics = parse_extractor_output(&stdout)?;
        info!("Extractor returned {} measurement(s)", metrics.entries().len());
        Ok(metrics)
    }
}

/// Resolves the extractor interpreter: a project venv if present, else `python3` on PATH.
pub fn default_program() -> String {
    let venv = PathBuf::from("./venv/bin/python3");
    if venv.exists() {
        venv.display().to_string()
    } else {
        "python3".to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
