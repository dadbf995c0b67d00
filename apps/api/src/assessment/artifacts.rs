//! Per-run output directory and the flat files persisted into it.
//!
//! Layout of one run directory:
//! - `front|left|right|back.<ext>`: copies of the inputs under fixed view stems
//! - `metrics.json`: Measurement Set (hybrid path only)
//! - `interpretation.json`: raw provider text, verbatim
//! - `analysis.json`: enriched report
//! - `report.html`: rendered report

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use uuid::Uuid;

pub const METRICS_FILE: &str = "metrics.json";
pub const RAW_RESPONSE_FILE: &str = "interpretation.json";
pub const ANALYSIS_FILE: &str = "analysis.json";
pub const REPORT_FILE: &str = "report.html";

/// Extensions probed, in order, when locating a saved view image.
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".JPG", ".PNG"];

/// One of the four photographed body views, in attachment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Front,
    Left,
    Right,
    Back,
}

impl View {
    pub const ALL: [View; 4] = [View::Front, View::Left, View::Right, View::Back];

    /// File stem and `input_images` key.
    pub fn stem(self) -> &'static str {
        match self {
            View::Front => "front",
            View::Left => "left",
            View::Right => "right",
            View::Back => "back",
        }
    }

    /// Marker text placed before the image in a provider request.
    pub fn label(self) -> &'static str {
        match self {
            View::Front => "Front View",
            View::Left => "Left Side View",
            View::Right => "Right Side View",
            View::Back => "Back View",
        }
    }
}

/// Source paths of the four view images.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewPaths {
    pub front: PathBuf,
    pub left: PathBuf,
    pub right: PathBuf,
    pub back: PathBuf,
}

impl ViewPaths {
    pub fn get(&self, view: View) -> &Path {
        match view {
            View::Front => &self.front,
            View::Left => &self.left,
            View::Right => &self.right,
            View::Back => &self.back,
        }
    }

    /// `input_images`: view stem → `<stem><original extension>`, relative to the run directory.
    pub fn input_images(&self) -> BTreeMap<String, String> {
        View::ALL
            .iter()
            .map(|view| (view.stem().to_string(), stored_name(*view, self.get(*view))))
            .collect()
    }
}

/// `front.JPG` for `/some/where/IMG_001.JPG`. The extension keeps its original case.
pub fn stored_name(view: View, source: &Path) -> String {
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{ext}", view.stem()),
        None => view.stem().to_string(),
    }
}

/// Creates `<base>/<YYYY-MM-DD_HH-MM-SS>`, used by the command-line entry point.
pub fn create_run_dir(base: &Path) -> Result<PathBuf> {
    let dir = base.join(Local::now().format("%Y-%m-%d_%H-%M-%S").to_string());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

/// Timestamp plus a random suffix so concurrent uploads never share a directory.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        Local::now().format("%Y-%m-%d_%H-%M-%S"),
        &suffix[..8]
    )
}

/// Run identifiers and artifact names are single path components.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
}

/// Copies a view image into the run directory under its fixed stem.
pub async fn copy_view_image(view: View, source: &Path, run_dir: &Path) -> std::io::Result<PathBuf> {
    let dest = run_dir.join(stored_name(view, source));
    if dest != source {
        tokio::fs::copy(source, &dest).await?;
    }
    Ok(dest)
}

/// Pretty-printed JSON artifact.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Finds `<dir>/<stem><ext>` for the first extension that exists.
pub fn find_view_image(dir: &Path, view: View) -> Option<String> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| format!("{}{ext}", view.stem()))
        .find(|name| dir.join(name).is_file())
}

/// `input_images` reconstructed from whatever view images exist in `dir`.
pub fn discover_input_images(dir: &Path) -> BTreeMap<String, String> {
    View::ALL
        .iter()
        .filter_map(|view| find_view_image(dir, *view).map(|name| (view.stem().to_string(), name)))
        .collect()
}
