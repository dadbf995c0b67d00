//! Prompt Composer: turns prompt text, the four view images and (optionally) a
//! Measurement Set into one provider-neutral request.
//!
//! Attachment order is always front, left, right, back, each image preceded by its
//! `[Label]` marker. An unreadable image becomes a `[Label] - Image not found` text part
//! and a `PartialInput` warning; the request is still produced.

use std::path::Path;

use tracing::{debug, warn};

use crate::assessment::artifacts::{View, ViewPaths};
use crate::assessment::models::MeasurementSet;
use crate::assessment::pipeline::PipelineWarning;
use crate::assessment::prompts::{HYBRID_PROMPT_TEMPLATE, IMAGE_NOT_FOUND, IMAGE_PROMPT, METRICS_PLACEHOLDER};
use crate::errors::AppError;
use crate::llm_client::{ProviderRequest, RequestPart};

/// The two prompt texts in use for this process.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    image_only: String,
    hybrid: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            image_only: IMAGE_PROMPT.to_string(),
            hybrid: HYBRID_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Fails with `Configuration` if the hybrid template has no metrics placeholder.
    pub fn new(image_only: String, hybrid: String) -> Result<Self, AppError> {
        if !hybrid.contains(METRICS_PLACEHOLDER) {
            return Err(AppError::Configuration(format!(
                "hybrid prompt template must contain the {METRICS_PLACEHOLDER} placeholder"
            )));
        }
        Ok(Self { image_only, hybrid })
    }

    /// Embedded defaults, each replaced by the file's contents when a path is given.
    pub fn load(image_file: Option<&Path>, hybrid_file: Option<&Path>) -> Result<Self, AppError> {
        let image_only = match image_file {
            Some(path) => read_prompt_file(path)?,
            None => IMAGE_PROMPT.to_string(),
        };
        let hybrid = match hybrid_file {
            Some(path) => read_prompt_file(path)?,
            None => HYBRID_PROMPT_TEMPLATE.to_string(),
        };
        Self::new(image_only, hybrid)
    }

    /// Prompt text for this run: the hybrid template with measurements substituted once,
    /// or the image-only prompt when there are no measurements.
    pub fn render(&self, measurements: Option<&MeasurementSet>) -> Result<String, AppError> {
        match measurements {
            None => Ok(self.image_only.clone()),
            Some(set) => {
                let json = serde_json::to_string_pretty(set)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("serializing measurements: {e}")))?;
                Ok(self.hybrid.replacen(METRICS_PLACEHOLDER, &json, 1))
            }
        }
    }
}

fn read_prompt_file(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|e| {
        AppError::Configuration(format!("cannot read prompt file {}: {e}", path.display()))
    })
}

/// A composed request plus the views that had to be substituted.
#[derive(Debug)]
pub struct ComposedPrompt {
    pub request: ProviderRequest,
    pub warnings: Vec<PipelineWarning>,
}

/// MIME type from the file extension: png, webp, or jpeg for anything else.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

pub async fn compose(
    templates: &PromptTemplates,
    images: &ViewPaths,
    measurements: Option<&MeasurementSet>,
) -> Result<ComposedPrompt, AppError> {
    let mut parts = vec![RequestPart::Text(templates.render(measurements)?)];
    let mut warnings = Vec::new();

    for view in View::ALL {
        let path = images.get(view);
        match tokio::fs::read(path).await {
            Ok(data) => {
                debug!("Attaching {} ({} bytes)", view.label(), data.len());
                parts.push(RequestPart::Text(format!("[{}]", view.label())));
                parts.push(RequestPart::Image {
                    mime_type: mime_type_for(path).to_string(),
                    data: data.into(),
                });
            }
            Err(e) => {
                warn!("{} unavailable at {}: {}", view.label(), path.display(), e);
                parts.push(RequestPart::Text(format!("[{}] - {IMAGE_NOT_FOUND}", view.label())));
                warnings.push(PipelineWarning::PartialInput {
                    view,
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(ComposedPrompt {
        request: ProviderRequest { parts },
        warnings,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::models::MeasuredMetric;
    use std::path::PathBuf;

    fn texts(request: &ProviderRequest) -> Vec<String> {
        request
            .parts
            .iter()
            .filter_map(|p| match p {
                RequestPart::Text(t) => Some(t.clone()),
                RequestPart::Image { .. } => None,
            })
            .collect()
    }

    fn views_in(dir: &Path) -> ViewPaths {
        ViewPaths {
            front: dir.join("front.jpg"),
            left: dir.join("left.png"),
            right: dir.join("right.webp"),
            back: dir.join("back.jpg"),
        }
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for(Path::new("a/front.PNG")), "image/png");
        assert_eq!(mime_type_for(Path::new("left.webp")), "image/webp");
        assert_eq!(mime_type_for(Path::new("back.jpeg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn test_hybrid_template_without_placeholder_is_configuration_error() {
        let result = PromptTemplates::new("image".to_string(), "no placeholder here".to_string());
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_load_missing_prompt_file_is_configuration_error() {
        let result = PromptTemplates::load(Some(Path::new("/no/such/prompt.txt")), None);
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_render_substitutes_placeholder_once() {
        let templates = PromptTemplates::new(
            "image".to_string(),
            "A {METRICS_JSON} B {METRICS_JSON}".to_string(),
        )
        .unwrap();
        let set = MeasurementSet {
            thoracic_kyphosis: Some(MeasuredMetric {
                value: 47.0,
                unit: "degrees".to_string(),
                confidence: 0.8,
                severity: None,
            }),
            ..Default::default()
        };
        let rendered = templates.render(Some(&set)).unwrap();
        assert!(rendered.starts_with("A {\n  \"thoracic_kyphosis\""));
        assert!(rendered.ends_with("B {METRICS_JSON}"));
        assert_eq!(templates.render(None).unwrap(), "image");
    }

    #[tokio::test]
    async fn test_compose_attaches_images_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        let views = views_in(dir.path());
        for view in View::ALL {
            std::fs::write(views.get(view), view.stem()).unwrap();
        }

        let composed = compose(&PromptTemplates::default(), &views, None).await.unwrap();
        assert!(composed.warnings.is_empty());
        assert_eq!(composed.request.image_count(), 4);
        assert_eq!(composed.request.parts.len(), 9);

        let labels: Vec<_> = texts(&composed.request).into_iter().skip(1).collect();
        assert_eq!(
            labels,
            vec!["[Front View]", "[Left Side View]", "[Right Side View]", "[Back View]"]
        );
        match &composed.request.parts[4] {
            RequestPart::Image { mime_type, data } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data.as_ref(), b"left");
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_compose_substitutes_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let views = views_in(dir.path());
        std::fs::write(&views.front, b"f").unwrap();
        std::fs::write(&views.left, b"l").unwrap();
        std::fs::write(&views.right, b"r").unwrap();

        let composed = compose(&PromptTemplates::default(), &views, None).await.unwrap();
        assert_eq!(composed.request.image_count(), 3);
        assert_eq!(
            texts(&composed.request).last().unwrap(),
            "[Back View] - Image not found"
        );
        assert_eq!(composed.warnings.len(), 1);
        match &composed.warnings[0] {
            PipelineWarning::PartialInput { view, path, .. } => {
                assert_eq!(*view, View::Back);
                assert!(path.ends_with("back.jpg"));
            }
            other => panic!("unexpected warning: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_compose_with_no_images_still_builds_request() {
        let views = views_in(&PathBuf::from("/no/such/dir"));
        let composed = compose(&PromptTemplates::default(), &views, Some(&MeasurementSet::default()))
            .await
            .unwrap();
        assert_eq!(composed.request.image_count(), 0);
        assert_eq!(composed.warnings.len(), 4);
        assert!(texts(&composed.request)[0].contains("MEASURED DATA"));
    }
}
