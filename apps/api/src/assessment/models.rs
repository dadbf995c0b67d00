//! Assessment Document: the strongly-typed result of one posture analysis run.
//!
//! The provider's JSON is validated once, here, at the parse boundary. Regions and
//! top-level blocks are optional so a partially-populated response still yields a
//! document; the leaves of a `Metric` are strict (a missing `severity` is a parse error).
//! Display-only leaves (narratives, view flags, inference lists, annotations) fall back
//! to empty values so they never cost the run its score.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::assessment::contract::{BodyRegion, Section};

// ────────────────────────────────────────────────────────────────────────────
// Metric
// ────────────────────────────────────────────────────────────────────────────

/// Closed severity scale. Anything outside these five values fails deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
    Severe,
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Normal,
        Severity::Mild,
        Severity::Moderate,
        Severity::Severe,
        Severity::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Unknown => "unknown",
        }
    }
}

/// One measured or inferred postural quantity.
///
/// `value` must be present in the JSON but may be `null` when measurement was impossible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(deserialize_with = "required_nullable")]
    pub value: Option<f64>,
    pub unit: String,
    pub severity: Severity,
    pub confidence: f64,
}

/// Deserializes a key that must exist but may hold `null`.
/// Using `deserialize_with` disables serde's implicit `None` for missing `Option` fields.
fn required_nullable<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)
}

// ────────────────────────────────────────────────────────────────────────────
// Regions
// ────────────────────────────────────────────────────────────────────────────

/// Metrics of one anatomical region keyed by metric name, plus the findings narrative.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionData {
    pub findings: String,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Metric>,
}

impl RegionData {
    pub fn metric(&self, key: &str) -> Option<&Metric> {
        self.metrics.get(key)
    }
}

/// `findings` is optional text. Object-valued keys must be well-formed metrics; other
/// extra keys (stray notes, numbers) are not metrics and are skipped.
impl<'de> Deserialize<'de> for RegionData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut region = RegionData::default();
        for (key, value) in raw {
            if key == "findings" {
                if let Value::String(text) = value {
                    region.findings = text;
                }
                continue;
            }
            if !value.is_object() {
                continue;
            }
            let metric = Metric::deserialize(value)
                .map_err(|e| D::Error::custom(format!("{key}: {e}")))?;
            region.metrics.insert(key, metric);
        }
        Ok(region)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectedViews {
    pub front_detected: bool,
    pub left_detected: bool,
    pub right_detected: bool,
    pub back_detected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuscleImbalances {
    pub likely_tight: Vec<String>,
    pub likely_weak: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalInference {
    pub muscle_imbalances: MuscleImbalances,
    pub compensation_chain: String,
    pub priority_areas: Vec<String>,
    pub clinical_implications: String,
}

/// Annotations only mark notable findings, so the scale stops at moderate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSeverity {
    Moderate,
    Severe,
}

/// A labelled landmark drawn over one of the input photographs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub landmark: String,
    /// 0–100, relative to image width.
    pub x_percent: f64,
    /// 0–100, relative to image height.
    pub y_percent: f64,
    pub finding: String,
    pub severity: AnnotationSeverity,
}

// ────────────────────────────────────────────────────────────────────────────
// Assessment Document
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_views: Option<DetectedViews>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_reasoning: Option<String>,
    #[serde(default)]
    pub head_neck: Option<RegionData>,
    #[serde(default)]
    pub shoulders: Option<RegionData>,
    #[serde(default)]
    pub spine: Option<RegionData>,
    #[serde(default)]
    pub pelvis: Option<RegionData>,
    #[serde(default)]
    pub lower_extremities: Option<RegionData>,
    #[serde(default)]
    pub ankles_feet: Option<RegionData>,
    #[serde(default)]
    pub global_alignment: Option<RegionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_inference: Option<ClinicalInference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_quality_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_view_provided: Option<bool>,
    #[serde(default, deserialize_with = "valid_annotations")]
    pub annotations: Vec<Annotation>,
}

/// Keeps the annotations that match the contract and drops the rest.
fn valid_annotations<'de, D>(deserializer: D) -> Result<Vec<Annotation>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

impl AssessmentDocument {
    pub fn region(&self, region: BodyRegion) -> Option<&RegionData> {
        match region {
            BodyRegion::HeadNeck => self.head_neck.as_ref(),
            BodyRegion::Shoulders => self.shoulders.as_ref(),
            BodyRegion::Spine => self.spine.as_ref(),
            BodyRegion::Pelvis => self.pelvis.as_ref(),
            BodyRegion::LowerExtremities => self.lower_extremities.as_ref(),
            BodyRegion::AnklesFeet => self.ankles_feet.as_ref(),
        }
    }

    pub fn section(&self, section: Section) -> Option<&RegionData> {
        match section {
            Section::Body(region) => self.region(region),
            Section::GlobalAlignment => self.global_alignment.as_ref(),
        }
    }

    /// Looks up `section.metric`; absence at either level is `None`, never an error.
    pub fn metric(&self, section: Section, key: &str) -> Option<&Metric> {
        self.section(section).and_then(|data| data.metric(key))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Measurement Set (hybrid path)
// ────────────────────────────────────────────────────────────────────────────

/// A geometric measurement from the landmark extractor.
/// The extractor does not grade its output, so `severity` is optional here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredMetric {
    pub value: f64,
    pub unit: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Deterministic measurements for one run. Created once, never mutated, persisted verbatim.
/// A metric the extractor could not compute is simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craniovertebral_angle: Option<MeasuredMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_head_posture: Option<MeasuredMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoulder_height_delta: Option<MeasuredMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoracic_kyphosis: Option<MeasuredMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knee_valgus_varus: Option<MeasuredMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foot_progression_angle: Option<MeasuredMetric>,
}

impl MeasurementSet {
    /// Present measurements in a stable order, for logging.
    pub fn entries(&self) -> Vec<(&'static str, &MeasuredMetric)> {
        [
            ("craniovertebral_angle", &self.craniovertebral_angle),
            ("forward_head_posture", &self.forward_head_posture),
            ("shoulder_height_delta", &self.shoulder_height_delta),
            ("thoracic_kyphosis", &self.thoracic_kyphosis),
            ("knee_valgus_varus", &self.knee_valgus_varus),
            ("foot_progression_angle", &self.foot_progression_angle),
        ]
        .into_iter()
        .filter_map(|(name, metric)| metric.as_ref().map(|m| (name, m)))
        .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_allows_null_value() {
        let metric: Metric = serde_json::from_value(json!({
            "value": null, "unit": "degrees", "severity": "unknown", "confidence": 0.2
        }))
        .unwrap();
        assert!(metric.value.is_none());
        assert_eq!(metric.severity, Severity::Unknown);
    }

    #[test]
    fn test_metric_requires_value_key() {
        let result: Result<Metric, _> = serde_json::from_value(json!({
            "unit": "degrees", "severity": "normal", "confidence": 0.9
        }));
        assert!(result.is_err(), "missing value key must be rejected");
    }

    #[test]
    fn test_metric_requires_severity() {
        let result: Result<Metric, _> = serde_json::from_value(json!({
            "value": 48.0, "unit": "degrees", "confidence": 0.9
        }));
        assert!(result.is_err(), "absent severity is an error, not implicit unknown");
    }

    #[test]
    fn test_severity_rejects_values_outside_enum() {
        let result: Result<Severity, _> = serde_json::from_str(r#""critical""#);
        assert!(result.is_err());
        let result: Result<Severity, _> = serde_json::from_str(r#""Severe""#);
        assert!(result.is_err(), "severity matching is case-sensitive");
    }

    #[test]
    fn test_region_data_splits_findings_from_metrics() {
        let region: RegionData = serde_json::from_value(json!({
            "findings": "Mild anterior head carriage",
            "craniovertebral_angle": {"value": 47.5, "unit": "degrees", "severity": "mild", "confidence": 0.8},
            "head_rotation": {"value": null, "unit": "degrees", "severity": "normal", "confidence": 0.6}
        }))
        .unwrap();
        assert_eq!(region.findings, "Mild anterior head carriage");
        assert_eq!(region.metrics.len(), 2);
        assert_eq!(
            region.metric("craniovertebral_angle").unwrap().severity,
            Severity::Mild
        );
    }

    #[test]
    fn test_annotation_severity_is_restricted() {
        let result: Result<Annotation, _> = serde_json::from_value(json!({
            "landmark": "left knee", "x_percent": 40.0, "y_percent": 70.0,
            "finding": "valgus", "severity": "mild"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_region_data_skips_non_metric_keys() {
        let region: RegionData = serde_json::from_value(json!({
            "notes": "extra narrative",
            "thoracic_kyphosis": {"value": 52.0, "unit": "degrees", "severity": "severe", "confidence": 0.7}
        }))
        .unwrap();
        assert_eq!(region.findings, "");
        assert_eq!(region.metrics.len(), 1);
        assert_eq!(region.metric("thoracic_kyphosis").unwrap().severity, Severity::Severe);
    }

    #[test]
    fn test_region_data_rejects_metric_without_severity() {
        let result: Result<RegionData, _> = serde_json::from_value(json!({
            "findings": "x",
            "thoracic_kyphosis": {"value": 52.0, "unit": "degrees", "confidence": 0.7}
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("thoracic_kyphosis"), "{err}");
    }

    #[test]
    fn test_display_blocks_fill_missing_leaves() {
        let doc: AssessmentDocument = serde_json::from_value(json!({
            "detected_views": {"front_detected": true},
            "clinical_inference": {"compensation_chain": "Upper crossed pattern"}
        }))
        .unwrap();
        let views = doc.detected_views.unwrap();
        assert!(views.front_detected);
        assert!(!views.back_detected);
        let inference = doc.clinical_inference.unwrap();
        assert!(inference.priority_areas.is_empty());
        assert!(inference.muscle_imbalances.likely_tight.is_empty());
    }

    #[test]
    fn test_invalid_annotations_are_dropped() {
        let doc: AssessmentDocument = serde_json::from_value(json!({
            "annotations": [
                {"landmark": "C7", "x_percent": 50.0, "y_percent": 20.0, "finding": "forward head", "severity": "mild"},
                {"landmark": "T8", "x_percent": 48.0, "y_percent": 40.0, "finding": "kyphosis", "severity": "severe"},
                "not an annotation"
            ]
        }))
        .unwrap();
        assert_eq!(doc.annotations.len(), 1);
        assert_eq!(doc.annotations[0].landmark, "T8");

        let doc: AssessmentDocument = serde_json::from_value(json!({"annotations": null})).unwrap();
        assert!(doc.annotations.is_empty());
    }

    #[test]
    fn test_document_tolerates_absent_regions() {
        let doc: AssessmentDocument = serde_json::from_value(json!({
            "spine": {"findings": "ok"}
        }))
        .unwrap();
        assert!(doc.head_neck.is_none());
        assert!(doc.region(BodyRegion::Spine).is_some());
        assert!(doc.annotations.is_empty());
        assert!(doc
            .metric(Section::GlobalAlignment, "forward_head_posture")
            .is_none());
    }

    #[test]
    fn test_measurement_set_skips_absent_metrics() {
        let set: MeasurementSet = serde_json::from_value(json!({
            "forward_head_posture": {"value": 32.4, "unit": "mm", "confidence": 0.91}
        }))
        .unwrap();
        assert_eq!(set.entries().len(), 1);
        let out = serde_json::to_value(&set).unwrap();
        assert_eq!(out, json!({"forward_head_posture": {"value": 32.4, "unit": "mm", "confidence": 0.91}}));
    }
}
