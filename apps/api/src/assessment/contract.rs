//! Structured-Output Contract: the exact response shape every vision provider must return.
//!
//! The contract is a single schema tree that can be enforced two ways:
//! - **generation-time**: rendered with [`SchemaNode::to_gemini`] and sent with the request
//! - **post-validation**: rendered with [`SchemaNode::to_json_schema`] as an instruction, and
//!   the returned JSON checked with [`SchemaNode::validate`]
//!
//! Region membership and metric keys are fixed here, not discovered from the response.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::assessment::models::Severity;

// ────────────────────────────────────────────────────────────────────────────
// Regions
// ────────────────────────────────────────────────────────────────────────────

/// The six anatomical regions, in canonical report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BodyRegion {
    HeadNeck,
    Shoulders,
    Spine,
    Pelvis,
    LowerExtremities,
    AnklesFeet,
}

impl BodyRegion {
    pub const ALL: [BodyRegion; 6] = [
        BodyRegion::HeadNeck,
        BodyRegion::Shoulders,
        BodyRegion::Spine,
        BodyRegion::Pelvis,
        BodyRegion::LowerExtremities,
        BodyRegion::AnklesFeet,
    ];

    /// JSON key in the Assessment Document.
    pub fn key(self) -> &'static str {
        match self {
            BodyRegion::HeadNeck => "head_neck",
            BodyRegion::Shoulders => "shoulders",
            BodyRegion::Spine => "spine",
            BodyRegion::Pelvis => "pelvis",
            BodyRegion::LowerExtremities => "lower_extremities",
            BodyRegion::AnklesFeet => "ankles_feet",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            BodyRegion::HeadNeck => "Head & Neck",
            BodyRegion::Shoulders => "Shoulders & Scapulae",
            BodyRegion::Spine => "Spine",
            BodyRegion::Pelvis => "Pelvis & Hips",
            BodyRegion::LowerExtremities => "Lower Extremities",
            BodyRegion::AnklesFeet => "Ankles & Feet",
        }
    }

    /// SVG path data for the report's region icon.
    pub fn icon(self) -> &'static str {
        match self {
            BodyRegion::HeadNeck => "M16 7a4 4 0 11-8 0 4 4 0 018 0zM12 14a7 7 0 00-7 7h14a7 7 0 00-7-7z",
            BodyRegion::Shoulders => "M19 11H5m14 0a2 2 0 012 2v6a2 2 0 01-2 2H5a2 2 0 01-2-2v-6a2 2 0 012-2m14 0V9a2 2 0 00-2-2M5 11V9a2 2 0 012-2m0 0V5a2 2 0 012-2h6a2 2 0 012 2v2M7 7h10",
            BodyRegion::Spine => "M4 6h16M4 10h16M4 14h16M4 18h16",
            BodyRegion::Pelvis => "M12 6V4m0 2a2 2 0 100 4m0-4a2 2 0 110 4m-6 8a2 2 0 100-4m0 4a2 2 0 110-4m0 4v2m0-6V4m6 6v10m6-2a2 2 0 100-4m0 4a2 2 0 110-4m0 4v2m0-6V4",
            BodyRegion::LowerExtremities => "M13.828 10.172a4 4 0 00-5.656 0l-4 4a4 4 0 105.656 5.656l1.102-1.101m-.758-4.899a4 4 0 005.656 0l4-4a4 4 0 00-5.656-5.656l-1.1 1.1",
            BodyRegion::AnklesFeet => "M3.055 11H5a2 2 0 012 2v1a2 2 0 002 2 2 2 0 012 2v2.945M8 3.935V5.5A2.5 2.5 0 0010.5 8h.5a2 2 0 012 2 2 2 0 104 0 2 2 0 012-2h1.064M15 20.488V18a2 2 0 012-2h3.064",
        }
    }

    pub fn metric_keys(self) -> &'static [&'static str] {
        match self {
            BodyRegion::HeadNeck => &["craniovertebral_angle", "lateral_head_tilt", "head_rotation"],
            BodyRegion::Shoulders => &["shoulder_height_delta", "shoulder_protraction", "scapular_winging"],
            BodyRegion::Spine => &["thoracic_kyphosis", "lumbar_lordosis", "lateral_deviation"],
            BodyRegion::Pelvis => &["pelvic_tilt", "pelvic_obliquity", "pelvic_rotation"],
            BodyRegion::LowerExtremities => &["knee_valgus_varus", "knee_hyperextension", "q_angle"],
            BodyRegion::AnklesFeet => &["foot_progression_angle", "ankle_pronation", "arch_height"],
        }
    }
}

pub const GLOBAL_ALIGNMENT_KEY: &str = "global_alignment";
pub const GLOBAL_ALIGNMENT_METRICS: &[&str] = &["plumb_line_deviation", "forward_head_posture"];
pub const FORWARD_HEAD_POSTURE: &str = "forward_head_posture";

/// Any metric-bearing block of the document: one of the six regions or global alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Body(BodyRegion),
    GlobalAlignment,
}

// ────────────────────────────────────────────────────────────────────────────
// Schema tree
// ────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic schema node. Property order is preserved for deterministic rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object {
        properties: Vec<(&'static str, SchemaNode)>,
        required: Vec<&'static str>,
    },
    Array(Box<SchemaNode>),
    String {
        allowed: Option<Vec<&'static str>>,
    },
    Number {
        nullable: bool,
    },
    Boolean,
}

/// A single way the returned JSON departs from the contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractViolation {
    /// Dotted path, e.g. `spine.thoracic_kyphosis.severity` or `annotations[2].severity`.
    pub path: String,
    pub message: String,
}

fn object(properties: Vec<(&'static str, SchemaNode)>) -> SchemaNode {
    let required = properties.iter().map(|(name, _)| *name).collect();
    SchemaNode::Object {
        properties,
        required,
    }
}

fn string() -> SchemaNode {
    SchemaNode::String { allowed: None }
}

fn string_enum(values: &[&'static str]) -> SchemaNode {
    SchemaNode::String {
        allowed: Some(values.to_vec()),
    }
}

fn number() -> SchemaNode {
    SchemaNode::Number { nullable: false }
}

fn string_array() -> SchemaNode {
    SchemaNode::Array(Box::new(string()))
}

fn metric_schema() -> SchemaNode {
    let severities: Vec<&'static str> = Severity::ALL.iter().map(|s| s.as_str()).collect();
    object(vec![
        ("value", SchemaNode::Number { nullable: true }),
        ("unit", string()),
        ("severity", string_enum(&severities)),
        ("confidence", number()),
    ])
}

fn region_schema(metrics: &[&'static str]) -> SchemaNode {
    let mut properties = vec![("findings", string())];
    properties.extend(metrics.iter().map(|m| (*m, metric_schema())));
    object(properties)
}

/// The full posture-assessment response contract. Every declared property is required.
pub fn posture_schema() -> SchemaNode {
    let mut properties = vec![
        (
            "detected_views",
            object(vec![
                ("front_detected", SchemaNode::Boolean),
                ("right_detected", SchemaNode::Boolean),
                ("left_detected", SchemaNode::Boolean),
                ("back_detected", SchemaNode::Boolean),
            ]),
        ),
        ("clinical_reasoning", string()),
    ];

    for region in BodyRegion::ALL {
        properties.push((region.key(), region_schema(region.metric_keys())));
    }
    properties.push((GLOBAL_ALIGNMENT_KEY, region_schema(GLOBAL_ALIGNMENT_METRICS)));

    properties.extend([
        (
            "clinical_inference",
            object(vec![
                (
                    "muscle_imbalances",
                    object(vec![
                        ("likely_tight", string_array()),
                        ("likely_weak", string_array()),
                    ]),
                ),
                ("compensation_chain", string()),
                ("priority_areas", string_array()),
                ("clinical_implications", string()),
            ]),
        ),
        ("image_quality_notes", string()),
        ("overall_confidence", number()),
        ("back_view_provided", SchemaNode::Boolean),
        (
            "annotations",
            SchemaNode::Array(Box::new(object(vec![
                ("landmark", string()),
                ("x_percent", number()),
                ("y_percent", number()),
                ("finding", string()),
                ("severity", string_enum(&["moderate", "severe"])),
            ]))),
        ),
    ]);

    object(properties)
}

impl SchemaNode {
    /// Renders the OpenAPI-subset dialect accepted as a Gemini `responseSchema`.
    pub fn to_gemini(&self) -> Value {
        match self {
            SchemaNode::Object {
                properties,
                required,
            } => {
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(name, node)| (name.to_string(), node.to_gemini()))
                    .collect();
                json!({
                    "type": "OBJECT",
                    "properties": props,
                    "required": required,
                    "propertyOrdering": properties.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
                })
            }
            SchemaNode::Array(items) => json!({"type": "ARRAY", "items": items.to_gemini()}),
            SchemaNode::String { allowed: None } => json!({"type": "STRING"}),
            SchemaNode::String {
                allowed: Some(values),
            } => json!({"type": "STRING", "format": "enum", "enum": values}),
            SchemaNode::Number { nullable } => {
                if *nullable {
                    json!({"type": "NUMBER", "nullable": true})
                } else {
                    json!({"type": "NUMBER"})
                }
            }
            SchemaNode::Boolean => json!({"type": "BOOLEAN"}),
        }
    }

    /// Renders standard JSON Schema, used as an explicit instruction for providers
    /// that only guarantee syntactically valid JSON.
    pub fn to_json_schema(&self) -> Value {
        match self {
            SchemaNode::Object {
                properties,
                required,
            } => {
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(name, node)| (name.to_string(), node.to_json_schema()))
                    .collect();
                json!({
                    "type": "object",
                    "properties": props,
                    "required": required,
                    "additionalProperties": false,
                })
            }
            SchemaNode::Array(items) => json!({"type": "array", "items": items.to_json_schema()}),
            SchemaNode::String { allowed: None } => json!({"type": "string"}),
            SchemaNode::String {
                allowed: Some(values),
            } => json!({"type": "string", "enum": values}),
            SchemaNode::Number { nullable } => {
                if *nullable {
                    json!({"type": ["number", "null"]})
                } else {
                    json!({"type": "number"})
                }
            }
            SchemaNode::Boolean => json!({"type": "boolean"}),
        }
    }

    /// Checks `value` against this node and returns every violation found.
    /// Extra properties are tolerated; missing required ones are not.
    pub fn validate(&self, value: &Value) -> Vec<ContractViolation> {
        let mut violations = Vec::new();
        self.validate_at("", value, &mut violations);
        violations
    }

    fn validate_at(&self, path: &str, value: &Value, out: &mut Vec<ContractViolation>) {
        match self {
            SchemaNode::Object {
                properties,
                required,
            } => {
                let Some(map) = value.as_object() else {
                    fail(out, path, format!("expected object, found {}", kind_of(value)));
                    return;
                };
                for name in required {
                    if !map.contains_key(*name) {
                        out.push(ContractViolation {
                            path: join(path, name),
                            message: "required field is missing".to_string(),
                        });
                    }
                }
                for (name, node) in properties {
                    if let Some(child) = map.get(*name) {
                        node.validate_at(&join(path, name), child, out);
                    }
                }
            }
            SchemaNode::Array(items) => {
                let Some(elements) = value.as_array() else {
                    fail(out, path, format!("expected array, found {}", kind_of(value)));
                    return;
                };
                for (i, element) in elements.iter().enumerate() {
                    items.validate_at(&format!("{path}[{i}]"), element, out);
                }
            }
            SchemaNode::String { allowed } => match value.as_str() {
                None => fail(out, path, format!("expected string, found {}", kind_of(value))),
                Some(s) => {
                    if let Some(allowed) = allowed {
                        if !allowed.iter().any(|a| *a == s) {
                            fail(out, path, format!("'{s}' is not one of {}", allowed.join("|")));
                        }
                    }
                }
            },
            SchemaNode::Number { nullable } => {
                if value.is_null() && !nullable {
                    fail(out, path, "expected number, found null".to_string());
                } else if !value.is_null() && !value.is_number() {
                    fail(out, path, format!("expected number, found {}", kind_of(value)));
                }
            }
            SchemaNode::Boolean => {
                if !value.is_boolean() {
                    fail(out, path, format!("expected boolean, found {}", kind_of(value)));
                }
            }
        }
    }
}

/// Contract-level checks that the schema dialects cannot express:
/// metric confidences and the overall confidence must fall in [0, 1].
pub fn validate_ranges(value: &Value) -> Vec<ContractViolation> {
    let mut violations = Vec::new();

    let sections = BodyRegion::ALL
        .iter()
        .map(|r| r.key())
        .chain(std::iter::once(GLOBAL_ALIGNMENT_KEY));

    for section in sections {
        let Some(region) = value.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (key, metric) in region {
            if let Some(confidence) = metric.get("confidence").and_then(Value::as_f64) {
                if !(0.0..=1.0).contains(&confidence) {
                    violations.push(ContractViolation {
                        path: format!("{section}.{key}.confidence"),
                        message: format!("{confidence} is outside [0, 1]"),
                    });
                }
            }
        }
    }

    if let Some(overall) = value.get("overall_confidence").and_then(Value::as_f64) {
        if !(0.0..=1.0).contains(&overall) {
            violations.push(ContractViolation {
                path: "overall_confidence".to_string(),
                message: format!("{overall} is outside [0, 1]"),
            });
        }
    }

    violations
}

fn fail(out: &mut Vec<ContractViolation>, path: &str, message: String) {
    let path = if path.is_empty() { "$" } else { path };
    out.push(ContractViolation {
        path: path.to_string(),
        message,
    });
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
