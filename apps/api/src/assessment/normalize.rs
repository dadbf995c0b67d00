//! Response Normalizer & Merger.
//!
//! Raw provider text → cleaned JSON → `AssessmentDocument`, then the derived views the
//! report needs: the forward-head merge and the fixed six-entry `Regions` list.

use serde::Serialize;
use tracing::debug;

use crate::assessment::contract::{BodyRegion, FORWARD_HEAD_POSTURE};
use crate::assessment::models::{AssessmentDocument, RegionData};

/// Trims whitespace and strips one leading ```` ```json ```` (or bare ```` ``` ````) and
/// one trailing ```` ``` ````. Matching is exact and case-sensitive.
pub fn clean_response(raw: &str) -> &str {
    let text = raw.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Decodes cleaned provider text. The caller decides how to report a failure.
pub fn parse_document(cleaned: &str) -> Result<AssessmentDocument, serde_json::Error> {
    serde_json::from_str(cleaned)
}

/// Copies `global_alignment.forward_head_posture` into `head_neck` under the same key.
///
/// An existing `head_neck.forward_head_posture` is replaced, so the key never appears
/// twice and repeated merges are idempotent. No-op when either region is absent.
pub fn merge_forward_head_posture(doc: &mut AssessmentDocument) {
    let Some(metric) = doc
        .global_alignment
        .as_ref()
        .and_then(|ga| ga.metric(FORWARD_HEAD_POSTURE))
        .cloned()
    else {
        return;
    };
    if let Some(head_neck) = doc.head_neck.as_mut() {
        debug!("Merging global forward head posture into head & neck");
        head_neck.metrics.insert(FORWARD_HEAD_POSTURE.to_string(), metric);
    }
}

/// One entry of the report's `Regions` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionEntry {
    #[serde(rename = "Title")]
    pub title: &'static str,
    #[serde(rename = "Icon")]
    pub icon: &'static str,
    #[serde(rename = "Data")]
    pub data: RegionData,
}

/// Always six entries in canonical order. A region the provider omitted is empty.
pub fn assemble_regions(doc: &AssessmentDocument) -> Vec<RegionEntry> {
    BodyRegion::ALL
        .iter()
        .map(|region| RegionEntry {
            title: region.title(),
            icon: region.icon(),
            data: doc.region(*region).cloned().unwrap_or_default(),
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::contract::tests::conforming_response;
    use crate::assessment::models::{Metric, Severity};
    use serde_json::json;

    fn metric(severity: Severity) -> Metric {
        Metric {
            value: Some(1.0),
            unit: "cm".to_string(),
            severity,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_clean_response_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(clean_response(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_clean_response_without_tag() {
        let input = "  ```\n{\"key\": \"value\"}\n```\n";
        assert_eq!(clean_response(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_clean_response_plain() {
        assert_eq!(clean_response("  {\"key\": 1}  "), "{\"key\": 1}");
    }

    #[test]
    fn test_clean_response_is_case_sensitive() {
        let input = "```JSON\n{}\n```";
        assert_eq!(clean_response(input), "JSON\n{}");
    }

    #[test]
    fn test_fenced_and_bare_parse_identically() {
        let bare = conforming_response("mild").to_string();
        let fenced = format!("```json\n{bare}\n```");
        let a = parse_document(clean_response(&bare)).unwrap();
        let b = parse_document(clean_response(&fenced)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_document_rejects_non_json() {
        assert!(parse_document("I cannot analyze these images.").is_err());
    }

    #[test]
    fn test_merge_copies_forward_head_into_head_neck() {
        let mut doc = parse_document(&conforming_response("normal").to_string()).unwrap();
        doc.global_alignment
            .as_mut()
            .unwrap()
            .metrics
            .insert(FORWARD_HEAD_POSTURE.to_string(), metric(Severity::Severe));

        merge_forward_head_posture(&mut doc);

        let head_neck = doc.head_neck.as_ref().unwrap();
        assert_eq!(head_neck.metrics.len(), 4);
        assert_eq!(
            head_neck.metric(FORWARD_HEAD_POSTURE).unwrap().severity,
            Severity::Severe
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut once = parse_document(&conforming_response("moderate").to_string()).unwrap();
        merge_forward_head_posture(&mut once);
        let mut twice = once.clone();
        merge_forward_head_posture(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_replaces_existing_key() {
        let mut doc = AssessmentDocument {
            head_neck: Some(RegionData::default()),
            global_alignment: Some(RegionData::default()),
            ..Default::default()
        };
        doc.head_neck
            .as_mut()
            .unwrap()
            .metrics
            .insert(FORWARD_HEAD_POSTURE.to_string(), metric(Severity::Mild));
        doc.global_alignment
            .as_mut()
            .unwrap()
            .metrics
            .insert(FORWARD_HEAD_POSTURE.to_string(), metric(Severity::Moderate));

        merge_forward_head_posture(&mut doc);

        let head_neck = doc.head_neck.unwrap();
        assert_eq!(head_neck.metrics.len(), 1);
        assert_eq!(
            head_neck.metric(FORWARD_HEAD_POSTURE).unwrap().severity,
            Severity::Moderate
        );
    }

    #[test]
    fn test_merge_noop_when_either_side_missing() {
        let mut no_head = AssessmentDocument {
            global_alignment: Some(RegionData::default()),
            ..Default::default()
        };
        no_head
            .global_alignment
            .as_mut()
            .unwrap()
            .metrics
            .insert(FORWARD_HEAD_POSTURE.to_string(), metric(Severity::Severe));
        let before = no_head.clone();
        merge_forward_head_posture(&mut no_head);
        assert_eq!(no_head, before);

        let mut no_global = AssessmentDocument {
            head_neck: Some(RegionData::default()),
            ..Default::default()
        };
        merge_forward_head_posture(&mut no_global);
        assert!(no_global.head_neck.unwrap().metrics.is_empty());
    }

    #[test]
    fn test_assemble_regions_fills_missing_with_empty() {
        let doc: AssessmentDocument = serde_json::from_value(json!({
            "spine": {
                "findings": "Increased thoracic curve",
                "thoracic_kyphosis": {"value": 52.0, "unit": "degrees", "severity": "moderate", "confidence": 0.7}
            }
        }))
        .unwrap();

        let regions = assemble_regions(&doc);
        assert_eq!(regions.len(), 6);
        assert_eq!(regions[0].title, "Head & Neck");
        assert_eq!(regions[0].data, RegionData::default());
        assert_eq!(regions[2].title, "Spine");
        assert_eq!(regions[2].data.findings, "Increased thoracic curve");
        assert_eq!(regions[5].title, "Ankles & Feet");
    }

    #[test]
    fn test_region_entry_serializes_with_report_keys() {
        let regions = assemble_regions(&AssessmentDocument::default());
        let value = serde_json::to_value(&regions[1]).unwrap();
        assert_eq!(value["Title"], "Shoulders & Scapulae");
        assert!(value["Icon"].as_str().unwrap().starts_with('M'));
        assert_eq!(value["Data"]["findings"], "");
    }
}
