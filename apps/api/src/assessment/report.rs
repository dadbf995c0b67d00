//! Report Assembler: the fully enriched document handed to the renderer and saved as
//! `analysis.json`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::assessment::exercises::{recommend, Exercise, RecommendationConfig};
use crate::assessment::models::AssessmentDocument;
use crate::assessment::normalize::{assemble_regions, merge_forward_head_posture, RegionEntry};
use crate::assessment::scoring::posture_score;

/// The provider's document with the derived fields added alongside its own keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedReport {
    #[serde(flatten)]
    pub document: AssessmentDocument,
    #[serde(rename = "PostureScore")]
    pub posture_score: u32,
    #[serde(rename = "Regions")]
    pub regions: Vec<RegionEntry>,
    #[serde(rename = "Exercises")]
    pub exercises: Vec<Exercise>,
    pub input_images: BTreeMap<String, String>,
}

/// Merge, assemble, score and recommend, in that order.
pub fn enrich(
    mut document: AssessmentDocument,
    input_images: BTreeMap<String, String>,
    config: &RecommendationConfig,
) -> EnrichedReport {
    merge_forward_head_posture(&mut document);
    let regions = assemble_regions(&document);
    let posture_score = posture_score(&regions);
    let exercises = recommend(&document, config);

    EnrichedReport {
        document,
        posture_score,
        regions,
        exercises,
        input_images,
    }
}
