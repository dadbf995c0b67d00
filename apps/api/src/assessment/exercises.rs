//! Exercise Recommendation Engine: a fixed rule table over metric severities.
//!
//! Rules are evaluated in table order and each appends at most one exercise. When the
//! number collected reaches the awareness threshold, a general posture-awareness
//! exercise is appended last. Pure: no I/O, same document in, same list out.

use serde::Serialize;

use crate::assessment::contract::{BodyRegion, Section, FORWARD_HEAD_POSTURE};
use crate::assessment::models::{AssessmentDocument, Severity};

pub const DEFAULT_AWARENESS_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Exercise {
    #[serde(rename = "Name")]
    pub name: &'static str,
    #[serde(rename = "Description")]
    pub description: &'static str,
    #[serde(rename = "Frequency")]
    pub frequency: &'static str,
    #[serde(rename = "Purpose")]
    pub purpose: &'static str,
}

pub const CHIN_TUCKS: Exercise = Exercise {
    name: "Chin Tucks",
    description: "Gently retract chin backward (like making a double chin), hold for 5 seconds. Keep eyes level.",
    frequency: "3 sets of 10 reps, 2x daily",
    purpose: "Strengthens deep neck flexors and reduces forward head posture",
};

pub const THORACIC_EXTENSIONS: Exercise = Exercise {
    name: "Thoracic Extensions",
    description: "Place hands behind head, gently extend upper back over a foam roller or rolled towel. Hold 30 seconds.",
    frequency: "3-5 repetitions, 1-2x daily",
    purpose: "Improves thoracic spine mobility and reduces excessive kyphosis",
};

pub const SCAPULAR_RETRACTIONS: Exercise = Exercise {
    name: "Scapular Retractions",
    description: "Squeeze shoulder blades together as if holding a pencil between them. Hold for 5 seconds.",
    frequency: "3 sets of 15 reps, 2x daily",
    purpose: "Strengthens rhomboids and middle trapezius to improve shoulder posture",
};

pub const PELVIC_TILTS: Exercise = Exercise {
    name: "Pelvic Tilts",
    description: "Lie on back with knees bent. Flatten lower back against floor by tilting pelvis. Hold 5 seconds.",
    frequency: "3 sets of 12 reps, 1-2x daily",
    purpose: "Activates core muscles and normalizes lumbar curve",
};

pub const QUADRICEPS_STRENGTHENING: Exercise = Exercise {
    name: "Quadriceps Strengthening",
    description: "Seated leg extensions with slight knee bend. Focus on controlled movement without locking knees.",
    frequency: "3 sets of 10 reps, 3x weekly",
    purpose: "Improves knee control and reduces hyperextension tendency",
};

pub const POSTURAL_AWARENESS: Exercise = Exercise {
    name: "Postural Awareness Practice",
    description: "Stand against wall with heels, buttocks, shoulders, and head touching. Hold 30 seconds while breathing normally.",
    frequency: "2-3 times daily",
    purpose: "Develops kinesthetic awareness of optimal alignment",
};

/// One metric path, the severities that trigger it, and the exercise it adds.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub section: Section,
    pub metric: &'static str,
    pub triggers: &'static [Severity],
    pub exercise: Exercise,
}

const MODERATE_OR_WORSE: &[Severity] = &[Severity::Moderate, Severity::Severe];

/// Evaluated top to bottom.
pub const RULES: [Rule; 5] = [
    Rule {
        section: Section::GlobalAlignment,
        metric: FORWARD_HEAD_POSTURE,
        triggers: MODERATE_OR_WORSE,
        exercise: CHIN_TUCKS,
    },
    Rule {
        section: Section::Body(BodyRegion::Spine),
        metric: "thoracic_kyphosis",
        triggers: MODERATE_OR_WORSE,
        exercise: THORACIC_EXTENSIONS,
    },
    Rule {
        section: Section::Body(BodyRegion::Shoulders),
        metric: "shoulder_protraction",
        triggers: MODERATE_OR_WORSE,
        exercise: SCAPULAR_RETRACTIONS,
    },
    Rule {
        section: Section::Body(BodyRegion::Spine),
        metric: "lumbar_lordosis",
        triggers: MODERATE_OR_WORSE,
        exercise: PELVIC_TILTS,
    },
    Rule {
        section: Section::Body(BodyRegion::LowerExtremities),
        metric: "knee_hyperextension",
        triggers: &[Severity::Mild, Severity::Moderate],
        exercise: QUADRICEPS_STRENGTHENING,
    },
];

impl Rule {
    pub fn matches(&self, doc: &AssessmentDocument) -> bool {
        doc.metric(self.section, self.metric)
            .is_some_and(|m| self.triggers.contains(&m.severity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationConfig {
    /// Minimum number of rule-triggered exercises that adds the awareness exercise.
    /// `0` disables the aggregate rule.
    pub awareness_threshold: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            awareness_threshold: DEFAULT_AWARENESS_THRESHOLD,
        }
    }
}

pub fn recommend(doc: &AssessmentDocument, config: &RecommendationConfig) -> Vec<Exercise> {
    let mut exercises: Vec<Exercise> = RULES
        .iter()
        .filter(|rule| rule.matches(doc))
        .map(|rule| rule.exercise)
        .collect();

    if config.awareness_threshold > 0 && exercises.len() >= config.awareness_threshold {
        exercises.push(POSTURAL_AWARENESS);
    }
    exercises
}
