use crate::assessment::models::Severity;
use crate::assessment::normalize::RegionEntry;

pub const MAX_SCORE: u32 = 100;

/// Points subtracted per metric of the given severity.
pub fn penalty(severity: Severity) -> u32 {
    match severity {
        Severity::Severe => 15,
        Severity::Moderate => 10,
        Severity::Mild => 5,
        Severity::Normal | Severity::Unknown => 0,
    }
}

/// Posture score over the merged regions: 100 minus the summed penalties, floored at 0.
/// `findings` is not a metric and never contributes.
pub fn posture_score(regions: &[RegionEntry]) -> u32 {
    let total: u32 = regions
        .iter()
        .flat_map(|entry| entry.data.metrics.values())
        .map(|metric| penalty(metric.severity))
        .sum();
    MAX_SCORE.saturating_sub(total)
}
