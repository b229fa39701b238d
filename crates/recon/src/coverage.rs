use std::collections::HashSet;

use smallarea_core::{JoinKey, UnitTable};

use crate::model::{CoverageQuality, CoverageReport};

pub const PASS_THRESHOLD: f64 = 95.0;
pub const REVIEW_THRESHOLD: f64 = 90.0;
const UNMATCHED_SAMPLE: usize = 10;

pub fn classify(match_rate_percent: f64) -> CoverageQuality {
    if match_rate_percent >= PASS_THRESHOLD {
        CoverageQuality::Pass
    } else if match_rate_percent >= REVIEW_THRESHOLD {
        CoverageQuality::Review
    } else {
        CoverageQuality::Fail
    }
}

/// Share of `reference` keys that have a unit in `table`.
///
/// Duplicate reference keys count once. An empty reference list is a FAIL.
pub fn check_coverage(reference: &[JoinKey], table: &UnitTable) -> CoverageReport {
    let mut seen = HashSet::new();
    let unique: Vec<&JoinKey> = reference.iter().filter(|k| seen.insert(*k)).collect();

    let unmatched: Vec<&JoinKey> = unique
        .iter()
        .copied()
        .filter(|k| table.unit_index(k).is_none())
        .collect();
    let matched_count = unique.len() - unmatched.len();

    let match_rate_percent = if unique.is_empty() {
        0.0
    } else {
        matched_count as f64 / unique.len() as f64 * 100.0
    };

    let extra_in_table_count = table.keys().iter().filter(|k| !seen.contains(k)).count();

    let report = CoverageReport {
        reference_count: unique.len(),
        table_count: table.unit_count(),
        matched_count,
        unmatched_count: unmatched.len(),
        match_rate_percent,
        quality: classify(match_rate_percent),
        unmatched_sample: unmatched
            .iter()
            .take(UNMATCHED_SAMPLE)
            .map(|k| k.as_str().to_string())
            .collect(),
        extra_in_table_count,
    };

    match report.quality {
        CoverageQuality::Pass => log::info!(
            "coverage {:.1}% ({}/{}) {}",
            report.match_rate_percent,
            report.matched_count,
            report.reference_count,
            report.quality
        ),
        _ => log::warn!(
            "coverage {:.1}% ({}/{}) {}, unmatched: {}",
            report.match_rate_percent,
            report.matched_count,
            report.reference_count,
            report.quality,
            report.unmatched_sample.join(", ")
        ),
    }

    report
}
