//! Record-level confidence scoring.

use std::collections::HashMap;

use indicator_core::FieldConsensus;

/// Divergence beyond this (percent) marks a field discrepancy significant.
pub const SIGNIFICANT_DIVERGENCE_PCT: f64 = 20.0;
/// Penalty cap applied to the base confidence.
pub const MAX_DISCREPANCY_PENALTY: f64 = 0.3;
/// Floor applied once the source-count minimum is met.
pub const CONFIDENCE_FLOOR: f64 = 0.5;

/// Scores a record's confidence.
///
/// Base is the responding-source fraction against the full adapter roster,
/// capped at 1.0. Significant discrepancies shave off up to
/// `MAX_DISCREPANCY_PENALTY`. Records meeting the source minimum never score
/// below `CONFIDENCE_FLOOR`, so confidence is monotonic in source count for
/// a fixed discrepancy profile.
pub(crate) fn score_confidence(
    sources_count: usize,
    fields: &HashMap<String, FieldConsensus>,
    min_sources: usize,
    target_source_count: usize,
) -> f64 {
    let base = if target_source_count == 0 {
        0.0
    } else {
        (sources_count as f64 / target_source_count as f64).min(1.0)
    };

    let significant: Vec<f64> = fields
        .values()
        .filter_map(|fc| fc.max_deviation_pct())
        .filter(|d| *d > SIGNIFICANT_DIVERGENCE_PCT)
        .collect();
    let penalty = if significant.is_empty() {
        0.0
    } else {
        let avg = significant.iter().sum::<f64>() / significant.len() as f64;
        (avg / 200.0).min(MAX_DISCREPANCY_PENALTY)
    };

    let confidence = base * (1.0 - penalty);
    if sources_count >= min_sources && confidence < CONFIDENCE_FLOOR {
        CONFIDENCE_FLOOR
    } else {
        confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use indicator_core::{DivergentSource, SourceReading};

    fn field_with_deviation(field: &str, deviation_pct: Option<f64>) -> FieldConsensus {
        let divergent_sources = deviation_pct
            .map(|d| {
                vec![DivergentSource {
                    source: "investidor10".to_string(),
                    value: 40.0,
                    deviation_pct: d,
                }]
            })
            .unwrap_or_default();
        FieldConsensus {
            field: field.to_string(),
            readings: vec![SourceReading {
                source: "statusinvest".to_string(),
                field: field.to_string(),
                value: Some(8.5),
                observed_at: Utc::now(),
            }],
            final_value: Some(8.5),
            final_source: "statusinvest".to_string(),
            agreement_count: 2,
            sources_count: 3,
            consensus_pct: 67.0,
            has_discrepancy: deviation_pct.is_some(),
            divergent_sources,
        }
    }

    fn fields(specs: &[(&str, Option<f64>)]) -> HashMap<String, FieldConsensus> {
        specs
            .iter()
            .map(|(f, d)| (f.to_string(), field_with_deviation(f, *d)))
            .collect()
    }

    #[test]
    fn full_roster_with_clean_fields_scores_one() {
        let fields = fields(&[("pl", None), ("roe", None)]);
        assert_eq!(score_confidence(6, &fields, 3, 6), 1.0);
    }

    #[test]
    fn base_scales_with_responding_sources() {
        let clean = fields(&[("pl", None)]);
        let two = score_confidence(2, &clean, 3, 6);
        assert!((two - 2.0 / 6.0).abs() < 1e-9);
        // Below the minimum there is no floor.
        assert!(two < CONFIDENCE_FLOOR);
    }

    #[test]
    fn significant_discrepancies_cap_the_penalty() {
        // avg deviation 100% would mean penalty 0.5, capped at 0.3.
        let noisy = fields(&[("pl", Some(100.0))]);
        let score = score_confidence(6, &noisy, 3, 6);
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn mild_divergence_is_not_significant() {
        let mild = fields(&[("pl", Some(12.0)), ("roe", Some(19.9))]);
        assert_eq!(score_confidence(6, &mild, 3, 6), 1.0);
    }

    #[test]
    fn floor_applies_only_at_the_source_minimum() {
        let noisy = fields(&[("pl", Some(100.0)), ("roe", Some(80.0))]);
        // 3/6 base with 0.3 penalty would be 0.35; floored to 0.5.
        assert_eq!(score_confidence(3, &noisy, 3, 6), CONFIDENCE_FLOOR);
        // Two sources: same profile but no floor.
        let two = score_confidence(2, &noisy, 3, 6);
        assert!(two < CONFIDENCE_FLOOR);
    }

    #[test]
    fn confidence_is_monotonic_in_source_count() {
        let noisy = fields(&[("pl", Some(60.0))]);
        let mut prev = 0.0;
        for count in 1..=6 {
            let score = score_confidence(count, &noisy, 3, 6);
            assert!(score >= prev, "confidence dropped at {count} sources");
            prev = score;
        }
    }
}
