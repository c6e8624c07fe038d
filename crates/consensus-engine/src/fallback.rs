//! Fallback sourcing decision and sample merging.

use std::collections::HashSet;

use indicator_core::{ConsensusRecord, SourceSample};
use serde::{Deserialize, Serialize};

use crate::scorer::SIGNIFICANT_DIVERGENCE_PCT;

/// Records below this confidence get one extra sourcing round.
pub const FALLBACK_CONFIDENCE_THRESHOLD: f64 = 0.6;
/// Fraction of analyzed fields that may diverge significantly before
/// fallback kicks in.
pub const DIVERGENT_FIELD_RATIO: f64 = 0.30;
/// Tighter divergence bar for critical fields.
pub const CRITICAL_DIVERGENCE_PCT: f64 = 15.0;
/// Critical-field pairs (or more) trigger fallback.
pub const CRITICAL_FIELD_TRIGGER: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackDecision {
    pub required: bool,
    /// How many additional sources to request. The largest requirement
    /// across triggered conditions wins.
    pub extra_sources: usize,
    pub reasons: Vec<String>,
}

impl FallbackDecision {
    fn none() -> Self {
        Self {
            required: false,
            extra_sources: 0,
            reasons: Vec::new(),
        }
    }
}

pub(crate) fn evaluate(record: &ConsensusRecord, min_sources: usize) -> FallbackDecision {
    let mut decision = FallbackDecision::none();

    if record.sources_count < min_sources {
        decision.extra_sources = decision
            .extra_sources
            .max(min_sources - record.sources_count);
        decision.reasons.push(format!(
            "only {} of {} required sources responded",
            record.sources_count, min_sources
        ));
    }

    if record.confidence < FALLBACK_CONFIDENCE_THRESHOLD {
        decision.extra_sources = decision.extra_sources.max(2);
        decision.reasons.push(format!(
            "confidence {:.2} below fallback threshold {:.2}",
            record.confidence, FALLBACK_CONFIDENCE_THRESHOLD
        ));
    }

    let analyzed = record.fields.len();
    if analyzed > 0 {
        let divergent = record
            .fields
            .values()
            .filter(|fc| {
                fc.max_deviation_pct()
                    .is_some_and(|d| d > SIGNIFICANT_DIVERGENCE_PCT)
            })
            .count();
        if divergent as f64 / analyzed as f64 > DIVERGENT_FIELD_RATIO {
            decision.extra_sources = decision.extra_sources.max(2);
            decision.reasons.push(format!(
                "{divergent} of {analyzed} fields diverge beyond {SIGNIFICANT_DIVERGENCE_PCT}%"
            ));
        }

        let critical_hits = record
            .fields
            .values()
            .filter(|fc| {
                field_extractor::is_critical(&fc.field)
                    && fc
                        .max_deviation_pct()
                        .is_some_and(|d| d > CRITICAL_DIVERGENCE_PCT)
            })
            .count();
        if critical_hits >= CRITICAL_FIELD_TRIGGER {
            decision.extra_sources = decision.extra_sources.max(2);
            decision.reasons.push(format!(
                "{critical_hits} critical fields diverge beyond {CRITICAL_DIVERGENCE_PCT}%"
            ));
        }
    }

    decision.required = !decision.reasons.is_empty();
    decision
}

/// Case- and whitespace-insensitive source identity.
pub fn normalize_source(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Appends fallback samples to the primary round, dropping any source
/// already present under its normalized name.
pub fn merge_samples(primary: Vec<SourceSample>, extra: Vec<SourceSample>) -> Vec<SourceSample> {
    let mut seen: HashSet<String> = primary.iter().map(|s| normalize_source(&s.source)).collect();
    let mut merged = primary;
    for sample in extra {
        if seen.insert(normalize_source(&sample.source)) {
            merged.push(sample);
        } else {
            tracing::debug!(source = %sample.source, "Duplicate fallback source dropped");
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use indicator_core::{DivergentSource, FieldConsensus, SourceReading};
    use std::collections::HashMap;

    fn field(name: &str, deviation_pct: Option<f64>) -> FieldConsensus {
        FieldConsensus {
            field: name.to_string(),
            readings: vec![],
            final_value: Some(8.5),
            final_source: "statusinvest".to_string(),
            agreement_count: 2,
            sources_count: 3,
            consensus_pct: 67.0,
            has_discrepancy: deviation_pct.is_some(),
            divergent_sources: deviation_pct
                .map(|d| {
                    vec![DivergentSource {
                        source: "investidor10".to_string(),
                        value: 40.0,
                        deviation_pct: d,
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn record(
        sources_count: usize,
        confidence: f64,
        fields: &[(&str, Option<f64>)],
    ) -> ConsensusRecord {
        let fields: HashMap<String, FieldConsensus> = fields
            .iter()
            .map(|(name, dev)| (name.to_string(), field(name, *dev)))
            .collect();
        ConsensusRecord {
            ticker: "PETR4".to_string(),
            fields,
            sources_used: (0..sources_count).map(|i| format!("source{i}")).collect(),
            sources_count,
            confidence,
            valid: true,
        }
    }

    #[test]
    fn clean_record_needs_no_fallback() {
        let record = record(6, 1.0, &[("pl", None), ("roe", None), ("dy", None)]);
        let decision = evaluate(&record, 3);
        assert!(!decision.required);
        assert_eq!(decision.extra_sources, 0);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn too_few_sources_requests_the_difference() {
        let record = record(2, 0.8, &[("pl", None)]);
        let decision = evaluate(&record, 3);
        assert!(decision.required);
        assert_eq!(decision.extra_sources, 1);
    }

    #[test]
    fn low_confidence_requests_two_extra() {
        let record = record(4, 0.55, &[("pl", None)]);
        let decision = evaluate(&record, 3);
        assert!(decision.required);
        assert_eq!(decision.extra_sources, 2);
    }

    #[test]
    fn largest_requirement_wins_across_conditions() {
        // One source short of the minimum AND low confidence: 2 > 1.
        let record = record(2, 0.4, &[("pl", None)]);
        let decision = evaluate(&record, 3);
        assert_eq!(decision.extra_sources, 2);
        assert_eq!(decision.reasons.len(), 2);
    }

    #[test]
    fn divergent_field_ratio_triggers() {
        // 2 of 4 analyzed fields beyond 20%: ratio 0.5 > 0.30.
        let record = record(
            4,
            0.9,
            &[
                ("psr", Some(45.0)),
                ("vpa", Some(30.0)),
                ("lpa", None),
                ("roa", None),
            ],
        );
        let decision = evaluate(&record, 3);
        assert!(decision.required);
        assert_eq!(decision.extra_sources, 2);
    }

    #[test]
    fn critical_pair_triggers_at_fifteen_percent() {
        // Two critical fields just past 15% but under the significant bar;
        // only the critical condition fires (2 of 6 fields is under 30%).
        let record = record(
            4,
            0.9,
            &[
                ("pl", Some(16.0)),
                ("roe", Some(17.0)),
                ("psr", None),
                ("vpa", None),
                ("lpa", None),
                ("roa", None),
            ],
        );
        let decision = evaluate(&record, 3);
        assert!(decision.required);
        assert_eq!(decision.reasons.len(), 1);
        assert_eq!(decision.extra_sources, 2);
    }

    #[test]
    fn single_critical_divergence_is_tolerated() {
        let record = record(
            4,
            0.9,
            &[("pl", Some(18.0)), ("roe", None), ("psr", None), ("vpa", None)],
        );
        let decision = evaluate(&record, 3);
        assert!(!decision.required);
    }

    #[test]
    fn empty_field_set_skips_divergence_conditions() {
        let record = record(4, 0.9, &[]);
        let decision = evaluate(&record, 3);
        assert!(!decision.required);
    }

    fn sample(source: &str) -> SourceSample {
        SourceSample {
            source: source.to_string(),
            readings: vec![SourceReading {
                source: source.to_string(),
                field: "pl".to_string(),
                value: Some(8.5),
                observed_at: Utc::now(),
            }],
            elapsed_ms: 120,
        }
    }

    #[test]
    fn merge_dedupes_by_normalized_name() {
        let primary = vec![sample("statusinvest"), sample("fundamentus")];
        let extra = vec![sample(" StatusInvest "), sample("yahoo")];
        let merged = merge_samples(primary, extra);

        let names: Vec<&str> = merged.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(names, vec!["statusinvest", "fundamentus", "yahoo"]);
    }
}
