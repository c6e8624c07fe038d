//! Per-field consensus resolution.
//!
//! Readings are grouped greedily: each one joins the first existing group
//! whose representative (the group's first value) it matches within the
//! field tolerance, otherwise it opens a new group. The largest group wins;
//! size ties go to the group holding the highest-priority source.

use std::collections::HashMap;

use indicator_core::{DivergentSource, FieldConsensus, SourceReading};

/// Rank lookup over the configured source ordering. Unknown sources rank
/// last.
#[derive(Debug, Clone)]
pub struct SourcePriority {
    rank: HashMap<String, usize>,
}

impl SourcePriority {
    pub fn new(ordered: &[String]) -> Self {
        let rank = ordered
            .iter()
            .enumerate()
            .map(|(i, s)| (s.trim().to_lowercase(), i))
            .collect();
        Self { rank }
    }

    pub fn rank(&self, source: &str) -> usize {
        self.rank
            .get(&source.trim().to_lowercase())
            .copied()
            .unwrap_or(usize::MAX)
    }
}

/// Tolerance comparison: relative deviation against the representative,
/// absolute difference when either side is zero.
pub fn values_match(candidate: f64, representative: f64, tolerance: f64) -> bool {
    if candidate == 0.0 || representative == 0.0 {
        (candidate - representative).abs() <= tolerance
    } else {
        ((candidate - representative) / representative).abs() <= tolerance
    }
}

/// Absolute deviation of `value` from `reference`, in percent. A zero
/// reference deviates to 100% by convention.
pub fn deviation_pct(value: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        if value == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        ((value - reference) / reference).abs() * 100.0
    }
}

struct ValueGroup {
    representative: f64,
    members: Vec<usize>,
}

/// Resolves one field from its readings. Returns `None` when no reading
/// carries a value.
pub(crate) fn resolve_field(
    field: &str,
    readings: Vec<SourceReading>,
    tolerance: f64,
    priority: &SourcePriority,
) -> Option<FieldConsensus> {
    let valid: Vec<(usize, f64)> = readings
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.value.map(|v| (i, v)))
        .collect();
    if valid.is_empty() {
        return None;
    }

    let mut groups: Vec<ValueGroup> = Vec::new();
    for (slot, (_, value)) in valid.iter().enumerate() {
        match groups
            .iter_mut()
            .find(|g| values_match(*value, g.representative, tolerance))
        {
            Some(group) => group.members.push(slot),
            None => groups.push(ValueGroup {
                representative: *value,
                members: vec![slot],
            }),
        }
    }

    let best_rank = |group: &ValueGroup| -> usize {
        group
            .members
            .iter()
            .map(|&slot| priority.rank(&readings[valid[slot].0].source))
            .min()
            .unwrap_or(usize::MAX)
    };

    let mut winner = &groups[0];
    for group in &groups[1..] {
        if group.members.len() > winner.members.len()
            || (group.members.len() == winner.members.len()
                && best_rank(group) < best_rank(winner))
        {
            winner = group;
        }
    }

    // Final value comes from the highest-priority member of the winning
    // group.
    let mut final_slot = winner.members[0];
    for &slot in &winner.members[1..] {
        if priority.rank(&readings[valid[slot].0].source)
            < priority.rank(&readings[valid[final_slot].0].source)
        {
            final_slot = slot;
        }
    }
    let final_value = valid[final_slot].1;
    let final_source = readings[valid[final_slot].0].source.clone();

    let divergent_sources: Vec<DivergentSource> = valid
        .iter()
        .enumerate()
        .filter(|(slot, _)| !winner.members.contains(slot))
        .map(|(_, &(idx, value))| DivergentSource {
            source: readings[idx].source.clone(),
            value,
            deviation_pct: deviation_pct(value, final_value),
        })
        .collect();

    let agreement_count = winner.members.len();
    let sources_count = valid.len();
    let consensus_pct = (agreement_count as f64 / sources_count as f64 * 100.0).round();
    let has_discrepancy = groups.len() > 1;

    Some(FieldConsensus {
        field: field.to_string(),
        readings,
        final_value: Some(final_value),
        final_source,
        agreement_count,
        sources_count,
        consensus_pct,
        has_discrepancy,
        divergent_sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reading(source: &str, value: Option<f64>) -> SourceReading {
        SourceReading {
            source: source.to_string(),
            field: "pl".to_string(),
            value,
            observed_at: Utc::now(),
        }
    }

    fn priority() -> SourcePriority {
        SourcePriority::new(&[
            "statusinvest".to_string(),
            "fundamentus".to_string(),
            "investidor10".to_string(),
        ])
    }

    #[test]
    fn majority_group_wins_and_outlier_is_reported() {
        let readings = vec![
            reading("statusinvest", Some(8.5)),
            reading("fundamentus", Some(8.6)),
            reading("investidor10", Some(40.0)),
        ];
        let fc = resolve_field("pl", readings, 0.05, &priority()).unwrap();

        assert_eq!(fc.final_value, Some(8.5));
        assert_eq!(fc.final_source, "statusinvest");
        assert_eq!(fc.agreement_count, 2);
        assert_eq!(fc.sources_count, 3);
        assert_eq!(fc.consensus_pct, 67.0);
        assert!(fc.has_discrepancy);
        assert_eq!(fc.divergent_sources.len(), 1);
        assert_eq!(fc.divergent_sources[0].source, "investidor10");
        let expected = (40.0f64 - 8.5).abs() / 8.5 * 100.0;
        assert!((fc.divergent_sources[0].deviation_pct - expected).abs() < 1e-9);
    }

    #[test]
    fn size_tie_goes_to_higher_priority_group() {
        let readings = vec![
            reading("fundamentus", Some(10.0)),
            reading("statusinvest", Some(20.0)),
        ];
        let fc = resolve_field("pl", readings, 0.05, &priority()).unwrap();

        assert_eq!(fc.final_value, Some(20.0));
        assert_eq!(fc.final_source, "statusinvest");
        assert_eq!(fc.agreement_count, 1);
        assert!(fc.has_discrepancy);
    }

    #[test]
    fn final_value_comes_from_best_ranked_member() {
        let readings = vec![
            reading("investidor10", Some(8.6)),
            reading("fundamentus", Some(8.5)),
            reading("unlisted-site", Some(8.55)),
        ];
        let fc = resolve_field("pl", readings, 0.05, &priority()).unwrap();

        assert_eq!(fc.final_value, Some(8.5));
        assert_eq!(fc.final_source, "fundamentus");
        assert_eq!(fc.agreement_count, 3);
        assert_eq!(fc.consensus_pct, 100.0);
        assert!(!fc.has_discrepancy);
    }

    #[test]
    fn zero_values_compare_absolutely() {
        let readings = vec![
            reading("statusinvest", Some(0.0)),
            reading("fundamentus", Some(0.04)),
            reading("investidor10", Some(0.06)),
        ];
        let fc = resolve_field("payout", readings, 0.05, &priority()).unwrap();

        // 0.04 joins the zero group (|0.04| <= 0.05), 0.06 does not.
        assert_eq!(fc.agreement_count, 2);
        assert_eq!(fc.final_value, Some(0.0));
        assert_eq!(fc.divergent_sources.len(), 1);
        assert_eq!(fc.divergent_sources[0].deviation_pct, 100.0);
    }

    #[test]
    fn single_reading_is_full_consensus() {
        let readings = vec![reading("statusinvest", Some(3.2))];
        let fc = resolve_field("pl", readings, 0.05, &priority()).unwrap();

        assert_eq!(fc.final_value, Some(3.2));
        assert_eq!(fc.consensus_pct, 100.0);
        assert!(!fc.has_discrepancy);
        assert!(fc.divergent_sources.is_empty());
    }

    #[test]
    fn null_only_readings_resolve_to_nothing() {
        let readings = vec![reading("statusinvest", None), reading("fundamentus", None)];
        assert!(resolve_field("pl", readings, 0.05, &priority()).is_none());
    }

    #[test]
    fn null_readings_are_kept_in_the_audit_trail() {
        let readings = vec![
            reading("statusinvest", Some(8.5)),
            reading("fundamentus", None),
        ];
        let fc = resolve_field("pl", readings, 0.05, &priority()).unwrap();

        assert_eq!(fc.sources_count, 1);
        assert_eq!(fc.readings.len(), 2);
    }
}
