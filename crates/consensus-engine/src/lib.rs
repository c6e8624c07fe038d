//! Multi-source consensus over extracted indicator readings.

pub mod fallback;
pub mod resolver;
pub mod scorer;

pub use fallback::{merge_samples, normalize_source, FallbackDecision};
pub use resolver::{deviation_pct, values_match, SourcePriority};
pub use scorer::{CONFIDENCE_FLOOR, SIGNIFICANT_DIVERGENCE_PCT};

use std::collections::HashMap;

use indicator_core::{AggregatorConfig, ConsensusRecord, SourceReading, SourceSample};

#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    default_tolerance: f64,
    field_tolerances: HashMap<String, f64>,
    priority: SourcePriority,
    min_sources: usize,
    min_confidence: f64,
    /// Full adapter roster size; the confidence base is measured against it.
    target_source_count: usize,
}

impl ConsensusEngine {
    pub fn new(config: &AggregatorConfig, target_source_count: usize) -> Self {
        Self {
            default_tolerance: config.default_field_tolerance,
            field_tolerances: config.field_tolerances.clone(),
            priority: SourcePriority::new(&config.source_priority),
            min_sources: config.min_sources,
            min_confidence: config.min_confidence,
            target_source_count,
        }
    }

    pub fn min_sources(&self) -> usize {
        self.min_sources
    }

    fn tolerance_for(&self, field: &str) -> f64 {
        self.field_tolerances
            .get(field)
            .copied()
            .unwrap_or(self.default_tolerance)
    }

    /// Resolves one sourcing pass into a per-ticker consensus record.
    ///
    /// Samples without a single usable reading do not count toward the
    /// record's source tally.
    pub fn analyze(&self, ticker: &str, samples: &[SourceSample]) -> ConsensusRecord {
        let sources_used: Vec<String> = samples
            .iter()
            .filter(|s| s.has_data())
            .map(|s| s.source.clone())
            .collect();
        let sources_count = sources_used.len();

        let mut by_field: HashMap<String, Vec<SourceReading>> = HashMap::new();
        for sample in samples {
            for reading in &sample.readings {
                by_field
                    .entry(reading.field.clone())
                    .or_default()
                    .push(reading.clone());
            }
        }

        let mut fields = HashMap::new();
        for (field, readings) in by_field {
            let tolerance = self.tolerance_for(&field);
            if let Some(fc) =
                resolver::resolve_field(&field, readings, tolerance, &self.priority)
            {
                if fc.has_discrepancy {
                    tracing::debug!(
                        ticker = %ticker,
                        field = %field,
                        consensus_pct = fc.consensus_pct,
                        divergent = fc.divergent_sources.len(),
                        "Field resolved with discrepancy"
                    );
                }
                fields.insert(field, fc);
            }
        }

        let confidence = scorer::score_confidence(
            sources_count,
            &fields,
            self.min_sources,
            self.target_source_count,
        );
        let valid = sources_count >= self.min_sources && confidence >= self.min_confidence;

        ConsensusRecord {
            ticker: ticker.to_string(),
            fields,
            sources_used,
            sources_count,
            confidence,
            valid,
        }
    }

    /// Decides whether a record warrants the (single) fallback round.
    pub fn needs_fallback(&self, record: &ConsensusRecord) -> FallbackDecision {
        fallback::evaluate(record, self.min_sources)
    }
}
