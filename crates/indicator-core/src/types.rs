use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One source's observation of one canonical field in a sourcing round.
///
/// `value` is `None` when the source exposed the field but it did not parse
/// to a usable number (or was a zero reading on a field where zero means
/// "missing data" upstream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReading {
    pub source: String,
    pub field: String,
    pub value: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

/// Everything one source returned for one ticker in one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSample {
    pub source: String,
    pub readings: Vec<SourceReading>,
    pub elapsed_ms: u64,
}

impl SourceSample {
    /// Whether at least one reading carries a usable number.
    pub fn has_data(&self) -> bool {
        self.readings.iter().any(|r| r.value.is_some())
    }
}

/// A source whose reading fell outside the winning agreement group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergentSource {
    pub source: String,
    pub value: f64,
    /// Deviation from the final value, in percent. When the final value is
    /// zero this is 100.0 by convention.
    pub deviation_pct: f64,
}

/// Per-field consensus outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConsensus {
    pub field: String,
    /// Full audit trail: every reading collected for this field, including
    /// null ones.
    pub readings: Vec<SourceReading>,
    pub final_value: Option<f64>,
    pub final_source: String,
    /// Size of the winning agreement group.
    pub agreement_count: usize,
    /// Number of sources that reported a usable value for this field.
    pub sources_count: usize,
    /// Integer-rounded percentage: 100 * agreement_count / sources_count.
    pub consensus_pct: f64,
    pub has_discrepancy: bool,
    pub divergent_sources: Vec<DivergentSource>,
}

impl FieldConsensus {
    /// Largest deviation among divergent sources, if any.
    pub fn max_deviation_pct(&self) -> Option<f64> {
        self.divergent_sources
            .iter()
            .map(|d| d.deviation_pct)
            .fold(None, |acc, d| Some(acc.map_or(d, |a: f64| a.max(d))))
    }
}

/// Per-ticker consensus outcome across all fields in one sourcing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub ticker: String,
    pub fields: HashMap<String, FieldConsensus>,
    /// Sources that contributed at least one usable reading.
    pub sources_used: Vec<String>,
    pub sources_count: usize,
    pub confidence: f64,
    /// True when both the source-count and confidence thresholds are met.
    pub valid: bool,
}

/// What caused an update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateTrigger {
    Manual,
    Batch,
    Retry,
    Cron,
}

impl UpdateTrigger {
    /// Automatic triggers honor the per-asset auto-update flag; manual ones
    /// bypass it.
    pub fn is_automatic(&self) -> bool {
        matches!(self, UpdateTrigger::Retry | UpdateTrigger::Cron)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateTrigger::Manual => "manual",
            UpdateTrigger::Batch => "batch",
            UpdateTrigger::Retry => "retry",
            UpdateTrigger::Cron => "cron",
        }
    }
}

/// Terminal state of an update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Success,
    Failed,
    Cancelled,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Success => "success",
            UpdateStatus::Failed => "failed",
            UpdateStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(UpdateStatus::Success),
            "failed" => Some(UpdateStatus::Failed),
            "cancelled" => Some(UpdateStatus::Cancelled),
            _ => None,
        }
    }
}

/// Update bookkeeping carried on every asset row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetHealth {
    pub last_updated: Option<DateTime<Utc>>,
    pub last_update_status: Option<UpdateStatus>,
    pub last_update_error: Option<String>,
    pub retry_count: i64,
    pub auto_update_enabled: bool,
}
