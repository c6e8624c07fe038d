use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use indicator_core::{AssetHealth, DivergentSource, FieldConsensus, UpdateStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One tracked asset with its update bookkeeping.
#[derive(Debug, Clone, FromRow)]
pub struct AssetRecord {
    pub id: i64,
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub is_active: bool,
    pub auto_update_enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_update_status: Option<String>,
    pub last_update_error: Option<String>,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
}

impl AssetRecord {
    pub fn health(&self) -> AssetHealth {
        AssetHealth {
            last_updated: self.last_updated,
            last_update_status: self
                .last_update_status
                .as_deref()
                .and_then(UpdateStatus::from_str),
            last_update_error: self.last_update_error.clone(),
            retry_count: self.retry_count,
            auto_update_enabled: self.auto_update_enabled,
        }
    }
}

/// How one persisted field was decided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub source: String,
    pub consensus_pct: f64,
    pub sources_count: usize,
    pub has_discrepancy: bool,
    #[serde(default)]
    pub divergent_sources: Vec<DivergentSource>,
}

impl From<&FieldConsensus> for FieldProvenance {
    fn from(fc: &FieldConsensus) -> Self {
        Self {
            source: fc.final_source.clone(),
            consensus_pct: fc.consensus_pct,
            sources_count: fc.sources_count,
            has_discrepancy: fc.has_discrepancy,
            divergent_sources: fc.divergent_sources.clone(),
        }
    }
}

/// Stored indicator snapshot. JSON columns stay raw here; accessors parse.
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub asset_id: i64,
    pub reference_date: String,
    pub fields_json: String,
    pub provenance_json: String,
    pub sources_used: String,
    pub sources_count: i64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl SnapshotRow {
    pub fn fields(&self) -> Result<HashMap<String, f64>> {
        Ok(serde_json::from_str(&self.fields_json)?)
    }

    pub fn provenance(&self) -> Result<HashMap<String, FieldProvenance>> {
        Ok(serde_json::from_str(&self.provenance_json)?)
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources_used
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Audit row for one update attempt.
#[derive(Debug, Clone, FromRow)]
pub struct UpdateAttemptRow {
    pub id: i64,
    pub asset_id: i64,
    pub trace_id: String,
    pub trigger_kind: String,
    pub status: String,
    pub error: Option<String>,
    pub metadata_json: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PortfolioRow {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
