use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Built-in source ranking, best first. Primary scrape sources come before
/// the fallback-only ones.
pub const DEFAULT_SOURCE_PRIORITY: &[&str] = &[
    "statusinvest",
    "fundamentus",
    "investidor10",
    "tradingview",
    "infomoney",
    "googlefinance",
    "yahoo",
    "advfn",
    "moneytimes",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    // Consensus thresholds
    pub min_sources: usize,              // 3
    pub min_confidence: f64,             // 0.5
    pub default_field_tolerance: f64,    // 0.05 (5% relative deviation)
    pub field_tolerances: HashMap<String, f64>,
    pub source_priority: Vec<String>,

    // Update orchestration
    pub max_retry_count: i64,            // 3
    pub outdated_threshold_days: i64,    // 7
    pub inter_batch_delay_ms: u64,       // 2000

    // Sourcing timeouts and pacing
    pub adapter_timeout_secs: u64,       // 30 per adapter call
    pub fallback_timeout_secs: u64,      // 90 per fallback round
    pub fallback_per_source_timeout_secs: u64, // 20
    pub domain_min_interval_ms: u64,     // 1500 between hits on one domain

    // Scheduled jobs
    pub retry_scan_interval_secs: u64,   // 1800 (30 minutes)
    pub outdated_scan_interval_secs: u64, // 21600 (6 hours)

    // External services
    pub bridge_base_url: String,
    pub progress_webhook_url: Option<String>,

    // Database
    pub database_url: String,
}

impl AggregatorConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            // Consensus thresholds
            min_sources: env::var("MIN_SOURCES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            min_confidence: env::var("MIN_CONFIDENCE")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            default_field_tolerance: env::var("FIELD_TOLERANCE")
                .unwrap_or_else(|_| "0.05".to_string())
                .parse()?,
            field_tolerances: parse_tolerance_overrides(
                &env::var("FIELD_TOLERANCE_OVERRIDES").unwrap_or_default(),
            )?,
            source_priority: env::var("SOURCE_PRIORITY")
                .unwrap_or_else(|_| DEFAULT_SOURCE_PRIORITY.join(","))
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),

            // Update orchestration
            max_retry_count: env::var("MAX_RETRY_COUNT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            outdated_threshold_days: env::var("OUTDATED_THRESHOLD_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()?,
            inter_batch_delay_ms: env::var("INTER_BATCH_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,

            // Sourcing
            adapter_timeout_secs: env::var("ADAPTER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            fallback_timeout_secs: env::var("FALLBACK_TIMEOUT_SECS")
                .unwrap_or_else(|_| "90".to_string())
                .parse()?,
            fallback_per_source_timeout_secs: env::var("FALLBACK_PER_SOURCE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            domain_min_interval_ms: env::var("DOMAIN_MIN_INTERVAL_MS")
                .unwrap_or_else(|_| "1500".to_string())
                .parse()?,

            // Scheduled jobs
            retry_scan_interval_secs: env::var("RETRY_SCAN_INTERVAL")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()?,
            outdated_scan_interval_secs: env::var("OUTDATED_SCAN_INTERVAL")
                .unwrap_or_else(|_| "21600".to_string())
                .parse()?,

            // External services
            bridge_base_url: env::var("BRIDGE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8700".to_string()),
            progress_webhook_url: env::var("PROGRESS_WEBHOOK_URL").ok(),

            // Database
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:fundpulse.db".to_string()),
        };

        Ok(config)
    }

    /// Tolerance for a field, honoring per-field overrides.
    pub fn tolerance_for(&self, field: &str) -> f64 {
        self.field_tolerances
            .get(field)
            .copied()
            .unwrap_or(self.default_field_tolerance)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_sources: 3,
            min_confidence: 0.5,
            default_field_tolerance: 0.05,
            field_tolerances: HashMap::new(),
            source_priority: DEFAULT_SOURCE_PRIORITY
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_retry_count: 3,
            outdated_threshold_days: 7,
            inter_batch_delay_ms: 2000,
            adapter_timeout_secs: 30,
            fallback_timeout_secs: 90,
            fallback_per_source_timeout_secs: 20,
            domain_min_interval_ms: 1500,
            retry_scan_interval_secs: 1800,
            outdated_scan_interval_secs: 21600,
            bridge_base_url: "http://localhost:8700".to_string(),
            progress_webhook_url: None,
            database_url: "sqlite:fundpulse.db".to_string(),
        }
    }
}

/// Parses "field=tolerance" pairs, e.g. "dy=0.10,roe=0.08".
fn parse_tolerance_overrides(raw: &str) -> Result<HashMap<String, f64>> {
    let mut overrides = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (field, tolerance) = entry
            .split_once('=')
            .with_context(|| format!("Bad tolerance override (want field=value): {entry}"))?;
        let tolerance: f64 = tolerance
            .trim()
            .parse()
            .with_context(|| format!("Bad tolerance value in override: {entry}"))?;
        overrides.insert(field.trim().to_lowercase(), tolerance);
    }
    Ok(overrides)
}
