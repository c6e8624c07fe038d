//! Source adapters and sourcing rounds.

pub mod bridge;
pub mod runner;
pub mod throttle;

pub use bridge::{default_primary_adapters, domain_for, BridgeAdapter, BridgePool, PRIMARY_SOURCES};
pub use runner::SourcingRunner;
pub use throttle::DomainThrottle;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use indicator_core::SourceSample;
use serde_json::Value;

/// Raw field map as a source returned it, before canonical extraction.
pub type RawFieldMap = HashMap<String, Value>;

/// Result of one adapter call.
#[derive(Debug, Clone)]
pub struct SourcePayload {
    pub fields: RawFieldMap,
    pub elapsed_ms: u64,
}

/// One scrape source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable lowercase source id, e.g. "statusinvest".
    fn name(&self) -> &str;
    /// Domain the adapter hits; throttling is keyed on it.
    fn domain(&self) -> &str;
    async fn fetch(&self, ticker: &str) -> Result<SourcePayload, SourceError>;
}

/// Extra sources requested when the primary round is not good enough.
#[async_trait]
pub trait FallbackPool: Send + Sync {
    async fn fetch_extra(
        &self,
        ticker: &str,
        min_additional: usize,
        per_source_timeout: Duration,
    ) -> Result<FallbackBatch, SourceError>;
}

#[derive(Debug, Clone)]
pub struct FallbackBatch {
    pub samples: Vec<SourceSample>,
    /// Whether the pool managed to reach the requested number of extra
    /// sources. Informational only; whatever arrived still gets merged.
    pub met_minimum: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Request error: {0}")]
    Request(String),

    #[error("Bad payload: {0}")]
    Payload(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),
}
