//! HTTP adapters over the scrape-bridge service.
//!
//! The bridge fronts a pool of headless-browser scrapers. One endpoint
//! scrapes a single named source, another runs a fallback round over the
//! reserve sources it knows about.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use indicator_core::SourceSample;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;

use crate::{FallbackBatch, FallbackPool, RawFieldMap, SourceAdapter, SourceError, SourcePayload};

/// Sources scraped in every primary round, in priority order.
pub const PRIMARY_SOURCES: &[&str] = &[
    "statusinvest",
    "fundamentus",
    "investidor10",
    "tradingview",
    "infomoney",
    "googlefinance",
];

/// Domain a source's scraper hits, for throttling purposes.
pub fn domain_for(source: &str) -> String {
    match source {
        "statusinvest" => "statusinvest.com.br".to_string(),
        "fundamentus" => "fundamentus.com.br".to_string(),
        "investidor10" => "investidor10.com.br".to_string(),
        "tradingview" => "br.tradingview.com".to_string(),
        "infomoney" => "infomoney.com.br".to_string(),
        "googlefinance" => "google.com".to_string(),
        "yahoo" => "finance.yahoo.com".to_string(),
        "advfn" => "br.advfn.com".to_string(),
        "moneytimes" => "moneytimes.com.br".to_string(),
        other => format!("{other}.com.br"),
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    ok: bool,
    #[serde(default)]
    fields: RawFieldMap,
    #[serde(default)]
    error: Option<String>,
}

/// Adapter for one named source behind the bridge.
#[derive(Clone)]
pub struct BridgeAdapter {
    source: String,
    domain: String,
    base_url: String,
    client: Client,
}

impl BridgeAdapter {
    pub fn new(base_url: &str, source: &str, client: Client) -> Self {
        Self {
            source: source.to_lowercase(),
            domain: domain_for(source),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl SourceAdapter for BridgeAdapter {
    fn name(&self) -> &str {
        &self.source
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn fetch(&self, ticker: &str) -> Result<SourcePayload, SourceError> {
        let url = format!("{}/scrape/{}/{}", self.base_url, self.source, ticker);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Request(format!(
                "bridge returned {} for {}",
                response.status(),
                self.source
            )));
        }

        let body: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Payload(e.to_string()))?;
        if !body.ok {
            return Err(SourceError::Unavailable(
                body.error
                    .unwrap_or_else(|| format!("{} gave no data", self.source)),
            ));
        }

        Ok(SourcePayload {
            fields: body.fields,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// The primary adapter roster against one bridge instance.
pub fn default_primary_adapters(base_url: &str, client: Client) -> Vec<Arc<dyn SourceAdapter>> {
    PRIMARY_SOURCES
        .iter()
        .map(|source| {
            Arc::new(BridgeAdapter::new(base_url, source, client.clone())) as Arc<dyn SourceAdapter>
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct FallbackResponse {
    #[serde(default)]
    met_minimum: bool,
    #[serde(default)]
    results: Vec<FallbackSourceResult>,
}

#[derive(Debug, Deserialize)]
struct FallbackSourceResult {
    source: String,
    #[serde(default)]
    fields: RawFieldMap,
    #[serde(default)]
    elapsed_seconds: Option<f64>,
}

/// Fallback rounds through the bridge's reserve sources.
#[derive(Clone)]
pub struct BridgePool {
    base_url: String,
    client: Client,
    round_timeout: Duration,
}

impl BridgePool {
    /// `round_timeout` is applied per request: a fallback round spans
    /// several reserve sources and must outlive a client-wide timeout
    /// sized for single-source scrapes.
    pub fn new(base_url: &str, client: Client, round_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            round_timeout,
        }
    }
}

#[async_trait]
impl FallbackPool for BridgePool {
    async fn fetch_extra(
        &self,
        ticker: &str,
        min_additional: usize,
        per_source_timeout: Duration,
    ) -> Result<FallbackBatch, SourceError> {
        let url = format!("{}/fallback", self.base_url);
        let payload = serde_json::json!({
            "ticker": ticker,
            "min_additional_sources": min_additional,
            "per_source_timeout_seconds": per_source_timeout.as_secs(),
        });

        let response = self
            .client
            .post(&url)
            .timeout(self.round_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Request(format!(
                "bridge fallback returned {}",
                response.status()
            )));
        }

        let body: FallbackResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Payload(e.to_string()))?;

        let observed_at = Utc::now();
        let mut samples = Vec::new();
        for result in body.results {
            let readings =
                field_extractor::extract_readings(&result.source, &result.fields, observed_at);
            if readings.is_empty() {
                tracing::debug!(
                    source = %result.source,
                    ticker = %ticker,
                    "Fallback source answered without known fields"
                );
                continue;
            }
            let elapsed_ms = result
                .elapsed_seconds
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(0);
            samples.push(SourceSample {
                source: result.source,
                readings,
                elapsed_ms,
            });
        }

        Ok(FallbackBatch {
            samples,
            met_minimum: body.met_minimum,
        })
    }
}
