use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indicator_core::SourceSample;
use tokio::time::Instant;

use crate::throttle::DomainThrottle;
use crate::SourceAdapter;

/// Runs one sourcing round over the configured adapters.
///
/// Adapters are called sequentially: the scrape backend multiplexes a
/// shared browser, so parallel calls buy nothing and trip anti-bot
/// defenses. A failed or timed-out adapter is logged and skipped; it never
/// aborts the round.
pub struct SourcingRunner {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    throttle: DomainThrottle,
    adapter_timeout: Duration,
}

impl SourcingRunner {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        throttle: DomainThrottle,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            adapters,
            throttle,
            adapter_timeout,
        }
    }

    /// Size of the full adapter roster, discovered by the consensus scorer
    /// as the target source count.
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub async fn run_round(&self, ticker: &str) -> Vec<SourceSample> {
        let mut samples = Vec::new();

        for adapter in &self.adapters {
            self.throttle.acquire(adapter.domain()).await;

            let started = Instant::now();
            let result = tokio::time::timeout(self.adapter_timeout, adapter.fetch(ticker)).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(Ok(payload)) => {
                    let readings =
                        field_extractor::extract_readings(adapter.name(), &payload.fields, Utc::now());
                    if readings.is_empty() {
                        tracing::warn!(
                            source = adapter.name(),
                            ticker = %ticker,
                            "Source answered without any known fields"
                        );
                        continue;
                    }
                    tracing::debug!(
                        source = adapter.name(),
                        ticker = %ticker,
                        readings = readings.len(),
                        elapsed_ms,
                        "Source sampled"
                    );
                    samples.push(SourceSample {
                        source: adapter.name().to_string(),
                        readings,
                        elapsed_ms,
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        source = adapter.name(),
                        ticker = %ticker,
                        error = %e,
                        "Source failed, skipping"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        source = adapter.name(),
                        ticker = %ticker,
                        timeout_secs = self.adapter_timeout.as_secs(),
                        "Source timed out, skipping"
                    );
                }
            }
        }

        samples
    }
}
