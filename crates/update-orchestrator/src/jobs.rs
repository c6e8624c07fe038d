//! Scheduled maintenance passes.

use indicator_core::error::UpdateError;
use indicator_core::types::UpdateTrigger;

use crate::{store_err, BatchOutcome, UpdateOrchestrator};

impl UpdateOrchestrator {
    /// One retry pass over failed assets still inside the retry budget.
    ///
    /// Returns `None` when nothing is eligible.
    pub async fn run_retry_failed(&self) -> Result<Option<BatchOutcome>, UpdateError> {
        let candidates = self
            .store
            .retry_candidates(self.config.max_retry_count)
            .await
            .map_err(store_err)?;
        if candidates.is_empty() {
            tracing::debug!("No failed assets eligible for retry");
            return Ok(None);
        }
        for asset in &candidates {
            let health = asset.health();
            tracing::debug!(
                ticker = %asset.ticker,
                retry_count = health.retry_count,
                last_error = health.last_update_error.as_deref().unwrap_or(""),
                "Retry candidate"
            );
        }

        let tickers: Vec<String> = candidates.iter().map(|a| a.ticker.clone()).collect();
        tracing::info!(count = tickers.len(), "Retrying failed assets");
        let outcome = self.update_batch(&tickers, UpdateTrigger::Retry).await?;
        Ok(Some(outcome))
    }

    /// One refresh pass over assets whose data has gone stale.
    ///
    /// Selection ignores the auto-update flag; disabled assets enter the
    /// batch and terminate as cancelled, which keeps the opt-out visible in
    /// the attempt log.
    pub async fn run_outdated(&self) -> Result<Option<BatchOutcome>, UpdateError> {
        let candidates = self
            .store
            .outdated_candidates(self.config.outdated_threshold_days)
            .await
            .map_err(store_err)?;
        if candidates.is_empty() {
            tracing::debug!("No outdated assets to refresh");
            return Ok(None);
        }
        for asset in &candidates {
            let health = asset.health();
            tracing::debug!(
                ticker = %asset.ticker,
                last_updated = ?health.last_updated,
                auto_update_enabled = health.auto_update_enabled,
                "Outdated candidate"
            );
        }

        let tickers: Vec<String> = candidates.iter().map(|a| a.ticker.clone()).collect();
        tracing::info!(count = tickers.len(), "Refreshing outdated assets");
        let outcome = self.update_batch(&tickers, UpdateTrigger::Cron).await?;
        Ok(Some(outcome))
    }
}
