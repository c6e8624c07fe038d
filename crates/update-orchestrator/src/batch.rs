//! Batch, portfolio and sector update flows.
//!
//! Scrape sources sit behind one browser pool, so batches run strictly
//! sequentially with a spacing delay between members. One member's failure
//! never aborts the rest.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use indicator_core::error::UpdateError;
use indicator_core::types::{UpdateStatus, UpdateTrigger};
use progress_events::ProgressEvent;

use crate::{store_err, UpdateOrchestrator, UpdateOutcome};

/// Result of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub results: Vec<UpdateOutcome>,
    /// Requested tickers that are not registered assets.
    pub skipped: Vec<String>,
    pub success_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    pub duration_ms: u64,
}

impl UpdateOrchestrator {
    /// Updates a list of tickers sequentially under one batch trace.
    ///
    /// Unknown tickers are dropped with a warning before the loop starts;
    /// only an empty request list is an error.
    pub async fn update_batch(
        &self,
        tickers: &[String],
        trigger: UpdateTrigger,
    ) -> Result<BatchOutcome, UpdateError> {
        if tickers.is_empty() {
            return Err(UpdateError::InvalidRequest(
                "ticker list is empty".to_string(),
            ));
        }

        let (known, skipped) = self
            .store
            .resolve_tickers(tickers)
            .await
            .map_err(store_err)?;
        for ticker in &skipped {
            tracing::warn!(ticker = %ticker, "Unknown ticker dropped from batch");
        }

        let batch_id = Uuid::new_v4().to_string();
        let member_tickers: Vec<String> = known.iter().map(|a| a.ticker.clone()).collect();
        let total = member_tickers.len();
        let started = Instant::now();

        tracing::info!(
            batch_id = %batch_id,
            total,
            skipped = skipped.len(),
            trigger = trigger.as_str(),
            "Batch update started"
        );
        self.bus
            .publish_sync(&ProgressEvent::BatchStarted {
                batch_id: batch_id.clone(),
                tickers: member_tickers,
            })
            .await;

        let mut results = Vec::with_capacity(total);
        for (index, asset) in known.iter().enumerate() {
            match self
                .update_asset_traced(&asset.ticker, trigger, Some(&batch_id))
                .await
            {
                Ok(outcome) => results.push(outcome),
                Err(e) => {
                    // Entry-gate errors (for example a concurrent manual
                    // update holding the ticker) count as a failed member
                    // without touching the asset's health.
                    tracing::warn!(ticker = %asset.ticker, error = %e, "Batch member rejected");
                    results.push(UpdateOutcome {
                        asset_id: asset.id,
                        ticker: asset.ticker.clone(),
                        status: UpdateStatus::Failed,
                        error: Some(e.to_string()),
                        trigger,
                        trace_id: batch_id.clone(),
                        duration_ms: 0,
                        sources_count: 0,
                        confidence: 0.0,
                        field_count: 0,
                    });
                }
            }

            self.bus.publish(ProgressEvent::BatchProgress {
                batch_id: batch_id.clone(),
                current: index + 1,
                total,
                ticker: asset.ticker.clone(),
            });

            if index + 1 < total {
                tokio::time::sleep(Duration::from_millis(self.config.inter_batch_delay_ms)).await;
            }
        }

        let success_count = results
            .iter()
            .filter(|r| r.status == UpdateStatus::Success)
            .count();
        let failed_count = results
            .iter()
            .filter(|r| r.status == UpdateStatus::Failed)
            .count();
        let cancelled_count = results
            .iter()
            .filter(|r| r.status == UpdateStatus::Cancelled)
            .count();
        let duration_ms = started.elapsed().as_millis() as u64;

        self.bus
            .publish_sync(&ProgressEvent::BatchCompleted {
                batch_id: batch_id.clone(),
                success_count,
                failed_count,
                duration_ms,
            })
            .await;
        tracing::info!(
            batch_id = %batch_id,
            success_count,
            failed_count,
            cancelled_count,
            duration_ms,
            "Batch update finished"
        );

        Ok(BatchOutcome {
            batch_id,
            results,
            skipped,
            success_count,
            failed_count,
            cancelled_count,
            duration_ms,
        })
    }

    /// Updates every holding of a portfolio as one batch.
    pub async fn update_portfolio(&self, portfolio_id: i64) -> Result<BatchOutcome, UpdateError> {
        let tickers = self
            .store
            .portfolio_tickers(portfolio_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| UpdateError::NotFound(format!("portfolio {portfolio_id}")))?;
        if tickers.is_empty() {
            return Err(UpdateError::InvalidRequest(format!(
                "portfolio {portfolio_id} has no holdings"
            )));
        }
        self.update_batch(&tickers, UpdateTrigger::Batch).await
    }

    /// Updates every active, auto-update-enabled asset in a sector as one
    /// batch.
    pub async fn update_sector(&self, sector: &str) -> Result<BatchOutcome, UpdateError> {
        let tickers = self.store.sector_tickers(sector).await.map_err(store_err)?;
        if tickers.is_empty() {
            return Err(UpdateError::NotFound(format!(
                "no active assets in sector {sector}"
            )));
        }
        self.update_batch(&tickers, UpdateTrigger::Batch).await
    }
}
