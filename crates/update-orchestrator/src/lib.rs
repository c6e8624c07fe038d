//! Update orchestration for fundamental indicators.
//!
//! Drives a single asset through the update lifecycle: source from the
//! primary adapters, run consensus, optionally widen with fallback sources,
//! then persist a snapshot or record the failure. Batch, portfolio, sector
//! and scheduled flows all reduce to the single-asset path.

mod batch;
mod inflight;
mod jobs;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use uuid::Uuid;

use asset_store::{AssetRecord, AssetStore};
use consensus_engine::fallback::merge_samples;
use consensus_engine::ConsensusEngine;
use field_extractor::sanitize::sanitize_record_fields;
use indicator_core::config::AggregatorConfig;
use indicator_core::error::UpdateError;
use indicator_core::types::{ConsensusRecord, UpdateStatus, UpdateTrigger};
use progress_events::{ProgressBus, ProgressEvent};
use source_pool::{FallbackPool, SourcingRunner};

use crate::inflight::InflightRegistry;

pub use batch::BatchOutcome;

/// Result of one asset update, regardless of how it was triggered.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub asset_id: i64,
    pub ticker: String,
    pub status: UpdateStatus,
    pub error: Option<String>,
    pub trigger: UpdateTrigger,
    pub trace_id: String,
    pub duration_ms: u64,
    pub sources_count: usize,
    pub confidence: f64,
    pub field_count: usize,
}

impl UpdateOutcome {
    fn terminal(
        asset: &AssetRecord,
        status: UpdateStatus,
        trigger: UpdateTrigger,
        trace_id: &str,
    ) -> Self {
        Self {
            asset_id: asset.id,
            ticker: asset.ticker.clone(),
            status,
            error: None,
            trigger,
            trace_id: trace_id.to_string(),
            duration_ms: 0,
            sources_count: 0,
            confidence: 0.0,
            field_count: 0,
        }
    }
}

/// Consensus output that cleared every acceptance gate.
struct ResolvedUpdate {
    record: ConsensusRecord,
    fields: HashMap<String, f64>,
    fallback_used: bool,
    fallback_reasons: Vec<String>,
}

pub struct UpdateOrchestrator {
    store: AssetStore,
    runner: SourcingRunner,
    fallback: Arc<dyn FallbackPool>,
    engine: ConsensusEngine,
    bus: ProgressBus,
    config: AggregatorConfig,
    inflight: InflightRegistry,
}

impl UpdateOrchestrator {
    pub fn new(
        store: AssetStore,
        runner: SourcingRunner,
        fallback: Arc<dyn FallbackPool>,
        bus: ProgressBus,
        config: AggregatorConfig,
    ) -> Self {
        let engine = ConsensusEngine::new(&config, runner.adapter_count());
        Self {
            store,
            runner,
            fallback,
            engine,
            bus,
            config,
            inflight: InflightRegistry::new(),
        }
    }

    /// Runs the full update lifecycle for one ticker.
    ///
    /// Request-side problems (unknown ticker, concurrent update) surface as
    /// errors. Sourcing and persistence problems terminate as a `Failed`
    /// outcome with the asset's failure health recorded.
    pub async fn update_asset(
        &self,
        ticker: &str,
        trigger: UpdateTrigger,
    ) -> Result<UpdateOutcome, UpdateError> {
        self.update_asset_traced(ticker, trigger, None).await
    }

    pub(crate) async fn update_asset_traced(
        &self,
        ticker: &str,
        trigger: UpdateTrigger,
        parent_trace: Option<&str>,
    ) -> Result<UpdateOutcome, UpdateError> {
        let asset = self
            .store
            .find_by_ticker(ticker)
            .await
            .map_err(store_err)?
            .ok_or_else(|| UpdateError::NotFound(ticker.to_string()))?;

        let trace_id = parent_trace
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Automatic triggers respect the per-asset opt-out before any
        // sourcing work starts. Manual and batch requests bypass it.
        if trigger.is_automatic() && !asset.auto_update_enabled {
            tracing::info!(
                ticker = %asset.ticker,
                trigger = trigger.as_str(),
                "Auto-update disabled, cancelling"
            );
            self.store.record_cancelled(asset.id).await.map_err(store_err)?;
            self.store
                .log_cancelled_attempt(asset.id, &trace_id, trigger)
                .await
                .map_err(store_err)?;
            return Ok(UpdateOutcome::terminal(
                &asset,
                UpdateStatus::Cancelled,
                trigger,
                &trace_id,
            ));
        }

        let _guard = self.inflight.try_claim(&asset.ticker).ok_or_else(|| {
            UpdateError::Orchestration(format!("update already in flight for {}", asset.ticker))
        })?;

        let started = Instant::now();
        let attempt_id = self
            .store
            .open_attempt(asset.id, &trace_id, trigger)
            .await
            .map_err(store_err)?;

        self.bus
            .publish_sync(&ProgressEvent::UpdateStarted {
                asset_id: asset.id,
                ticker: asset.ticker.clone(),
                trigger: trigger.as_str().to_string(),
                trace_id: trace_id.clone(),
            })
            .await;

        match self.source_and_resolve(&asset.ticker).await {
            Ok(resolved) => {
                match self.persist_snapshot(&asset, &resolved).await {
                    Ok(()) => {
                        self.finish_success(&asset, attempt_id, trigger, &trace_id, started, resolved)
                            .await
                    }
                    Err(e) => {
                        self.finish_failure(&asset, attempt_id, trigger, &trace_id, started, e.to_string())
                            .await
                    }
                }
            }
            Err(e) => {
                self.finish_failure(&asset, attempt_id, trigger, &trace_id, started, e.to_string())
                    .await
            }
        }
    }

    /// Primary sourcing round, consensus, and the single fallback round.
    async fn source_and_resolve(&self, ticker: &str) -> Result<ResolvedUpdate, UpdateError> {
        let mut samples = self.runner.run_round(ticker).await;
        let mut record = self.engine.analyze(ticker, &samples);

        let decision = self.engine.needs_fallback(&record);
        let mut fallback_used = false;
        if decision.required {
            tracing::info!(
                ticker,
                extra_sources = decision.extra_sources,
                reasons = ?decision.reasons,
                "Requesting fallback sources"
            );
            let per_source = Duration::from_secs(self.config.fallback_per_source_timeout_secs);
            let round_budget = Duration::from_secs(self.config.fallback_timeout_secs);
            match tokio::time::timeout(
                round_budget,
                self.fallback.fetch_extra(ticker, decision.extra_sources, per_source),
            )
            .await
            {
                Ok(Ok(extra)) => {
                    if !extra.met_minimum {
                        tracing::warn!(ticker, "Fallback round delivered fewer sources than requested");
                    }
                    samples = merge_samples(samples, extra.samples);
                    record = self.engine.analyze(ticker, &samples);
                    fallback_used = true;
                }
                Ok(Err(e)) => {
                    tracing::warn!(ticker, error = %e, "Fallback round failed, keeping primary samples");
                }
                Err(_) => {
                    tracing::warn!(ticker, "Fallback round timed out, keeping primary samples");
                }
            }
        }

        if record.sources_count < self.engine.min_sources() {
            return Err(UpdateError::InsufficientSources {
                got: record.sources_count,
                min: self.engine.min_sources(),
            });
        }
        if record.confidence < self.config.min_confidence {
            return Err(UpdateError::LowConfidence {
                confidence: record.confidence,
                min: self.config.min_confidence,
            });
        }

        let fields = sanitize_record_fields(&record.fields);
        if fields.is_empty() {
            return Err(UpdateError::Orchestration(
                "no persistable fields after sanitization".to_string(),
            ));
        }

        Ok(ResolvedUpdate {
            record,
            fields,
            fallback_used,
            fallback_reasons: decision.reasons,
        })
    }

    async fn persist_snapshot(
        &self,
        asset: &AssetRecord,
        resolved: &ResolvedUpdate,
    ) -> Result<(), UpdateError> {
        let reference_date = Utc::now().date_naive();
        self.store
            .save_snapshot(asset.id, &resolved.record, &resolved.fields, reference_date)
            .await
            .map_err(store_err)?;
        self.store.record_success(asset.id).await.map_err(store_err)?;
        Ok(())
    }

    async fn finish_success(
        &self,
        asset: &AssetRecord,
        attempt_id: i64,
        trigger: UpdateTrigger,
        trace_id: &str,
        started: Instant,
        resolved: ResolvedUpdate,
    ) -> Result<UpdateOutcome, UpdateError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let metadata = json!({
            "sources_used": resolved.record.sources_used,
            "fallback_used": resolved.fallback_used,
            "fallback_reasons": resolved.fallback_reasons,
        });
        if let Err(e) = self
            .store
            .complete_attempt(attempt_id, UpdateStatus::Success, None, Some(metadata))
            .await
        {
            tracing::error!(ticker = %asset.ticker, error = %e, "Failed to close update attempt");
        }

        let field_sources: HashMap<String, String> = resolved
            .fields
            .keys()
            .filter_map(|field| {
                resolved
                    .record
                    .fields
                    .get(field)
                    .map(|fc| (field.clone(), fc.final_source.clone()))
            })
            .collect();

        self.bus
            .publish_sync(&ProgressEvent::UpdateCompleted {
                asset_id: asset.id,
                ticker: asset.ticker.clone(),
                duration_ms,
                sources_count: resolved.record.sources_count,
                confidence: resolved.record.confidence,
                field_count: resolved.fields.len(),
                field_sources,
                trace_id: trace_id.to_string(),
            })
            .await;

        tracing::info!(
            ticker = %asset.ticker,
            sources = resolved.record.sources_count,
            confidence = resolved.record.confidence,
            fields = resolved.fields.len(),
            duration_ms,
            "Asset update succeeded"
        );

        Ok(UpdateOutcome {
            asset_id: asset.id,
            ticker: asset.ticker.clone(),
            status: UpdateStatus::Success,
            error: None,
            trigger,
            trace_id: trace_id.to_string(),
            duration_ms,
            sources_count: resolved.record.sources_count,
            confidence: resolved.record.confidence,
            field_count: resolved.fields.len(),
        })
    }

    /// Terminal failure path. Health bookkeeping errors are logged, never
    /// allowed to mask the original sourcing error.
    async fn finish_failure(
        &self,
        asset: &AssetRecord,
        attempt_id: i64,
        trigger: UpdateTrigger,
        trace_id: &str,
        started: Instant,
        error: String,
    ) -> Result<UpdateOutcome, UpdateError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let retry_count = match self
            .store
            .record_failure(asset.id, &error, self.config.max_retry_count)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(ticker = %asset.ticker, error = %e, "Failed to record failure health");
                -1
            }
        };
        if let Err(e) = self
            .store
            .complete_attempt(attempt_id, UpdateStatus::Failed, Some(&error), None)
            .await
        {
            tracing::error!(ticker = %asset.ticker, error = %e, "Failed to close update attempt");
        }

        self.bus
            .publish_sync(&ProgressEvent::UpdateFailed {
                asset_id: asset.id,
                ticker: asset.ticker.clone(),
                error: error.clone(),
                duration_ms,
                trace_id: trace_id.to_string(),
            })
            .await;

        tracing::warn!(
            ticker = %asset.ticker,
            error = %error,
            retry_count,
            duration_ms,
            "Asset update failed"
        );

        Ok(UpdateOutcome {
            asset_id: asset.id,
            ticker: asset.ticker.clone(),
            status: UpdateStatus::Failed,
            error: Some(error),
            trigger,
            trace_id: trace_id.to_string(),
            duration_ms,
            sources_count: 0,
            confidence: 0.0,
            field_count: 0,
        })
    }
}

fn store_err(e: anyhow::Error) -> UpdateError {
    UpdateError::Store(e.to_string())
}
