use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal::unix::SignalKind;
use tokio::time;

use asset_store::AssetStore;
use indicator_core::config::AggregatorConfig;
use progress_events::ProgressBus;
use source_pool::{default_primary_adapters, BridgePool, DomainThrottle, SourcingRunner};
use update_orchestrator::UpdateOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting FundPulse updater agent");

    // 2. Load configuration
    let config = AggregatorConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Min sources: {}", config.min_sources);
    tracing::info!("  Min confidence: {:.2}", config.min_confidence);
    tracing::info!(
        "  Field tolerance: {:.1}% (+{} overrides)",
        config.default_field_tolerance * 100.0,
        config.field_tolerances.len()
    );
    tracing::info!("  Max retry count: {}", config.max_retry_count);
    tracing::info!("  Outdated threshold: {} days", config.outdated_threshold_days);
    tracing::info!(
        "  Pacing: {}ms between batch items, {}ms per domain",
        config.inter_batch_delay_ms,
        config.domain_min_interval_ms
    );
    tracing::info!(
        "  Timeouts: {}s per adapter, {}s per fallback round",
        config.adapter_timeout_secs,
        config.fallback_timeout_secs
    );
    tracing::info!("  Bridge: {}", config.bridge_base_url);

    // 3. Open the asset store
    let store = AssetStore::connect(&config.database_url).await?;
    tracing::info!("Asset store ready ({})", config.database_url);

    // 4. Startup connectivity checks
    // DB check
    sqlx::query("SELECT 1")
        .execute(store.pool())
        .await
        .map_err(|e| anyhow::anyhow!("Database connectivity check failed: {}", e))?;
    tracing::info!("Startup check: database OK");

    // Bridge check (warn-only, not fatal)
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.adapter_timeout_secs))
        .build()?;
    match http
        .get(format!("{}/health", config.bridge_base_url))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Startup check: scrape bridge OK");
        }
        Ok(resp) => {
            tracing::warn!(
                "Startup check: scrape bridge returned {}, updates will fail until it recovers",
                resp.status()
            );
        }
        Err(e) => {
            tracing::warn!(
                "Startup check: scrape bridge unreachable ({}), updates will fail until it recovers",
                e
            );
        }
    }

    // 5. Wire the sourcing pipeline
    let adapters = default_primary_adapters(&config.bridge_base_url, http.clone());
    tracing::info!("Primary adapter roster: {} sources", adapters.len());

    let runner = SourcingRunner::new(
        adapters,
        DomainThrottle::new(Duration::from_millis(config.domain_min_interval_ms)),
        Duration::from_secs(config.adapter_timeout_secs),
    );
    let fallback = Arc::new(BridgePool::new(
        &config.bridge_base_url,
        http,
        Duration::from_secs(config.fallback_timeout_secs),
    ));
    let bus = ProgressBus::new(config.progress_webhook_url.as_deref());
    let orchestrator = Arc::new(UpdateOrchestrator::new(
        store,
        runner,
        fallback,
        bus,
        config.clone(),
    ));
    tracing::info!("Update orchestrator initialized");

    tracing::info!(
        "Agent is now running. Retry pass every {}s, outdated pass every {}s. Press Ctrl+C to stop.",
        config.retry_scan_interval_secs,
        config.outdated_scan_interval_secs
    );

    // 6. Scheduler loop with graceful shutdown (SIGINT + SIGTERM)
    let mut retry_interval = time::interval(Duration::from_secs(config.retry_scan_interval_secs));
    let mut outdated_interval =
        time::interval(Duration::from_secs(config.outdated_scan_interval_secs));
    // A pass can outlast its tick; run late instead of catching up in a burst.
    retry_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    outdated_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = retry_interval.tick() => {
                run_retry_pass(&orchestrator).await;
            }
            _ = outdated_interval.tick() => {
                run_outdated_pass(&orchestrator).await;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                break;
            }
        }
    }

    tracing::info!("Updater agent shut down.");
    Ok(())
}

async fn run_retry_pass(orchestrator: &UpdateOrchestrator) {
    tracing::info!("Starting retry pass...");
    match orchestrator.run_retry_failed().await {
        Ok(Some(batch)) => {
            tracing::info!(
                batch_id = %batch.batch_id,
                success = batch.success_count,
                failed = batch.failed_count,
                cancelled = batch.cancelled_count,
                duration_ms = batch.duration_ms,
                "Retry pass finished"
            );
        }
        Ok(None) => {
            tracing::info!("Retry pass: nothing eligible");
        }
        Err(e) => {
            tracing::error!("Retry pass failed: {}", e);
        }
    }
}

async fn run_outdated_pass(orchestrator: &UpdateOrchestrator) {
    tracing::info!("Starting outdated pass...");
    match orchestrator.run_outdated().await {
        Ok(Some(batch)) => {
            tracing::info!(
                batch_id = %batch.batch_id,
                success = batch.success_count,
                failed = batch.failed_count,
                cancelled = batch.cancelled_count,
                duration_ms = batch.duration_ms,
                "Outdated pass finished"
            );
        }
        Ok(None) => {
            tracing::info!("Outdated pass: nothing stale");
        }
        Err(e) => {
            tracing::error!("Outdated pass failed: {}", e);
        }
    }
}
