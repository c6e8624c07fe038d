//! Progress events for update orchestration.
//!
//! Delivery is best-effort: a channel that fails to take an event gets a
//! warning in the logs and nothing more. Orchestration never depends on an
//! event arriving.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lifecycle events emitted while assets are updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ProgressEvent {
    #[serde(rename = "update.started")]
    UpdateStarted {
        asset_id: i64,
        ticker: String,
        trigger: String,
        trace_id: String,
    },
    #[serde(rename = "update.completed")]
    UpdateCompleted {
        asset_id: i64,
        ticker: String,
        duration_ms: u64,
        sources_count: usize,
        confidence: f64,
        field_count: usize,
        /// Which source won each persisted field.
        field_sources: HashMap<String, String>,
        trace_id: String,
    },
    #[serde(rename = "update.failed")]
    UpdateFailed {
        asset_id: i64,
        ticker: String,
        error: String,
        duration_ms: u64,
        trace_id: String,
    },
    #[serde(rename = "batch.started")]
    BatchStarted {
        batch_id: String,
        tickers: Vec<String>,
    },
    #[serde(rename = "batch.progress")]
    BatchProgress {
        batch_id: String,
        current: usize,
        total: usize,
        ticker: String,
    },
    #[serde(rename = "batch.completed")]
    BatchCompleted {
        batch_id: String,
        success_count: usize,
        failed_count: usize,
        duration_ms: u64,
    },
}

impl ProgressEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::UpdateStarted { .. } => "update.started",
            ProgressEvent::UpdateCompleted { .. } => "update.completed",
            ProgressEvent::UpdateFailed { .. } => "update.failed",
            ProgressEvent::BatchStarted { .. } => "batch.started",
            ProgressEvent::BatchProgress { .. } => "batch.progress",
            ProgressEvent::BatchCompleted { .. } => "batch.completed",
        }
    }
}

/// Trait for progress delivery channels.
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), ProgressError>;
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("Webhook error: {0}")]
    Webhook(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

/// Fans events out to every configured channel.
pub struct ProgressBus {
    channels: Arc<Vec<Box<dyn ProgressChannel>>>,
}

impl ProgressBus {
    /// Standard wiring: structured log channel always, webhook when a URL
    /// is configured.
    pub fn new(webhook_url: Option<&str>) -> Self {
        let mut channels: Vec<Box<dyn ProgressChannel>> = vec![Box::new(LogProgressChannel)];
        if let Some(url) = webhook_url.filter(|u| !u.is_empty()) {
            channels.push(Box::new(WebhookProgressChannel {
                url: url.to_string(),
                client: reqwest::Client::new(),
            }));
            tracing::info!("Progress webhook enabled");
        }
        Self::with_channels(channels)
    }

    pub fn with_channels(channels: Vec<Box<dyn ProgressChannel>>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    /// Publish without waiting for delivery (tokio::spawn).
    pub fn publish(&self, event: ProgressEvent) {
        let channels = self.channels.clone();
        tokio::spawn(async move {
            for channel in channels.iter() {
                if let Err(e) = channel.publish(&event).await {
                    tracing::warn!("Progress event via {} failed: {}", channel.name(), e);
                }
            }
        });
    }

    /// Publish and wait for every channel. Failures are logged, never
    /// returned.
    pub async fn publish_sync(&self, event: &ProgressEvent) {
        for channel in self.channels.iter() {
            if let Err(e) = channel.publish(event).await {
                tracing::warn!("Progress event via {} failed: {}", channel.name(), e);
            }
        }
    }
}

/// Emits events into the tracing stream.
struct LogProgressChannel;

#[async_trait]
impl ProgressChannel for LogProgressChannel {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        let payload =
            serde_json::to_string(event).map_err(|e| ProgressError::Serialize(e.to_string()))?;
        tracing::info!(target: "progress", kind = event.kind(), %payload, "progress event");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// POSTs each event as JSON to a configured webhook.
struct WebhookProgressChannel {
    url: String,
    client: reqwest::Client,
}

#[async_trait]
impl ProgressChannel for WebhookProgressChannel {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| ProgressError::Webhook(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProgressError::Webhook(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_their_tag() {
        let event = ProgressEvent::UpdateStarted {
            asset_id: 7,
            ticker: "PETR4".to_string(),
            trigger: "manual".to_string(),
            trace_id: "abc".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "update.started");
        assert_eq!(json["ticker"], "PETR4");

        let back: ProgressEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), "update.started");
    }

    #[test]
    fn batch_completed_carries_counts() {
        let event = ProgressEvent::BatchCompleted {
            batch_id: "b1".to_string(),
            success_count: 3,
            failed_count: 1,
            duration_ms: 8200,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "batch.completed");
        assert_eq!(json["success_count"], 3);
        assert_eq!(json["failed_count"], 1);
    }
}
