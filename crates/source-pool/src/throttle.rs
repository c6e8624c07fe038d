use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Per-domain request spacing: consecutive hits on one domain are at least
/// `min_interval` apart. Different domains never wait on each other.
#[derive(Clone)]
pub struct DomainThrottle {
    last_hit: Arc<Mutex<HashMap<String, Instant>>>,
    min_interval: Duration,
}

impl DomainThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_hit: Arc::new(Mutex::new(HashMap::new())),
            min_interval,
        }
    }

    /// Waits until the domain's spacing window is clear, then claims a slot.
    pub async fn acquire(&self, domain: &str) {
        loop {
            let mut last_hit = self.last_hit.lock().await;
            let now = Instant::now();

            match last_hit.get(domain) {
                Some(&last) if now.duration_since(last) < self.min_interval => {
                    let wait = self.min_interval - now.duration_since(last);
                    drop(last_hit);
                    tracing::debug!(
                        domain = %domain,
                        wait_ms = wait.as_millis() as u64,
                        "Throttling domain"
                    );
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    last_hit.insert(domain.to_string(), now);
                    return;
                }
            }
        }
    }
}
