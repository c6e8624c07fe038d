//! Per-ticker in-flight tracking.
//!
//! One update per ticker at a time. Claims are released on drop, so an
//! update that panics or errors out never leaves a stale entry behind.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Clone)]
pub(crate) struct InflightRegistry {
    inner: Arc<DashMap<String, Instant>>,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Claims the ticker, or returns None when an update already holds it.
    pub fn try_claim(&self, ticker: &str) -> Option<InflightGuard> {
        match self.inner.entry(ticker.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(InflightGuard {
                    registry: Arc::clone(&self.inner),
                    ticker: ticker.to_string(),
                })
            }
        }
    }

    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.inner.len()
    }
}

pub(crate) struct InflightGuard {
    registry: Arc<DashMap<String, Instant>>,
    ticker: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.ticker);
    }
}
