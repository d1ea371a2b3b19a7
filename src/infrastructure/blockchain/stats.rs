use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::shared::types::EventOutcome;

/// Counters kept by a watcher for the whole process lifetime
#[derive(Debug, Default)]
pub struct WatcherStats {
    delivered: AtomicU64,
    recovered: AtomicU64,
    fallbacks: AtomicU64,
}

/// Point-in-time copy of [`WatcherStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WatcherStatsSnapshot {
    pub delivered: u64,
    pub recovered: u64,
    /// Prices replaced by the fallback
    pub fallbacks: u64,
}

impl WatcherStats {
    pub fn record(&self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Delivered => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            EventOutcome::Recovered(_) => {
                self.recovered.fetch_add(1, Ordering::Relaxed);
            }
            EventOutcome::Fatal(_) => {}
        }
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}
