//! Counters for listener and eviction activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters of one entity client.
#[derive(Debug, Default)]
pub struct FbaseMetrics {
    /// Remote subscriptions requested from the store
    pub subscriptions_started: AtomicU64,

    /// Remote subscriptions torn down
    pub subscriptions_cancelled: AtomicU64,

    /// Change/remove events applied to the cache
    pub listener_events: AtomicU64,

    /// Errors reported by listeners or failed subscribe calls
    pub listener_errors: AtomicU64,

    /// Entities evicted by the sweep
    pub evictions: AtomicU64,

    /// Sweep passes completed
    pub sweep_cycles: AtomicU64,
}

impl FbaseMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FbaseMetricsSnapshot {
        FbaseMetricsSnapshot {
            subscriptions_started: self.subscriptions_started.load(Ordering::Relaxed),
            subscriptions_cancelled: self.subscriptions_cancelled.load(Ordering::Relaxed),
            listener_events: self.listener_events.load(Ordering::Relaxed),
            listener_errors: self.listener_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Snapshot of the counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FbaseMetricsSnapshot {
    pub subscriptions_started: u64,
    pub subscriptions_cancelled: u64,
    pub listener_events: u64,
    pub listener_errors: u64,
    pub evictions: u64,
    pub sweep_cycles: u64,
}
