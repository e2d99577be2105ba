use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

/// Global runtime metrics for the collector.
///
/// Purpose:
/// - Track how many channel fetchers are running
/// - Track channel outcomes (done / empty / failed)
/// - Track paging throughput and retries
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update
/// - Observability only; nothing reads these to make decisions
#[derive(Default)]
pub struct RuntimeMetrics {
    pub fetchers_active: AtomicUsize,

    // Channels
    pub partitions_done: AtomicUsize,
    pub partitions_empty: AtomicUsize,
    pub partitions_failed: AtomicUsize,

    // Paging
    pub pages_fetched: AtomicUsize,
    pub items_fetched: AtomicUsize,
    pub page_retries: AtomicUsize,
    pub page_timeouts: AtomicUsize,
}

impl RuntimeMetrics {
    /// One-line snapshot for the periodic reporter.
    pub fn summary(&self) -> String {
        format!(
            "active={} done={} empty={} failed={} pages={} items={} retries={} timeouts={}",
            self.fetchers_active.load(Ordering::Relaxed),
            self.partitions_done.load(Ordering::Relaxed),
            self.partitions_empty.load(Ordering::Relaxed),
            self.partitions_failed.load(Ordering::Relaxed),
            self.pages_fetched.load(Ordering::Relaxed),
            self.items_fetched.load(Ordering::Relaxed),
            self.page_retries.load(Ordering::Relaxed),
            self.page_timeouts.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));

/// Increments a counter by one.
pub fn incr(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}
