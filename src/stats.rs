//! Cache statistics types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::format::{format_bytes, format_duration};

/// Point-in-time copy of the controller counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests answered from the cache store.
    pub cache_hits: u64,
    /// Cache lookups that found nothing.
    pub cache_misses: u64,
    /// Network fetches attempted by the controller.
    pub network_fetches: u64,
    /// Network fetches that failed.
    pub network_failures: u64,
    /// Responses written to the cache store at runtime.
    pub cache_writes: u64,
    /// Requests answered with the placeholder image.
    pub placeholder_fallbacks: u64,
    /// Requests answered with the cached root document.
    pub root_fallbacks: u64,
    /// Requests for which every fallback was exhausted.
    pub unavailable: u64,
    /// Requests not intercepted by the controller.
    pub passthroughs: u64,
    /// Body bytes handed back to callers.
    pub bytes_served: u64,
    /// Seconds since the counters were created.
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    /// Returns the fraction of lookups that hit the cache, or zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups > 0 {
            self.cache_hits as f64 / lookups as f64
        } else {
            0.0
        }
    }

    /// Returns a one-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} hits, {} misses ({:.0}% hit rate), {} network failures, {} served in {}",
            self.cache_hits,
            self.cache_misses,
            self.hit_ratio() * 100.0,
            self.network_failures,
            format_bytes(self.bytes_served),
            format_duration(Duration::from_secs(self.uptime_secs)),
        )
    }
}

/// Lock-free counters updated concurrently by fetch handlers.
#[derive(Debug)]
pub struct CacheStats {
    start_time: Instant,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    network_fetches: AtomicU64,
    network_failures: AtomicU64,
    cache_writes: AtomicU64,
    placeholder_fallbacks: AtomicU64,
    root_fallbacks: AtomicU64,
    unavailable: AtomicU64,
    passthroughs: AtomicU64,
    bytes_served: AtomicU64,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            network_fetches: AtomicU64::new(0),
            network_failures: AtomicU64::new(0),
            cache_writes: AtomicU64::new(0),
            placeholder_fallbacks: AtomicU64::new(0),
            root_fallbacks: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            passthroughs: AtomicU64::new(0),
            bytes_served: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self) {
        self.network_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network_failure(&self) {
        self.network_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_placeholder(&self) {
        self.placeholder_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_root_fallback(&self) {
        self.root_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unavailable(&self) {
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_passthrough(&self) {
        self.passthroughs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_served(&self, bytes: usize) {
        self.bytes_served
            .fetch_add(bytes.try_into().unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Returns the time since the counters were created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            placeholder_fallbacks: self.placeholder_fallbacks.load(Ordering::Relaxed),
            root_fallbacks: self.root_fallbacks.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            passthroughs: self.passthroughs.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            uptime_secs: self.elapsed().as_secs(),
        }
    }
}
