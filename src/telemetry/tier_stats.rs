//! Per-tier statistics with atomic coordination
//!
//! Counters are relaxed atomics: monotonic, never lost under concurrent
//! access, and snapshotted without stopping the world. Snapshots across
//! tiers are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use serde::Serialize;

/// Live counters for one cache tier.
#[derive(Debug, Default)]
pub struct TierStats {
    hits: CachePadded<AtomicU64>,
    misses: CachePadded<AtomicU64>,
    evictions: CachePadded<AtomicU64>,
    total_response_time_us: CachePadded<AtomicU64>,
    response_samples: CachePadded<AtomicU64>,
    current_size: CachePadded<AtomicU64>,
    peak_size: CachePadded<AtomicU64>,
}

impl TierStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, response_time_us: u64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.record_response_time(response_time_us);
    }

    pub fn record_miss(&self, response_time_us: u64) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_response_time(response_time_us);
    }

    pub fn record_evictions(&self, count: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
        }
    }

    fn record_response_time(&self, us: u64) {
        self.total_response_time_us.fetch_add(us, Ordering::Relaxed);
        self.response_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the tier's current entry count; the peak is a high-water
    /// mark maintained with a CAS loop.
    pub fn set_current_size(&self, size: u64) {
        self.current_size.store(size, Ordering::Relaxed);
        let mut peak = self.peak_size.load(Ordering::Relaxed);
        while size > peak {
            match self.peak_size.compare_exchange_weak(
                peak,
                size,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    pub fn snapshot(&self) -> TierMetrics {
        let total = self.total_response_time_us.load(Ordering::Relaxed);
        let samples = self.response_samples.load(Ordering::Relaxed);
        TierMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            total_response_time_us: total,
            response_samples: samples,
            avg_response_time_us: if samples > 0 { total / samples } else { 0 },
            current_size: self.current_size.load(Ordering::Relaxed),
            peak_size: self.peak_size.load(Ordering::Relaxed),
        }
    }

    /// Explicit reset; the only non-monotonic transition.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.total_response_time_us.store(0, Ordering::Relaxed);
        self.response_samples.store(0, Ordering::Relaxed);
        self.current_size.store(0, Ordering::Relaxed);
        self.peak_size.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time view of a tier's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Sum of response times, kept for weighted aggregation.
    pub total_response_time_us: u64,
    /// Number of timed requests behind the average.
    pub response_samples: u64,
    pub avg_response_time_us: u64,
    pub current_size: u64,
    pub peak_size: u64,
}

impl TierMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}
