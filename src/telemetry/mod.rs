//! Cache telemetry: per-tier atomic counters and aggregate snapshots.

pub mod tier_stats;

pub use tier_stats::{TierMetrics, TierStats};

use serde::Serialize;

/// Snapshot of every tier plus the coordinator-level aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub memory: TierMetrics,
    pub remote: TierMetrics,
    pub durable: TierMetrics,
    pub aggregate: TierMetrics,
}

impl CacheMetrics {
    /// Build the aggregate from per-tier snapshots.
    ///
    /// Counters sum across tiers; the mean response time is weighted by
    /// each tier's request count, not averaged over tier averages.
    pub fn from_tiers(memory: TierMetrics, remote: TierMetrics, durable: TierMetrics) -> Self {
        let tiers = [&memory, &remote, &durable];
        let hits: u64 = tiers.iter().map(|t| t.hits).sum();
        let misses: u64 = tiers.iter().map(|t| t.misses).sum();
        let evictions: u64 = tiers.iter().map(|t| t.evictions).sum();
        let total_time_us: u64 = tiers.iter().map(|t| t.total_response_time_us).sum();
        let samples: u64 = tiers.iter().map(|t| t.response_samples).sum();
        let aggregate = TierMetrics {
            hits,
            misses,
            evictions,
            total_response_time_us: total_time_us,
            response_samples: samples,
            avg_response_time_us: if samples > 0 { total_time_us / samples } else { 0 },
            current_size: tiers.iter().map(|t| t.current_size).sum(),
            peak_size: tiers.iter().map(|t| t.peak_size).sum(),
        };
        Self {
            memory,
            remote,
            durable,
            aggregate,
        }
    }
}
