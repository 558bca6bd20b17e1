//! Eviction policies
//!
//! Victim selection is a closed sum type: the policy set is fixed at
//! configuration time and consumers never plug in their own. Selection
//! never removes entries itself; the store owns mutation.

use std::collections::HashMap;

use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::cache::entry::{CacheEntry, EntryFlags};

/// Victim selection rule for a tier at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used: minimal `last_used`, ties broken by creation
    /// time, then key order.
    #[default]
    Lru,
    /// Least frequently used: minimal `usage_count`, ties broken as LRU.
    Lfu,
    /// Oldest first: minimal creation time, ties broken by key order.
    Fifo,
    /// Uniform sample without replacement.
    Random,
}

impl EvictionPolicy {
    /// Select up to `n` victim keys from `entries`.
    ///
    /// Pinned entries are never selected. The returned keys are owned so
    /// the caller can mutate the map while consuming them.
    pub fn pick_victims(&self, entries: &HashMap<String, CacheEntry>, n: usize) -> Vec<String> {
        if n == 0 || entries.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<&CacheEntry> = entries
            .values()
            .filter(|e| !e.flags.contains(EntryFlags::PINNED))
            .collect();

        if let EvictionPolicy::Random = self {
            let mut rng = rand::thread_rng();
            let take = n.min(candidates.len());
            return index::sample(&mut rng, candidates.len(), take)
                .into_iter()
                .map(|i| candidates[i].key.clone())
                .collect();
        }

        candidates.sort_unstable_by(|a, b| match self {
            EvictionPolicy::Lru => a
                .metadata
                .last_used_ms
                .cmp(&b.metadata.last_used_ms)
                .then(a.timestamp_ms.cmp(&b.timestamp_ms))
                .then(a.key.cmp(&b.key)),
            EvictionPolicy::Lfu => a
                .metadata
                .usage_count
                .cmp(&b.metadata.usage_count)
                .then(a.metadata.last_used_ms.cmp(&b.metadata.last_used_ms))
                .then(a.timestamp_ms.cmp(&b.timestamp_ms))
                .then(a.key.cmp(&b.key)),
            EvictionPolicy::Fifo => a.timestamp_ms.cmp(&b.timestamp_ms).then(a.key.cmp(&b.key)),
            EvictionPolicy::Random => unreachable!("handled above"),
        });

        candidates
            .into_iter()
            .take(n)
            .map(|e| e.key.clone())
            .collect()
    }
}
