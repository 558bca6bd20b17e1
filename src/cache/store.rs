//! In-memory entry store (L1 container)
//!
//! A capacity-bounded map of cache entries with lazy expiry and policy
//! eviction. The store is single-threaded by construction; `MemoryTier`
//! wraps it in a mutex and treats every operation as one atomic
//! transition.

use std::collections::HashMap;

use log::debug;

use crate::cache::config::types::MemoryTierConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;
use crate::cache::ttl;

/// Outcome of a strict insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    AlreadyExists,
    /// Capacity reached and eviction could not make room.
    Full,
}

/// Result of an eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionReport {
    /// Entries removed because they had expired.
    pub expired: usize,
    /// Entries removed by policy selection.
    pub evicted: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.expired + self.evicted
    }
}

/// L1 entry container.
#[derive(Debug)]
pub struct EntryStore {
    entries: HashMap<String, CacheEntry>,
    config: MemoryTierConfig,
}

impl EntryStore {
    pub fn new(config: MemoryTierConfig) -> Self {
        Self {
            entries: HashMap::with_capacity(config.max_entries.min(4096)),
            config,
        }
    }

    /// Strict insert. At capacity, evicts a batch first; `Full` only when
    /// eviction could not free a slot (e.g. everything pinned).
    pub fn add(&mut self, mut entry: CacheEntry, now_ms: u64) -> (AddOutcome, EvictionReport) {
        let mut report = EvictionReport::default();
        if self.entries.contains_key(&entry.key) {
            return (AddOutcome::AlreadyExists, report);
        }
        if self.entries.len() >= self.config.max_entries {
            report = self.evict(self.config.eviction_batch_size, now_ms);
            if self.entries.len() >= self.config.max_entries {
                return (AddOutcome::Full, report);
            }
        }
        entry.ttl_ms = ttl::resolve_ttl(entry.ttl_ms, self.config.default_ttl_ms);
        if entry.metadata.usage_count == 0 {
            entry.metadata.usage_count = 1;
        }
        if entry.metadata.last_used_ms < entry.timestamp_ms {
            entry.metadata.last_used_ms = entry.timestamp_ms;
        }
        self.entries.insert(entry.key.clone(), entry);
        (AddOutcome::Inserted, report)
    }

    /// Lookup with lazy expiry and access bookkeeping. An expired entry
    /// is removed and reported as absent; a live hit bumps `usage_count`
    /// and `last_used`, and may auto-extend a nearly-expired TTL.
    pub fn find(&mut self, key: &str, now_ms: u64) -> Option<CacheEntry> {
        match self.entries.get(key).map(|e| e.is_expired(now_ms))? {
            true => {
                debug!("entry expired on access: {}", key);
                self.entries.remove(key);
                None
            }
            false => {
                let entry = self.entries.get_mut(key)?;
                entry.touch(now_ms);
                if ttl::auto_extension_due(entry, &self.config, now_ms) {
                    let granted =
                        ttl::extend_ttl(entry, self.config.ttl_extension_ms, self.config.max_ttl_ms);
                    debug!("auto-extended ttl for {} to {} ms", key, granted);
                }
                Some(entry.clone())
            }
        }
    }

    /// Liveness check without access-side effects.
    pub fn contains(&self, key: &str, now_ms: u64) -> bool {
        self.entries
            .get(key)
            .map(|e| !e.is_expired(now_ms))
            .unwrap_or(false)
    }

    /// Peek without bookkeeping; expired entries are still invisible.
    pub fn peek(&self, key: &str, now_ms: u64) -> Option<&CacheEntry> {
        self.entries.get(key).filter(|e| !e.is_expired(now_ms))
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Replace an entry's producer-supplied fields in place. Access
    /// bookkeeping survives the update; the creation timestamp restarts
    /// because the content is a new producer version.
    pub fn update(&mut self, new_data: CacheEntry, now_ms: u64) -> Result<(), CacheError> {
        let existing = self
            .entries
            .get_mut(&new_data.key)
            .ok_or(CacheError::NotFound)?;
        let usage_count = existing.metadata.usage_count;
        let last_used_ms = existing.metadata.last_used_ms.max(now_ms);
        *existing = new_data;
        existing.timestamp_ms = now_ms;
        existing.ttl_ms = ttl::resolve_ttl(existing.ttl_ms, self.config.default_ttl_ms);
        existing.metadata.usage_count = usage_count.saturating_add(1);
        existing.metadata.last_used_ms = last_used_ms;
        Ok(())
    }

    /// Batch eviction: expired entries are harvested first at zero
    /// policy cost, then the shortfall is filled by policy selection.
    pub fn evict(&mut self, count: usize, now_ms: u64) -> EvictionReport {
        let mut report = EvictionReport {
            expired: self.clear_expired(now_ms),
            evicted: 0,
        };
        if report.expired >= count {
            return report;
        }
        let shortfall = count - report.expired;
        let victims = self
            .config
            .eviction_policy
            .pick_victims(&self.entries, shortfall);
        for key in victims {
            debug!("evicting {} ({:?})", key, self.config.eviction_policy);
            self.entries.remove(&key);
            report.evicted += 1;
        }
        report
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn clear_expired(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now_ms));
        before - self.entries.len()
    }

    /// Manually extend one entry's TTL, subject to the configured cap.
    pub fn extend_ttl(&mut self, key: &str, extension_ms: u64) -> Result<u64, CacheError> {
        let entry = self.entries.get_mut(key).ok_or(CacheError::NotFound)?;
        Ok(ttl::extend_ttl(entry, extension_ms, self.config.max_ttl_ms))
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn free_space(&self) -> usize {
        self.config.max_entries.saturating_sub(self.entries.len())
    }

    pub fn usage_percent(&self) -> f32 {
        if self.config.max_entries == 0 {
            return 0.0;
        }
        self.entries.len() as f32 * 100.0 / self.config.max_entries as f32
    }

    /// Approximate heap footprint of all live entries.
    pub fn memory_usage_bytes(&self) -> usize {
        self.entries.values().map(CacheEntry::memory_usage_bytes).sum()
    }

    /// Clone the live entries, e.g. for a durable snapshot.
    pub fn snapshot(&self, now_ms: u64) -> Vec<CacheEntry> {
        self.entries
            .values()
            .filter(|e| !e.is_expired(now_ms))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn config(&self) -> &MemoryTierConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{EntryFlags, EntryMetadata};
    use crate::cache::eviction::EvictionPolicy;

    fn small_config(max: usize) -> MemoryTierConfig {
        MemoryTierConfig {
            max_entries: max,
            eviction_batch_size: 1,
            eviction_policy: EvictionPolicy::Lru,
            auto_extend_ttl: false,
            ..MemoryTierConfig::default()
        }
    }

    fn entry(key: &str, ts: u64, ttl: u64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            source_text: format!("text {}", key),
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            translation: format!("fr {}", key),
            confidence: 0.8,
            timestamp_ms: ts,
            ttl_ms: ttl,
            flags: EntryFlags::empty(),
            metadata: EntryMetadata::new(ts),
        }
    }

    #[test]
    fn add_then_find_round_trips() {
        let mut store = EntryStore::new(small_config(8));
        let (outcome, _) = store.add(entry("en:fr:aa", 100, 60_000), 100);
        assert_eq!(outcome, AddOutcome::Inserted);
        let hit = store.find("en:fr:aa", 150).expect("hit");
        assert_eq!(hit.translation, "fr en:fr:aa");
        assert_eq!(hit.metadata.usage_count, 2);
        assert_eq!(hit.metadata.last_used_ms, 150);
    }

    #[test]
    fn duplicate_add_reports_already_exists() {
        let mut store = EntryStore::new(small_config(8));
        store.add(entry("k", 0, 1_000), 0);
        let (outcome, _) = store.add(entry("k", 0, 1_000), 0);
        assert_eq!(outcome, AddOutcome::AlreadyExists);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut store = EntryStore::new(small_config(2));
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            let now = i as u64 * 10;
            let (outcome, _) = store.add(entry(key, now, 60_000), now);
            assert_eq!(outcome, AddOutcome::Inserted);
            assert!(store.count() <= 2);
        }
    }

    #[test]
    fn lru_eviction_drops_least_recently_used() {
        let mut store = EntryStore::new(small_config(2));
        store.add(entry("e1", 0, 60_000), 0);
        store.add(entry("e2", 1, 60_000), 1);
        // Touch e1 so e2 becomes the LRU victim.
        store.find("e1", 10);
        let (outcome, report) = store.add(entry("e3", 20, 60_000), 20);
        assert_eq!(outcome, AddOutcome::Inserted);
        assert_eq!(report.evicted, 1);
        assert!(store.contains("e1", 20));
        assert!(!store.contains("e2", 20));
        assert!(store.contains("e3", 20));
    }

    #[test]
    fn expired_entries_are_invisible_and_removed_on_find() {
        let mut store = EntryStore::new(small_config(8));
        store.add(entry("k", 100, 100), 100);
        assert!(store.find("k", 150).is_some());
        assert!(store.find("k", 251).is_none());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn eviction_harvests_expired_before_policy() {
        let mut store = EntryStore::new(small_config(8));
        store.add(entry("dead", 0, 10), 0);
        store.add(entry("live", 0, 60_000), 0);
        let report = store.evict(1, 1_000);
        assert_eq!(report.expired, 1);
        assert_eq!(report.evicted, 0);
        assert!(store.contains("live", 1_000));
    }

    #[test]
    fn update_preserves_usage_bookkeeping() {
        let mut store = EntryStore::new(small_config(8));
        store.add(entry("k", 0, 60_000), 0);
        store.find("k", 10);
        let mut new_data = entry("k", 0, 30_000);
        new_data.translation = "corrected".to_string();
        store.update(new_data, 20).unwrap();
        let e = store.peek("k", 20).unwrap();
        assert_eq!(e.translation, "corrected");
        assert_eq!(e.timestamp_ms, 20);
        assert!(e.metadata.usage_count >= 2);
        assert_eq!(store.update(entry("absent", 0, 1), 0), Err(CacheError::NotFound));
    }

    #[test]
    fn extend_ttl_caps_at_configured_maximum() {
        let mut config = small_config(8);
        config.max_ttl_ms = 100_000;
        let mut store = EntryStore::new(config);
        store.add(entry("k", 0, 90_000), 0);
        assert_eq!(store.extend_ttl("k", 5_000).unwrap(), 95_000);
        assert_eq!(store.extend_ttl("k", 50_000).unwrap(), 100_000);
        assert!(store.extend_ttl("missing", 1).is_err());
    }

    #[test]
    fn auto_extension_applies_near_expiry() {
        let config = MemoryTierConfig {
            max_entries: 8,
            auto_extend_ttl: true,
            ttl_extension_threshold_ms: 500,
            ttl_extension_ms: 1_000,
            max_ttl_ms: 60_000,
            ..MemoryTierConfig::default()
        };
        let mut store = EntryStore::new(config);
        store.add(entry("k", 0, 1_000), 0);
        // Residual 400ms < threshold, extension granted.
        store.find("k", 600);
        let e = store.peek("k", 600).unwrap();
        assert_eq!(e.ttl_ms, 2_000);
    }

    #[test]
    fn snapshot_skips_expired() {
        let mut store = EntryStore::new(small_config(8));
        store.add(entry("live", 0, 60_000), 0);
        store.add(entry("dead", 0, 10), 0);
        let snap = store.snapshot(1_000);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].key, "live");
    }
}
