//! Memory tier (L1)
//!
//! Wraps the entry store in a coarse mutex: every operation is a single
//! critical section, so a lookup never observes a partially inserted
//! entry, access bookkeeping is never lost, and no insert can observe a
//! count above capacity. Nothing here awaits; the lock is held only for
//! in-memory work.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::cache::config::types::MemoryTierConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;
use crate::cache::store::{AddOutcome, EntryStore};
use crate::telemetry::TierStats;

/// L1 cache tier.
#[derive(Debug)]
pub struct MemoryTier {
    store: Mutex<EntryStore>,
    stats: Arc<TierStats>,
}

impl MemoryTier {
    pub fn new(config: MemoryTierConfig) -> Self {
        Self {
            store: Mutex::new(EntryStore::new(config)),
            stats: Arc::new(TierStats::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EntryStore> {
        // A poisoned store mutex means a panic mid-transition; the store
        // contents are still structurally valid entries, so recover.
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lookup with hit/miss accounting.
    pub fn get(&self, key: &str, now_ms: u64) -> Option<CacheEntry> {
        let started = Instant::now();
        let found = self.lock().find(key, now_ms);
        let elapsed = started.elapsed().as_micros() as u64;
        match &found {
            Some(_) => self.stats.record_hit(elapsed),
            None => self.stats.record_miss(elapsed),
        }
        self.publish_size();
        found
    }

    /// Upsert: insert when absent, replace content when present. Always
    /// authoritative for the caller.
    pub fn set(&self, entry: CacheEntry, now_ms: u64) -> Result<(), CacheError> {
        let mut store = self.lock();
        let (outcome, report) = store.add(entry.clone(), now_ms);
        self.stats.record_evictions(report.total() as u64);
        let result = match outcome {
            AddOutcome::Inserted => Ok(()),
            AddOutcome::AlreadyExists => store.update(entry, now_ms),
            AddOutcome::Full => Err(CacheError::Full),
        };
        self.stats.set_current_size(store.count() as u64);
        result
    }

    /// Strict insert; surfaces `AlreadyExists` instead of replacing.
    pub fn add(&self, entry: CacheEntry, now_ms: u64) -> Result<AddOutcome, CacheError> {
        let mut store = self.lock();
        let (outcome, report) = store.add(entry, now_ms);
        self.stats.record_evictions(report.total() as u64);
        self.stats.set_current_size(store.count() as u64);
        match outcome {
            AddOutcome::Full => Err(CacheError::Full),
            other => Ok(other),
        }
    }

    pub fn update(&self, entry: CacheEntry, now_ms: u64) -> Result<(), CacheError> {
        let mut store = self.lock();
        let result = store.update(entry, now_ms);
        self.stats.set_current_size(store.count() as u64);
        result
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut store = self.lock();
        let removed = store.remove(key);
        self.stats.set_current_size(store.count() as u64);
        removed
    }

    pub fn contains(&self, key: &str, now_ms: u64) -> bool {
        self.lock().contains(key, now_ms)
    }

    /// Clone a live entry without access bookkeeping or hit/miss
    /// accounting. For internal plumbing; client lookups use `get`.
    pub fn peek(&self, key: &str, now_ms: u64) -> Option<CacheEntry> {
        self.lock().peek(key, now_ms).cloned()
    }

    pub fn extend_ttl(&self, key: &str, extension_ms: u64) -> Result<u64, CacheError> {
        self.lock().extend_ttl(key, extension_ms)
    }

    /// Sweep expired entries; the count feeds the evictions counter.
    pub fn clear_expired(&self, now_ms: u64) -> usize {
        let mut store = self.lock();
        let removed = store.clear_expired(now_ms);
        self.stats.record_evictions(removed as u64);
        self.stats.set_current_size(store.count() as u64);
        removed
    }

    pub fn count(&self) -> usize {
        self.lock().count()
    }

    pub fn free_space(&self) -> usize {
        self.lock().free_space()
    }

    pub fn usage_percent(&self) -> f32 {
        self.lock().usage_percent()
    }

    pub fn memory_usage_bytes(&self) -> usize {
        self.lock().memory_usage_bytes()
    }

    pub fn snapshot(&self, now_ms: u64) -> Vec<CacheEntry> {
        self.lock().snapshot(now_ms)
    }

    pub fn clear(&self) -> usize {
        let mut store = self.lock();
        let n = store.clear();
        self.stats.set_current_size(0);
        n
    }

    pub fn stats(&self) -> &Arc<TierStats> {
        &self.stats
    }

    fn publish_size(&self) {
        self.stats.set_current_size(self.lock().count() as u64);
    }
}
