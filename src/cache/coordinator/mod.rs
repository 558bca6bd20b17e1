//! Multi-tier coordinator
//!
//! Read-through across memory, remote and durable tiers with upward
//! promotion; write-through downward with the memory tier authoritative
//! for the caller and slower tiers best-effort. Remote and durable
//! failures degrade on read paths and are logged on write paths;
//! invalid input always surfaces.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;

use crate::cache::config::CacheConfig;
use crate::cache::entry::{CacheEntry, EntryMetadata};
use crate::cache::error::CacheError;
use crate::cache::fingerprint::{self, TranslationRequest, MAX_KEY_LEN};
use crate::cache::tier::durable::DurableTier;
use crate::cache::tier::memory::MemoryTier;
use crate::cache::tier::remote::{RemoteStore, RemoteTier};
use crate::cache::tier::TierLocation;
use crate::cache::ttl;
use crate::telemetry::{CacheMetrics, TierMetrics};

/// Outcome of a coordinator lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit {
        entry: CacheEntry,
        tier: TierLocation,
    },
    Miss,
}

impl Lookup {
    pub fn entry(self) -> Option<CacheEntry> {
        match self {
            Lookup::Hit { entry, .. } => Some(entry),
            Lookup::Miss => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit { .. })
    }
}

/// Coordinates the three cache tiers.
#[derive(Debug)]
pub struct MultiTierCache<S: RemoteStore> {
    config: CacheConfig,
    memory: MemoryTier,
    remote: Option<RemoteTier<S>>,
    durable: Option<DurableTier>,
    shutdown_tx: watch::Sender<bool>,
}

impl<S: RemoteStore> MultiTierCache<S> {
    /// Build the coordinator. The remote schema is migrated during
    /// startup; a remote that is down only disables the tier's startup
    /// migration, not the cache.
    pub async fn new(config: CacheConfig, remote_store: Option<S>) -> Result<Self, CacheError> {
        config.validate()?;

        let memory = MemoryTier::new(config.memory.clone());
        let remote = match remote_store {
            Some(store) => {
                let tier = RemoteTier::new(store, config.remote.key_prefix.clone());
                match tier.migrate_schema().await {
                    Ok(()) => {}
                    // A newer remote schema is a hard configuration
                    // error; a mere outage is not.
                    Err(err @ CacheError::SchemaTooNew { .. }) => return Err(err),
                    Err(err) => warn!("remote schema migration deferred: {}", err),
                }
                Some(tier)
            }
            None => None,
        };
        let durable = if config.durable.enabled {
            Some(DurableTier::open(config.durable.clone())?)
        } else {
            None
        };

        let (shutdown_tx, _) = watch::channel(false);
        info!(
            "multi-tier cache {} ready (remote: {}, durable: {})",
            config.cache_id,
            remote.is_some(),
            durable.is_some()
        );
        Ok(Self {
            config,
            memory,
            remote,
            durable,
            shutdown_tx,
        })
    }

    /// Spawn the background sweep that expires entries in every tier at
    /// the configured interval. Runs until shutdown.
    pub fn start_sweep(self: &Arc<Self>) {
        let cache = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval_ms = self.config.sweep.cleanup_interval_ms;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(interval_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        let removed = cache.evict_expired_all();
                        if removed > 0 {
                            debug!("sweep removed {} expired entries", removed);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
    }

    /// Read-through lookup: L1, then L2 (promoting to L1), then L3
    /// (promoting to L2 and L1). Promotion carries the entry's residual
    /// TTL because timestamp and TTL travel with it.
    pub async fn get(&self, key: &str) -> Result<Lookup, CacheError> {
        let now = ttl::now_ms();

        if let Some(entry) = self.memory.get(key, now) {
            return Ok(Lookup::Hit {
                entry,
                tier: TierLocation::Memory,
            });
        }

        if let Some(remote) = &self.remote {
            match remote.get(key, now).await {
                Ok(Some(entry)) => {
                    self.promote_to_memory(&entry, now);
                    return Ok(Lookup::Hit {
                        entry,
                        tier: TierLocation::Remote,
                    });
                }
                Ok(None) => {}
                Err(CacheError::Timeout) => return Err(CacheError::Timeout),
                Err(err) => {
                    debug!("remote read failed, degrading to durable tier: {}", err);
                }
            }
        }

        if let Some(durable) = &self.durable {
            if let Some(entry) = durable.get(key, now) {
                if let Some(remote) = &self.remote {
                    if let Err(err) = remote.set(&entry, now).await {
                        debug!("promotion to remote tier failed: {}", err);
                    }
                }
                self.promote_to_memory(&entry, now);
                return Ok(Lookup::Hit {
                    entry,
                    tier: TierLocation::Durable,
                });
            }
        }

        Ok(Lookup::Miss)
    }

    /// Write-through set. The memory tier is authoritative: its failure
    /// fails the call, slower tiers are best-effort.
    pub async fn set(&self, mut entry: CacheEntry) -> Result<(), CacheError> {
        self.validate_entry(&entry)?;
        let now = ttl::now_ms();
        if entry.timestamp_ms == 0 {
            entry.timestamp_ms = now;
        }
        entry.ttl_ms = ttl::resolve_ttl(entry.ttl_ms, self.config.memory.default_ttl_ms);
        if entry.metadata.last_used_ms < entry.timestamp_ms {
            entry.metadata.last_used_ms = entry.timestamp_ms;
        }

        self.memory.set(entry.clone(), now)?;
        self.write_through(&entry, now).await;
        Ok(())
    }

    /// Upsert across tiers. Tiers that upsert on write treat this as
    /// `set`; a missing memory entry is inserted rather than failing.
    pub async fn update(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.set(entry).await
    }

    /// Remove a key from every tier. Idempotent at each of them.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.memory.delete(key);
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.delete(key).await {
                warn!("remote delete for {} failed: {}", key, err);
            }
        }
        if let Some(durable) = &self.durable {
            durable.delete(key);
        }
        Ok(())
    }

    /// Typed lookup: fingerprint the request, then verify the stored
    /// source text so hash-colliding requests never alias.
    pub async fn get_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<Lookup, CacheError> {
        let key = fingerprint::generate_key(request, &self.config.fingerprint, ttl::now_ms())?;
        let lookup = self.get(&key).await?;
        if let Lookup::Hit { entry, tier } = lookup {
            let stored = TranslationRequest {
                source_text: entry.source_text.clone(),
                source_lang: entry.source_lang.clone(),
                target_lang: entry.target_lang.clone(),
                domain: entry.metadata.domain.clone(),
            };
            if fingerprint::hash_body(&stored, &self.config.fingerprint)
                != fingerprint::hash_body(request, &self.config.fingerprint)
            {
                warn!("fingerprint collision on {}, treating as miss", key);
                return Ok(Lookup::Miss);
            }
            return Ok(Lookup::Hit { entry, tier });
        }
        Ok(Lookup::Miss)
    }

    /// Typed insert: fingerprint the request and store the translation.
    /// Returns the entry as cached.
    pub async fn put_translation(
        &self,
        request: &TranslationRequest,
        translation: impl Into<String>,
        confidence: f32,
        ttl_ms: u64,
    ) -> Result<CacheEntry, CacheError> {
        let now = ttl::now_ms();
        let key = fingerprint::generate_key(request, &self.config.fingerprint, now)?;
        let mut metadata = EntryMetadata::new(now);
        metadata.domain = request.domain.clone();
        let entry = CacheEntry {
            key,
            source_text: request.source_text.clone(),
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
            translation: translation.into(),
            confidence,
            timestamp_ms: now,
            ttl_ms,
            flags: Default::default(),
            metadata,
        };
        self.set(entry.clone()).await?;
        Ok(entry)
    }

    /// Liveness probe across tiers without promotion or bookkeeping.
    pub async fn contains(&self, key: &str) -> Result<bool, CacheError> {
        let now = ttl::now_ms();
        if self.memory.contains(key, now) {
            return Ok(true);
        }
        if let Some(remote) = &self.remote {
            match remote.exists(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => debug!("remote exists check failed: {}", err),
            }
        }
        Ok(self
            .durable
            .as_ref()
            .map(|d| d.contains(key, now))
            .unwrap_or(false))
    }

    /// Extend one entry's TTL and push the refreshed entry downward so
    /// the slower tiers agree on the new lifetime. The propagation read
    /// must not count as an access, so it peeks past the bookkeeping.
    pub async fn extend_ttl(&self, key: &str, extension_ms: u64) -> Result<u64, CacheError> {
        let granted = self.memory.extend_ttl(key, extension_ms)?;
        let now = ttl::now_ms();
        if let Some(entry) = self.memory.peek(key, now) {
            self.write_through(&entry, now).await;
        }
        Ok(granted)
    }

    /// Cache warming: consume a frequency-sorted candidate stream and
    /// insert up to `count` entries. Returns how many were stored.
    pub async fn warm<I>(&self, source: I, count: usize) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = CacheEntry>,
    {
        let mut inserted = 0;
        for entry in source.into_iter().take(count) {
            match self.set(entry).await {
                Ok(()) => inserted += 1,
                Err(err) => warn!("cache warming skipped an entry: {}", err),
            }
        }
        info!("cache warming inserted {} entries", inserted);
        Ok(inserted)
    }

    /// Sweep expired entries from the tiers that need explicit expiry.
    /// The remote tier expires natively.
    pub fn evict_expired_all(&self) -> usize {
        let now = ttl::now_ms();
        let mut removed = self.memory.clear_expired(now);
        if let Some(durable) = &self.durable {
            removed += durable.clear_expired(now);
        }
        removed
    }

    /// Per-tier snapshots plus the request-count-weighted aggregate.
    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics::from_tiers(
            self.memory.stats().snapshot(),
            self.remote
                .as_ref()
                .map(|r| r.stats().snapshot())
                .unwrap_or_else(TierMetrics::default),
            self.durable
                .as_ref()
                .map(|d| d.stats().snapshot())
                .unwrap_or_else(TierMetrics::default),
        )
    }

    /// Fence: persist pending durable changes before returning.
    pub async fn flush(&self) -> Result<(), CacheError> {
        if let Some(durable) = &self.durable {
            durable
                .flush(Duration::from_millis(self.config.sweep.shutdown_grace_ms))
                .await?;
        }
        Ok(())
    }

    /// Copy the durable snapshot to a backup directory. Writes should
    /// be quiesced by the caller; pending changes are flushed first.
    pub async fn backup(&self, target: &std::path::Path) -> Result<usize, CacheError> {
        let durable = self
            .durable
            .as_ref()
            .ok_or_else(|| CacheError::invalid_input("durable tier is disabled"))?;
        durable
            .flush(Duration::from_millis(self.config.sweep.shutdown_grace_ms))
            .await?;
        durable.backup(target)
    }

    /// Drop every entry from the memory and durable tiers. Remote
    /// entries are left to age out through their native TTL.
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        let removed = self.memory.clear();
        if let Some(durable) = &self.durable {
            durable.clear_all()?;
        }
        if self.remote.is_some() {
            debug!("remote entries will age out via native expiry");
        }
        Ok(removed)
    }

    /// Memory tier occupancy accessors.
    pub fn count(&self) -> usize {
        self.memory.count()
    }

    pub fn free_space(&self) -> usize {
        self.memory.free_space()
    }

    pub fn usage_percent(&self) -> f32 {
        self.memory.usage_percent()
    }

    pub fn memory_usage_bytes(&self) -> usize {
        self.memory.memory_usage_bytes()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Graceful shutdown: stop background work, flush pending durable
    /// writes within the grace deadline, then tear down connections.
    pub async fn shutdown(&self) -> Result<(), CacheError> {
        let _ = self.shutdown_tx.send(true);
        let flush_result = self.flush().await;
        if let Some(durable) = &self.durable {
            durable.shutdown();
        }
        if let Some(remote) = &self.remote {
            remote.close();
        }
        info!("cache {} shut down", self.config.cache_id);
        flush_result
    }

    fn validate_entry(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        if entry.key.is_empty() {
            return Err(CacheError::invalid_input("entry key is empty"));
        }
        if entry.key.len() > MAX_KEY_LEN {
            return Err(CacheError::invalid_input("entry key exceeds 512 bytes"));
        }
        if !(0.0..=1.0).contains(&entry.confidence) {
            return Err(CacheError::invalid_input(
                "confidence must be within [0, 1]",
            ));
        }
        Ok(())
    }

    fn promote_to_memory(&self, entry: &CacheEntry, now_ms: u64) {
        // Promotion respects L1 eviction; a full pinned-only tier just
        // skips the promotion, the hit still stands.
        if let Err(err) = self.memory.set(entry.clone(), now_ms) {
            debug!("promotion to memory tier failed: {}", err);
        }
    }

    async fn write_through(&self, entry: &CacheEntry, now_ms: u64) {
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.set(entry, now_ms).await {
                warn!("remote write-through for {} failed: {}", entry.key, err);
            }
        }
        if let Some(durable) = &self.durable {
            durable.set(entry.clone(), now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::EntryFlags;
    use crate::cache::eviction::EvictionPolicy;
    use crate::cache::tier::remote::fake::FakeRemote;
    use arrayvec::ArrayString;

    fn test_config(dir: &std::path::Path, max_entries: usize) -> CacheConfig {
        let mut config = CacheConfig::default();
        config.memory.max_entries = max_entries;
        config.memory.eviction_batch_size = 1;
        config.memory.eviction_policy = EvictionPolicy::Lru;
        config.memory.auto_extend_ttl = false;
        config.durable.storage_path = ArrayString::from(dir.to_str().unwrap()).unwrap();
        config.durable.enable_auto_save = false;
        config.sweep.cleanup_interval_ms = 3_600_000;
        config
    }

    async fn cache_with_remote(
        dir: &std::path::Path,
        max_entries: usize,
    ) -> (Arc<FakeRemote>, MultiTierCache<Arc<FakeRemote>>) {
        let fake = Arc::new(FakeRemote::new());
        let cache = MultiTierCache::new(test_config(dir, max_entries), Some(Arc::clone(&fake)))
            .await
            .unwrap();
        (fake, cache)
    }

    fn entry(key: &str, translation: &str, ttl_ms: u64) -> CacheEntry {
        let now = ttl::now_ms();
        CacheEntry {
            key: key.to_string(),
            source_text: format!("source of {}", key),
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            translation: translation.to_string(),
            confidence: 0.9,
            timestamp_ms: now,
            ttl_ms,
            flags: EntryFlags::empty(),
            metadata: EntryMetadata::new(now),
        }
    }

    #[tokio::test]
    async fn set_then_get_hits_memory_first() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache) = cache_with_remote(dir.path(), 8).await;
        cache.set(entry("en:fr:aa", "bonjour", 60_000)).await.unwrap();
        match cache.get("en:fr:aa").await.unwrap() {
            Lookup::Hit { entry, tier } => {
                assert_eq!(entry.translation, "bonjour");
                assert_eq!(tier, TierLocation::Memory);
            }
            Lookup::Miss => panic!("expected hit"),
        }
        assert_eq!(cache.metrics().memory.hits, 1);
    }

    #[tokio::test]
    async fn lru_capacity_two_evicts_first_inserted() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), 2);
        // Memory-only so the slower tiers cannot mask the eviction.
        config.durable.enabled = false;
        let cache = MultiTierCache::new(config, None::<Arc<FakeRemote>>)
            .await
            .unwrap();

        cache.set(entry("en:fr:e1", "un", 60_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set(entry("en:fr:e2", "deux", 60_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set(entry("en:fr:e3", "trois", 60_000)).await.unwrap();

        assert_eq!(cache.get("en:fr:e1").await.unwrap(), Lookup::Miss);
        assert!(cache.get("en:fr:e2").await.unwrap().is_hit());
        assert!(cache.get("en:fr:e3").await.unwrap().is_hit());
        assert_eq!(cache.metrics().memory.evictions, 1);
    }

    #[tokio::test]
    async fn remote_hit_promotes_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache) = cache_with_remote(dir.path(), 8).await;
        cache.set(entry("en:fr:p", "promu", 60_000)).await.unwrap();
        // Drop the L1 copy, leaving the entry in L2/L3 only.
        cache.memory.delete("en:fr:p");

        match cache.get("en:fr:p").await.unwrap() {
            Lookup::Hit { tier, .. } => assert_eq!(tier, TierLocation::Remote),
            Lookup::Miss => panic!("expected remote hit"),
        }
        // The promotion makes the next lookup a memory hit.
        match cache.get("en:fr:p").await.unwrap() {
            Lookup::Hit { tier, .. } => assert_eq!(tier, TierLocation::Memory),
            Lookup::Miss => panic!("expected memory hit after promotion"),
        }
    }

    #[tokio::test]
    async fn durable_hit_survives_remote_outage() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, cache) = cache_with_remote(dir.path(), 8).await;
        cache.set(entry("en:fr:d", "durable", 60_000)).await.unwrap();
        cache.memory.delete("en:fr:d");
        fake.set_unavailable(true);

        match cache.get("en:fr:d").await.unwrap() {
            Lookup::Hit { tier, .. } => assert_eq!(tier, TierLocation::Durable),
            Lookup::Miss => panic!("expected durable hit"),
        }
    }

    #[tokio::test]
    async fn write_path_tolerates_remote_outage() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, cache) = cache_with_remote(dir.path(), 8).await;
        fake.set_unavailable(true);
        // Best-effort write-through: the caller still succeeds.
        cache.set(entry("en:fr:w", "ecrit", 60_000)).await.unwrap();
        assert!(cache.get("en:fr:w").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache) = cache_with_remote(dir.path(), 8).await;
        cache.set(entry("en:de:xx", "kurz", 100)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get("en:de:xx").await.unwrap(), Lookup::Miss);
        assert!(cache.metrics().memory.misses >= 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent_across_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache) = cache_with_remote(dir.path(), 8).await;
        cache.set(entry("en:fr:del", "x", 60_000)).await.unwrap();
        cache.delete("en:fr:del").await.unwrap();
        cache.delete("en:fr:del").await.unwrap();
        assert_eq!(cache.get("en:fr:del").await.unwrap(), Lookup::Miss);
    }

    #[tokio::test]
    async fn typed_round_trip_and_collision_guard() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache) = cache_with_remote(dir.path(), 8).await;
        let request = TranslationRequest::new("Good morning", "en", "fr");
        cache
            .put_translation(&request, "Bonjour", 0.95, 0)
            .await
            .unwrap();

        let hit = cache.get_translation(&request).await.unwrap();
        assert_eq!(hit.entry().unwrap().translation, "Bonjour");

        // Same key, different stored text: simulate a hash collision by
        // rewriting the stored entry's source text in place.
        let key =
            fingerprint::generate_key(&request, &cache.config.fingerprint, 0).unwrap();
        let mut forged = cache.memory.get(&key, ttl::now_ms()).unwrap();
        forged.source_text = "completely different".to_string();
        cache.memory.update(forged, ttl::now_ms()).unwrap();
        assert_eq!(
            cache.get_translation(&request).await.unwrap(),
            Lookup::Miss
        );
    }

    #[tokio::test]
    async fn warming_inserts_up_to_count() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache) = cache_with_remote(dir.path(), 16).await;
        let candidates = (0..10).map(|i| entry(&format!("en:fr:w{}", i), "v", 60_000));
        let inserted = cache.warm(candidates, 4).await.unwrap();
        assert_eq!(inserted, 4);
        assert_eq!(cache.count(), 4);
    }

    #[tokio::test]
    async fn invalid_confidence_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache) = cache_with_remote(dir.path(), 8).await;
        let mut bad = entry("en:fr:bad", "x", 60_000);
        bad.confidence = 1.5;
        assert!(matches!(
            cache.set(bad).await,
            Err(CacheError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn metrics_are_monotonic_over_operations() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache) = cache_with_remote(dir.path(), 8).await;
        let mut last_hits = 0;
        let mut last_misses = 0;
        for i in 0..6 {
            let key = format!("en:fr:m{}", i % 2);
            if i % 3 == 0 {
                cache.set(entry(&key, "v", 60_000)).await.unwrap();
            }
            let _ = cache.get(&key).await.unwrap();
            let snap = cache.metrics().aggregate;
            assert!(snap.hits >= last_hits);
            assert!(snap.misses >= last_misses);
            last_hits = snap.hits;
            last_misses = snap.misses;
        }
    }
}
