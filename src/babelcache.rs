//! Simple public API for the babelcache system
//!
//! A user-friendly handle over the multi-tier coordinator. The handle
//! is an `Arc` wrapper, so clones are cheap and share the same tiers,
//! background sweep and connection pool.

use std::path::Path;
use std::sync::Arc;

use arrayvec::ArrayString;

use crate::cache::config::types::HashFunction;
use crate::cache::config::CacheConfig;
use crate::cache::coordinator::{Lookup, MultiTierCache};
use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;
use crate::cache::eviction::EvictionPolicy;
use crate::cache::fingerprint::TranslationRequest;
use crate::cache::tier::remote::{RedisStore, RemoteStore};
use crate::telemetry::CacheMetrics;

/// Multi-tier translation cache handle.
///
/// Generic over the remote store so tests and embedded deployments can
/// swap the redis client for another key/value backend.
pub struct TranslationCache<S: RemoteStore = RedisStore> {
    inner: Arc<MultiTierCache<S>>,
}

impl<S: RemoteStore> Clone for TranslationCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RemoteStore> std::fmt::Debug for TranslationCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationCache")
            .field("cache_id", &self.inner.config().cache_id)
            .finish()
    }
}

impl TranslationCache<RedisStore> {
    /// Create a cache with default configuration.
    pub async fn new() -> Result<Self, CacheError> {
        Self::builder().build().await
    }

    /// Create a cache builder with fluent configuration.
    pub fn builder() -> TranslationCacheBuilder {
        TranslationCacheBuilder::default()
    }
}

impl<S: RemoteStore> TranslationCache<S> {
    /// Read-through lookup by fingerprint key.
    pub async fn get(&self, key: &str) -> Result<Lookup, CacheError> {
        self.inner.get(key).await
    }

    /// Write-through insert; authoritative on the memory tier.
    pub async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.inner.set(entry).await
    }

    /// Upsert across every tier.
    pub async fn update(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.inner.update(entry).await
    }

    /// Remove a key from every tier.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    /// Fingerprint a request and look it up.
    pub async fn get_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<Lookup, CacheError> {
        self.inner.get_translation(request).await
    }

    /// Fingerprint a request and cache its translation. A TTL of zero
    /// uses the configured default.
    pub async fn put_translation(
        &self,
        request: &TranslationRequest,
        translation: impl Into<String>,
        confidence: f32,
        ttl_ms: u64,
    ) -> Result<CacheEntry, CacheError> {
        self.inner
            .put_translation(request, translation, confidence, ttl_ms)
            .await
    }

    /// Liveness probe without promotion or access bookkeeping.
    pub async fn contains(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.contains(key).await
    }

    /// Extend one entry's TTL, capped by configuration.
    pub async fn extend_ttl(&self, key: &str, extension_ms: u64) -> Result<u64, CacheError> {
        self.inner.extend_ttl(key, extension_ms).await
    }

    /// Preload from a frequency-sorted candidate stream.
    pub async fn warm<I>(&self, source: I, count: usize) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = CacheEntry>,
    {
        self.inner.warm(source, count).await
    }

    /// Sweep expired entries out of every tier now.
    pub fn evict_expired_all(&self) -> usize {
        self.inner.evict_expired_all()
    }

    /// Per-tier and aggregate metrics.
    pub fn metrics(&self) -> CacheMetrics {
        self.inner.metrics()
    }

    /// Persist pending durable changes before returning.
    pub async fn flush(&self) -> Result<(), CacheError> {
        self.inner.flush().await
    }

    /// Copy the durable snapshot into a backup directory.
    pub async fn backup(&self, target: &Path) -> Result<usize, CacheError> {
        self.inner.backup(target).await
    }

    /// Drop everything from the memory and durable tiers.
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        self.inner.clear_all().await
    }

    /// Memory tier occupancy.
    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn free_space(&self) -> usize {
        self.inner.free_space()
    }

    pub fn usage_percent(&self) -> f32 {
        self.inner.usage_percent()
    }

    pub fn memory_usage_bytes(&self) -> usize {
        self.inner.memory_usage_bytes()
    }

    /// Stop background work, flush with the grace deadline and tear
    /// down connections.
    pub async fn shutdown_gracefully(&self) -> Result<(), CacheError> {
        self.inner.shutdown().await
    }
}

/// Fluent builder for `TranslationCache`.
#[derive(Debug, Default)]
pub struct TranslationCacheBuilder {
    config: CacheConfig,
}

impl TranslationCacheBuilder {
    pub fn cache_id(mut self, id: impl Into<String>) -> Self {
        self.config.cache_id = id.into();
        self
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.config.memory.max_entries = max_entries;
        self
    }

    pub fn default_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.config.memory.default_ttl_ms = ttl_ms;
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.memory.eviction_policy = policy;
        self
    }

    pub fn eviction_batch_size(mut self, batch: usize) -> Self {
        self.config.memory.eviction_batch_size = batch;
        self
    }

    pub fn auto_extend_ttl(mut self, enabled: bool) -> Self {
        self.config.memory.auto_extend_ttl = enabled;
        self
    }

    pub fn normalize_text(mut self, enabled: bool) -> Self {
        self.config.fingerprint.normalize_text = enabled;
        self
    }

    pub fn hash_function(mut self, hash: HashFunction) -> Self {
        self.config.fingerprint.hash_function = hash;
        self
    }

    pub fn remote_enabled(mut self, enabled: bool) -> Self {
        self.config.remote.enabled = enabled;
        self
    }

    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.url = url.into();
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.remote.key_prefix = prefix.into();
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.remote.pool_size = size;
        self
    }

    pub fn durable_enabled(mut self, enabled: bool) -> Self {
        self.config.durable.enabled = enabled;
        self
    }

    pub fn storage_path(mut self, path: impl AsRef<str>) -> Self {
        if let Ok(p) = ArrayString::from(path.as_ref()) {
            self.config.durable.storage_path = p;
        }
        self
    }

    pub fn auto_save_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.durable.auto_save_interval_ms = interval_ms;
        self
    }

    pub fn cleanup_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.sweep.cleanup_interval_ms = interval_ms;
        self
    }

    /// Replace the whole configuration at once.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Build against the redis remote tier (or no remote tier when it
    /// is disabled in the configuration).
    pub async fn build(self) -> Result<TranslationCache<RedisStore>, CacheError> {
        let store = if self.config.remote.enabled {
            Some(RedisStore::new(self.config.remote.clone())?)
        } else {
            None
        };
        self.build_with_store(store).await
    }

    /// Build with a caller-provided remote store implementation.
    pub async fn build_with_store<S: RemoteStore>(
        self,
        store: Option<S>,
    ) -> Result<TranslationCache<S>, CacheError> {
        let inner = Arc::new(MultiTierCache::new(self.config, store).await?);
        inner.start_sweep();
        Ok(TranslationCache { inner })
    }
}
