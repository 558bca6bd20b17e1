//! Remote tier (L2)
//!
//! Treats the remote cache as an opaque key/value store with native TTL
//! expiry. The coordinator depends on the `RemoteStore` capability
//! contract, not on a concrete client, so the production redis client
//! and the in-memory test double are interchangeable.

pub mod pool;
pub mod wire;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};

use crate::cache::config::types::RemoteTierConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;
use crate::telemetry::TierStats;

use pool::ConnectionPool;

/// Remote schema version; bumped when the key layout changes.
pub const REMOTE_SCHEMA_VERSION: u32 = 1;

/// Capability contract for the remote key/value store.
pub trait RemoteStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;
    fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;
    /// Upsert without expiry; used for schema introspection keys.
    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;
    fn del(&self, key: &str) -> impl Future<Output = Result<(), CacheError>> + Send;
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;
    /// Stop issuing commands; idempotent.
    fn close(&self);
}

/// Production `RemoteStore` backed by the bounded connection pool.
#[derive(Debug)]
pub struct RedisStore {
    pool: ConnectionPool,
}

impl RedisStore {
    pub fn new(config: RemoteTierConfig) -> Result<Self, CacheError> {
        Ok(Self {
            pool: ConnectionPool::new(config)?,
        })
    }
}

impl RemoteStore for RedisStore {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send {
        let cmd = {
            let mut c = redis::cmd("GET");
            c.arg(key);
            c
        };
        async move { self.pool.command::<Option<String>>(&cmd).await }
    }

    fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), CacheError>> + Send {
        let cmd = {
            let mut c = redis::cmd("SET");
            c.arg(key).arg(value).arg("EX").arg(ttl_secs);
            c
        };
        async move { self.pool.command::<()>(&cmd).await }
    }

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), CacheError>> + Send {
        let cmd = {
            let mut c = redis::cmd("SET");
            c.arg(key).arg(value);
            c
        };
        async move { self.pool.command::<()>(&cmd).await }
    }

    fn del(&self, key: &str) -> impl Future<Output = Result<(), CacheError>> + Send {
        let cmd = {
            let mut c = redis::cmd("DEL");
            c.arg(key);
            c
        };
        async move { self.pool.command::<()>(&cmd).await }
    }

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send {
        let cmd = {
            let mut c = redis::cmd("EXISTS");
            c.arg(key);
            c
        };
        async move { self.pool.command::<bool>(&cmd).await }
    }

    fn close(&self) {
        self.pool.close();
    }
}

/// L2 cache tier over any `RemoteStore`.
#[derive(Debug)]
pub struct RemoteTier<S: RemoteStore> {
    store: S,
    prefix: String,
    stats: Arc<TierStats>,
}

impl<S: RemoteStore> RemoteTier<S> {
    pub fn new(store: S, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: key_prefix.into(),
            stats: Arc::new(TierStats::new()),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn meta_key(&self, name: &str) -> String {
        format!("{}meta:{}", self.prefix, name)
    }

    /// Fetch and parse an entry. Unparseable or stale payloads are
    /// logged and reported as a miss; transport errors surface so the
    /// coordinator can degrade to the next tier.
    pub async fn get(&self, key: &str, now_ms: u64) -> Result<Option<CacheEntry>, CacheError> {
        let started = Instant::now();
        let raw = match self.store.get(&self.full_key(key)).await {
            Ok(raw) => raw,
            Err(err) => {
                self.stats.record_miss(started.elapsed().as_micros() as u64);
                return Err(err);
            }
        };
        let elapsed = started.elapsed().as_micros() as u64;
        match raw {
            Some(raw) => match wire::parse_entry(&raw) {
                // The remote store expires natively, but clocks differ;
                // never return an entry past its own TTL.
                Ok(entry) if !entry.is_expired(now_ms) => {
                    self.stats.record_hit(elapsed);
                    Ok(Some(entry))
                }
                Ok(_) => {
                    self.stats.record_miss(elapsed);
                    Ok(None)
                }
                Err(err) => {
                    warn!("remote entry for {} unreadable, treating as miss: {}", key, err);
                    self.stats.record_miss(elapsed);
                    Ok(None)
                }
            },
            None => {
                self.stats.record_miss(elapsed);
                Ok(None)
            }
        }
    }

    /// Write an entry with its residual TTL as the native expiry.
    /// Already-expired entries are skipped. Updates are overwrites.
    pub async fn set(&self, entry: &CacheEntry, now_ms: u64) -> Result<(), CacheError> {
        let residual_ms = entry.residual_ttl_ms(now_ms);
        if residual_ms == 0 {
            return Ok(());
        }
        let ttl_secs = (residual_ms / 1000).max(1);
        let value = wire::serialize_entry(entry)?;
        self.store
            .set_ex(&self.full_key(&entry.key), &value, ttl_secs)
            .await
    }

    /// Idempotent delete.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.del(&self.full_key(key)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.store.exists(&self.full_key(key)).await
    }

    /// Run remote schema migration: read the stored version, refuse
    /// anything newer than this build, then apply the missing steps and
    /// bump the version key.
    pub async fn migrate_schema(&self) -> Result<(), CacheError> {
        let stored = match self.store.get(&self.meta_key("version")).await? {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                warn!("remote schema version {:?} unreadable, assuming 0", raw);
                0
            }),
            None => 0,
        };
        if stored > REMOTE_SCHEMA_VERSION {
            return Err(CacheError::SchemaTooNew {
                stored,
                supported: REMOTE_SCHEMA_VERSION,
            });
        }
        if stored < REMOTE_SCHEMA_VERSION {
            info!(
                "migrating remote schema from version {} to {}",
                stored, REMOTE_SCHEMA_VERSION
            );
            if stored < 1 {
                // Schema registry key; never expires.
                self.store
                    .set(&self.meta_key("schemas"), "[\"translation\"]")
                    .await?;
            }
            self.store
                .set(&self.meta_key("version"), &REMOTE_SCHEMA_VERSION.to_string())
                .await?;
        }
        Ok(())
    }

    /// Check the introspection keys written by `migrate_schema`.
    pub async fn validate_schema(&self) -> Result<bool, CacheError> {
        let version = self.store.exists(&self.meta_key("version")).await?;
        let schemas = self.store.exists(&self.meta_key("schemas")).await?;
        Ok(version && schemas)
    }

    pub fn stats(&self) -> &Arc<TierStats> {
        &self.stats
    }

    pub fn close(&self) {
        self.store.close();
    }
}
