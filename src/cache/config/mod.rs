//! Cache configuration
//!
//! `CacheConfig` aggregates per-tier configs and validates the
//! cross-tier constraints that individual tiers cannot check alone.

pub mod types;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use types::{
    DurableTierConfig, FingerprintConfig, HashFunction, MemoryTierConfig, RemoteTierConfig,
    SweepConfig,
};

use crate::cache::error::CacheError;

/// Top-level cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Identifies this cache instance in logs and storage paths.
    pub cache_id: String,
    pub fingerprint: FingerprintConfig,
    pub memory: MemoryTierConfig,
    pub remote: RemoteTierConfig,
    pub durable: DurableTierConfig,
    pub sweep: SweepConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_id: Uuid::new_v4().to_string(),
            fingerprint: FingerprintConfig::default(),
            memory: MemoryTierConfig::default(),
            remote: RemoteTierConfig::default(),
            durable: DurableTierConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Validate cross-field constraints before any tier is built.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.memory.max_entries == 0 {
            return Err(CacheError::invalid_input("memory.max_entries must be > 0"));
        }
        if self.memory.eviction_batch_size == 0 {
            return Err(CacheError::invalid_input(
                "memory.eviction_batch_size must be > 0",
            ));
        }
        if self.memory.eviction_batch_size > self.memory.max_entries {
            return Err(CacheError::invalid_input(
                "memory.eviction_batch_size exceeds memory.max_entries",
            ));
        }
        if self.memory.default_ttl_ms == 0 {
            return Err(CacheError::invalid_input(
                "memory.default_ttl_ms must be > 0",
            ));
        }
        if self.remote.enabled {
            if self.remote.pool_size == 0 {
                return Err(CacheError::invalid_input("remote.pool_size must be > 0"));
            }
            if !self.remote.url.starts_with("redis://") && !self.remote.url.starts_with("rediss://")
            {
                return Err(CacheError::invalid_input(
                    "remote.url must be a redis:// or rediss:// URL",
                ));
            }
            if self.remote.key_prefix.is_empty() {
                return Err(CacheError::invalid_input("remote.key_prefix is empty"));
            }
        }
        if self.durable.enabled {
            if self.durable.storage_path.is_empty() {
                return Err(CacheError::invalid_input("durable.storage_path is empty"));
            }
            if self.durable.max_batch_size == 0 {
                return Err(CacheError::invalid_input(
                    "durable.max_batch_size must be > 0",
                ));
            }
        }
        if self.sweep.cleanup_interval_ms == 0 {
            return Err(CacheError::invalid_input(
                "sweep.cleanup_interval_ms must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut config = CacheConfig::default();
        config.memory.max_entries = 0;
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_batch_larger_than_capacity() {
        let mut config = CacheConfig::default();
        config.memory.max_entries = 4;
        config.memory.eviction_batch_size = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_redis_url() {
        let mut config = CacheConfig::default();
        config.remote.url = "http://localhost".to_string();
        assert!(config.validate().is_err());
    }
}
