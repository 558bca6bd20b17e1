//! Core configuration types for the cache tiers
//!
//! Tier configs are plain serde structs so deployments can load them
//! from JSON alongside the rest of the device configuration.

use arrayvec::ArrayString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cache::eviction::EvictionPolicy;

/// Custom ArrayString serialization module
mod arraystring_serde {
    use super::*;

    pub fn serialize<S>(value: &ArrayString<256>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_str().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ArrayString<256>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ArrayString::from(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash function used for request fingerprints.
///
/// Fingerprints are a wire-stable external format, so only seedless
/// algorithms are eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HashFunction {
    /// 32-bit FNV-1a, eight hex digits in the key.
    #[default]
    #[serde(rename = "fnv1a")]
    Fnv1a,
    /// 128-bit FNV-1a for collision resistance, thirty-two hex digits.
    #[serde(rename = "fnv1a128")]
    Fnv1a128,
}

/// Fingerprint generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Normalize source text (trim, collapse whitespace, lowercase)
    /// before hashing.
    pub normalize_text: bool,
    pub hash_function: HashFunction,
    /// Append the creation timestamp to the key, making every request
    /// unique. Cache-bypass use cases only.
    pub include_timestamp: bool,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            normalize_text: true,
            hash_function: HashFunction::Fnv1a,
            include_timestamp: false,
        }
    }
}

/// Memory tier (L1) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryTierConfig {
    /// Hard entry-count ceiling. Inserts at capacity evict first.
    pub max_entries: usize,
    /// Applied when an entry arrives with `ttl_ms == 0`.
    pub default_ttl_ms: u64,
    pub eviction_policy: EvictionPolicy,
    /// Victims selected per eviction pass.
    pub eviction_batch_size: usize,
    /// Extend TTL on access when the residual lifetime is low.
    pub auto_extend_ttl: bool,
    /// Residual TTL below which an access triggers extension.
    pub ttl_extension_threshold_ms: u64,
    /// Extension added per trigger.
    pub ttl_extension_ms: u64,
    /// Cap on an entry's total TTL after extensions.
    pub max_ttl_ms: u64,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            default_ttl_ms: 24 * 60 * 60 * 1000,
            eviction_policy: EvictionPolicy::Lru,
            eviction_batch_size: 10,
            auto_extend_ttl: true,
            ttl_extension_threshold_ms: 60 * 60 * 1000,
            ttl_extension_ms: 6 * 60 * 60 * 1000,
            max_ttl_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

/// Remote tier (L2) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTierConfig {
    pub enabled: bool,
    /// `redis://` or `rediss://` (TLS) connection URL.
    pub url: String,
    /// Prepended to every cache key.
    pub key_prefix: String,
    /// Fixed number of pooled connections.
    pub pool_size: usize,
    /// Per-command deadline.
    pub command_timeout_ms: u64,
    /// How long a caller may queue for a connection before `Busy`.
    pub acquire_timeout_ms: u64,
    /// Consecutive errors after which a connection is retired.
    pub max_error_count: u32,
}

impl Default for RemoteTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "tcl:".to_string(),
            pool_size: 4,
            command_timeout_ms: 2_000,
            acquire_timeout_ms: 1_000,
            max_error_count: 3,
        }
    }
}

/// Durable tier (L3) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableTierConfig {
    pub enabled: bool,
    /// Storage root; created on first run.
    #[serde(with = "arraystring_serde")]
    pub storage_path: ArrayString<256>,
    pub enable_auto_save: bool,
    /// Interval between automatic saves.
    pub auto_save_interval_ms: u64,
    /// Pending-change count that forces an early save.
    pub max_batch_size: usize,
    /// Compress large translation values inside batch files.
    pub enable_compression: bool,
    /// Values at or above this size are compressed.
    pub compression_threshold_bytes: usize,
}

impl Default for DurableTierConfig {
    fn default() -> Self {
        let mut storage_path = ArrayString::new();
        // Infallible: the literal is far below the 256-byte capacity.
        let _ = storage_path.try_push_str("babelcache_data");
        Self {
            enabled: true,
            storage_path,
            enable_auto_save: true,
            auto_save_interval_ms: 60_000,
            max_batch_size: 256,
            enable_compression: true,
            compression_threshold_bytes: 512,
        }
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Interval between expired-entry sweeps.
    pub cleanup_interval_ms: u64,
    /// Grace deadline for flushing pending writes at shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: 60_000,
            shutdown_grace_ms: 5_000,
        }
    }
}
