//! Babelcache prelude - convenient imports for users
//!
//! Everything needed to configure and drive the cache and the
//! detection engine in one import.

// Re-export the public API
pub use crate::babelcache::{TranslationCache, TranslationCacheBuilder};

// Cache types users interact with
pub use crate::cache::config::types::{
    DurableTierConfig, FingerprintConfig, HashFunction, MemoryTierConfig, RemoteTierConfig,
};
pub use crate::cache::config::CacheConfig;
pub use crate::cache::coordinator::Lookup;
pub use crate::cache::entry::{CacheEntry, EntryFlags, EntryMetadata, EntryOrigin};
pub use crate::cache::error::CacheError;
pub use crate::cache::eviction::EvictionPolicy;
pub use crate::cache::fingerprint::TranslationRequest;
pub use crate::cache::tier::remote::{RedisStore, RemoteStore};
pub use crate::cache::tier::TierLocation;
pub use crate::telemetry::{CacheMetrics, TierMetrics};

// Detection engine surface
pub use crate::detect::{
    DetectOptions, DetectionCacheConfig, DetectionMode, DetectionResult, DetectionSource,
    DetectionStats, LanguageDetector, LanguageDetectorBuilder,
};
