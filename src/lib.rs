//! Babelcache - multi-tier translation cache with language detection
//!
//! A translation cache core for distributed translation devices: an
//! in-memory tier backed by a remote key-value cache and a durable
//! batch-snapshot store, plus a two-tier language detection engine.
//!
//! # Features
//!
//! - **Multi-tier architecture**: memory, remote and durable tiers with
//!   read-through promotion and best-effort write-through
//! - **Deterministic fingerprinting**: normalized FNV-1a request keys
//! - **Eviction policies**: LRU, LFU, FIFO and Random victim selection
//! - **TTL semantics**: lazy expiry, background sweeps, access extension
//! - **Crash-safe persistence**: atomically renamed batch snapshots with
//!   schema versioning and startup migration
//! - **Language detection**: statistical primary detector with a
//!   confidence model, script-range fallback, exact + pattern caches

pub mod babelcache;
pub mod prelude;

// Cache implementation modules
pub mod api;
pub mod cache;
pub mod detect;
pub(crate) mod telemetry;

// Re-export the public API at the crate root for convenience
pub use babelcache::{TranslationCache, TranslationCacheBuilder};
pub use cache::config::CacheConfig;
pub use cache::coordinator::Lookup;
pub use cache::entry::{CacheEntry, EntryFlags, EntryMetadata, EntryOrigin};
pub use cache::error::CacheError;
pub use cache::fingerprint::TranslationRequest;
pub use detect::{
    DetectOptions, DetectionResult, DetectionSource, LanguageDetector, LanguageDetectorBuilder,
};
pub use prelude::*;
