//! Cache entry: the unit of caching across all tiers
//!
//! Entries use owned-value semantics: every string field has a single
//! owner (the entry); copies across tiers clone into new owners.

use serde::{Deserialize, Serialize};

/// Entry flag bitset.
///
/// Stored verbatim in the durable batch format and the remote wire
/// envelope, so bit positions are part of the external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryFlags(pub u32);

impl EntryFlags {
    /// Translation produced by a cloud model.
    pub const CLOUD_ORIGIN: EntryFlags = EntryFlags(1 << 0);
    /// Translation corrected by the user.
    pub const USER_CORRECTED: EntryFlags = EntryFlags(1 << 1);
    /// Value body is lz4-compressed in the durable tier.
    pub const COMPRESSED: EntryFlags = EntryFlags(1 << 2);
    /// Entry is exempt from policy eviction.
    pub const PINNED: EntryFlags = EntryFlags(1 << 3);

    /// Empty flag set.
    #[inline]
    pub const fn empty() -> Self {
        EntryFlags(0)
    }

    #[inline]
    pub const fn contains(self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: EntryFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: EntryFlags) {
        self.0 &= !other.0;
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        EntryFlags(bits)
    }
}

impl std::ops::BitOr for EntryFlags {
    type Output = EntryFlags;

    fn bitor(self, rhs: EntryFlags) -> EntryFlags {
        EntryFlags(self.0 | rhs.0)
    }
}

/// Where a translation came from.
///
/// Replaces the opaque metadata pointer of earlier designs with a tagged
/// variant the coordinator can reason about.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryOrigin {
    #[default]
    Unknown,
    /// Produced by a named cloud model.
    CloudModel { model: String },
    /// Produced by the on-device model.
    OnDevice,
    /// Supplied or corrected by the user.
    UserCorrection,
}

/// Access-side and provenance metadata attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Times the entry has been returned as a hit. At least 1 for any
    /// reachable entry.
    pub usage_count: u64,
    /// Last access time, ms since the Unix epoch. Never below the
    /// entry's creation timestamp.
    pub last_used_ms: u64,
    /// Free-form conversational context captured at insert time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Producer provenance.
    #[serde(default)]
    pub origin: EntryOrigin,
    /// Translation domain (e.g. "medical", "travel").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl EntryMetadata {
    /// Fresh metadata for a newly inserted entry.
    pub fn new(created_ms: u64) -> Self {
        Self {
            usage_count: 1,
            last_used_ms: created_ms,
            context: None,
            origin: EntryOrigin::Unknown,
            domain: None,
        }
    }
}

/// A cached translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Stable fingerprint, `<src>:<dst>:<hex>[:<ts>]`, at most 512 bytes.
    pub key: String,
    pub source_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub translation: String,
    /// Quality claimed by the producer, in [0, 1].
    pub confidence: f32,
    /// Creation time, ms since the Unix epoch.
    pub timestamp_ms: u64,
    /// Lifetime in ms. Resolved to the configured default at insert;
    /// zero never reaches a tier.
    pub ttl_ms: u64,
    pub flags: EntryFlags,
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Whether the entry has outlived its TTL at `now_ms`.
    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) > self.ttl_ms
    }

    /// Remaining lifetime at `now_ms`. Zero once expired.
    #[inline]
    pub fn residual_ttl_ms(&self, now_ms: u64) -> u64 {
        (self.timestamp_ms + self.ttl_ms).saturating_sub(now_ms)
    }

    /// Record a hit: bump the usage counter and refresh the last-used
    /// time without letting it move backwards.
    pub fn touch(&mut self, now_ms: u64) {
        self.metadata.usage_count = self.metadata.usage_count.saturating_add(1);
        if now_ms > self.metadata.last_used_ms {
            self.metadata.last_used_ms = now_ms;
        }
    }

    /// Approximate heap footprint of the entry in bytes.
    pub fn memory_usage_bytes(&self) -> usize {
        std::mem::size_of::<CacheEntry>()
            + self.key.len()
            + self.source_text.len()
            + self.source_lang.len()
            + self.target_lang.len()
            + self.translation.len()
            + self.metadata.context.as_deref().map_or(0, str::len)
            + self.metadata.domain.as_deref().map_or(0, str::len)
    }
}
