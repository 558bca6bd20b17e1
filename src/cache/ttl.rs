//! TTL semantics
//!
//! An entry is expired once `now - timestamp > ttl`. Expiry is enforced
//! lazily on every lookup and periodically by the coordinator's sweep
//! task; both paths share the helpers here.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::config::types::MemoryTierConfig;
use crate::cache::entry::CacheEntry;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Resolve a producer-supplied TTL: zero means "use the default".
#[inline]
pub fn resolve_ttl(requested_ms: u64, default_ms: u64) -> u64 {
    if requested_ms == 0 {
        default_ms
    } else {
        requested_ms
    }
}

/// Add `extension_ms` to an entry's TTL, clamped to the configured cap.
/// Returns the TTL actually granted.
pub fn extend_ttl(entry: &mut CacheEntry, extension_ms: u64, max_ttl_ms: u64) -> u64 {
    entry.ttl_ms = entry.ttl_ms.saturating_add(extension_ms).min(max_ttl_ms);
    entry.ttl_ms
}

/// Whether an access at `now_ms` should auto-extend the entry's TTL.
pub fn auto_extension_due(entry: &CacheEntry, config: &MemoryTierConfig, now_ms: u64) -> bool {
    config.auto_extend_ttl
        && entry.residual_ttl_ms(now_ms) < config.ttl_extension_threshold_ms
        && entry.ttl_ms < config.max_ttl_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{EntryFlags, EntryMetadata};

    fn entry(ts: u64, ttl: u64) -> CacheEntry {
        CacheEntry {
            key: "en:de:00000000".to_string(),
            source_text: "hi".to_string(),
            source_lang: "en".to_string(),
            target_lang: "de".to_string(),
            translation: "hallo".to_string(),
            confidence: 1.0,
            timestamp_ms: ts,
            ttl_ms: ttl,
            flags: EntryFlags::empty(),
            metadata: EntryMetadata::new(ts),
        }
    }

    #[test]
    fn zero_ttl_takes_default() {
        assert_eq!(resolve_ttl(0, 5_000), 5_000);
        assert_eq!(resolve_ttl(250, 5_000), 250);
    }

    #[test]
    fn extension_respects_cap() {
        let mut e = entry(0, 900);
        assert_eq!(extend_ttl(&mut e, 50, 1_000), 950);
        assert_eq!(extend_ttl(&mut e, 500, 1_000), 1_000);
    }

    #[test]
    fn auto_extension_triggers_near_expiry_only() {
        let config = MemoryTierConfig {
            auto_extend_ttl: true,
            ttl_extension_threshold_ms: 100,
            max_ttl_ms: 10_000,
            ..MemoryTierConfig::default()
        };
        let e = entry(0, 1_000);
        assert!(!auto_extension_due(&e, &config, 500));
        assert!(auto_extension_due(&e, &config, 950));

        let disabled = MemoryTierConfig {
            auto_extend_ttl: false,
            ..config
        };
        assert!(!auto_extension_due(&e, &disabled, 950));
    }
}
