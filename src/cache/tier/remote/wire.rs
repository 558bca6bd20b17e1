//! Remote wire format
//!
//! Entries travel to the remote cache as a versioned, self-describing
//! JSON envelope. Field separation and escaping come from JSON itself;
//! the version field gates parsing so a reader never silently accepts a
//! layout it does not understand.

use serde::{Deserialize, Serialize};

use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;

/// Wire schema version, bumped on any envelope layout change.
pub const WIRE_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    v: u32,
    entry: &'a CacheEntry,
}

#[derive(Debug, Deserialize)]
struct OwnedEnvelope {
    v: u32,
    entry: CacheEntry,
}

/// Version probe decoded before the full payload, so unknown versions
/// are rejected without partially deserializing the entry.
#[derive(Debug, Deserialize)]
struct VersionProbe {
    v: u32,
}

/// Serialize an entry for the remote tier.
pub fn serialize_entry(entry: &CacheEntry) -> Result<String, CacheError> {
    serde_json::to_string(&Envelope {
        v: WIRE_VERSION,
        entry,
    })
    .map_err(|e| CacheError::invalid_format(format!("wire encode failed: {}", e)))
}

/// Parse a remote value back into an entry.
///
/// Any mismatch — malformed JSON, unknown or future version, missing
/// fields — is `InvalidFormat`; callers treat it as a miss, never a hit.
pub fn parse_entry(raw: &str) -> Result<CacheEntry, CacheError> {
    let probe: VersionProbe = serde_json::from_str(raw)
        .map_err(|e| CacheError::invalid_format(format!("wire envelope unreadable: {}", e)))?;
    if probe.v != WIRE_VERSION {
        return Err(CacheError::invalid_format(format!(
            "wire version {} not supported (expected {})",
            probe.v, WIRE_VERSION
        )));
    }
    let envelope: OwnedEnvelope = serde_json::from_str(raw)
        .map_err(|e| CacheError::invalid_format(format!("wire entry unreadable: {}", e)))?;
    Ok(envelope.entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{EntryFlags, EntryMetadata};

    fn entry() -> CacheEntry {
        CacheEntry {
            key: "en:fr:cafebabe".to_string(),
            source_text: "good \"morning\"".to_string(),
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            translation: "bonjour".to_string(),
            confidence: 0.97,
            timestamp_ms: 1_700_000_000_000,
            ttl_ms: 60_000,
            flags: EntryFlags::CLOUD_ORIGIN,
            metadata: EntryMetadata::new(1_700_000_000_000),
        }
    }

    #[test]
    fn round_trip_preserves_observable_fields() {
        let original = entry();
        let encoded = serialize_entry(&original).unwrap();
        let decoded = parse_entry(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn embedded_quotes_survive_escaping() {
        let encoded = serialize_entry(&entry()).unwrap();
        let decoded = parse_entry(&encoded).unwrap();
        assert_eq!(decoded.source_text, "good \"morning\"");
    }

    #[test]
    fn future_versions_are_rejected() {
        let encoded = serialize_entry(&entry()).unwrap();
        let bumped = encoded.replacen("\"v\":1", "\"v\":99", 1);
        assert!(matches!(
            parse_entry(&bumped),
            Err(CacheError::InvalidFormat(_))
        ));
    }

    #[test]
    fn garbage_is_invalid_format_not_a_hit() {
        assert!(matches!(
            parse_entry("not json at all"),
            Err(CacheError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_entry("{\"v\":1}"),
            Err(CacheError::InvalidFormat(_))
        ));
    }
}
