//! Batch snapshot file format
//!
//! Little-endian, fixed layout shared with external tooling:
//!
//! ```text
//! magic    u32 = 0x54434C42 ("TCLB")
//! version  u32
//! count    u32
//! repeat count times:
//!   key_len   u32
//!   value_len u32
//!   key bytes
//!   value bytes
//!   timestamp u64
//!   ttl       u32
//!   flags     u32
//! ```
//!
//! The value bytes are a JSON body carrying the fields the container
//! does not; bodies at or above the compression threshold are stored
//! lz4-compressed with the COMPRESSED flag bit set.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cache::config::types::DurableTierConfig;
use crate::cache::entry::{CacheEntry, EntryFlags, EntryMetadata};
use crate::cache::error::CacheError;

/// "TCLB"
pub const BATCH_MAGIC: u32 = 0x5443_4C42;

/// Container layout version written into new batch files. Version 1
/// files (unpadded-name era) share the entry layout and stay readable.
pub const BATCH_VERSION: u32 = 2;
const OLDEST_READABLE_VERSION: u32 = 1;

/// Batch suffixes are decimal milliseconds zero-padded to this width so
/// lexicographic order matches numeric order.
pub const SUFFIX_WIDTH: usize = 13;

const MAX_VALUE_LEN: u32 = 16 * 1024 * 1024;
const MAX_KEY_LEN: u32 = 512;

/// Per-entry payload stored in the value bytes.
#[derive(Debug, Serialize, Deserialize)]
struct ValueBody {
    source_text: String,
    source_lang: String,
    target_lang: String,
    translation: String,
    confidence: f32,
    metadata: EntryMetadata,
}

/// Encode a batch of entries into the on-disk layout.
pub fn encode_batch(entries: &[CacheEntry], config: &DurableTierConfig) -> Result<Vec<u8>, CacheError> {
    let mut buf = Vec::with_capacity(64 + entries.len() * 256);
    buf.extend_from_slice(&BATCH_MAGIC.to_le_bytes());
    buf.extend_from_slice(&BATCH_VERSION.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    for entry in entries {
        let body = ValueBody {
            source_text: entry.source_text.clone(),
            source_lang: entry.source_lang.clone(),
            target_lang: entry.target_lang.clone(),
            translation: entry.translation.clone(),
            confidence: entry.confidence,
            metadata: entry.metadata.clone(),
        };
        let json = serde_json::to_vec(&body)
            .map_err(|e| CacheError::invalid_format(format!("batch encode failed: {}", e)))?;

        let mut flags = entry.flags;
        flags.remove(EntryFlags::COMPRESSED);
        let value = if config.enable_compression && json.len() >= config.compression_threshold_bytes
        {
            flags.insert(EntryFlags::COMPRESSED);
            lz4_flex::compress_prepend_size(&json)
        } else {
            json
        };

        buf.extend_from_slice(&(entry.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(entry.key.as_bytes());
        buf.extend_from_slice(&value);
        buf.extend_from_slice(&entry.timestamp_ms.to_le_bytes());
        buf.extend_from_slice(&(entry.ttl_ms.min(u32::MAX as u64) as u32).to_le_bytes());
        buf.extend_from_slice(&flags.bits().to_le_bytes());
    }
    Ok(buf)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        if end > self.data.len() {
            return None;
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8).map(|b| u64::from_le_bytes(b.try_into().unwrap()))
    }
}

/// Decode a batch file.
///
/// A bad header is an error (the caller skips the file). A truncated
/// body is not: decoding stops at the last intact entry, which is the
/// crash-recovery contract for files that lost their tail.
pub fn decode_batch(data: &[u8]) -> Result<Vec<CacheEntry>, CacheError> {
    let mut cur = Cursor { data, pos: 0 };
    let magic = cur
        .u32()
        .ok_or_else(|| CacheError::invalid_format("batch header truncated"))?;
    if magic != BATCH_MAGIC {
        return Err(CacheError::invalid_format(format!(
            "bad batch magic {:#010x}",
            magic
        )));
    }
    let version = cur
        .u32()
        .ok_or_else(|| CacheError::invalid_format("batch header truncated"))?;
    if !(OLDEST_READABLE_VERSION..=BATCH_VERSION).contains(&version) {
        return Err(CacheError::invalid_format(format!(
            "unsupported batch version {}",
            version
        )));
    }
    let count = cur
        .u32()
        .ok_or_else(|| CacheError::invalid_format("batch header truncated"))?;

    let mut entries = Vec::with_capacity(count.min(65_536) as usize);
    for _ in 0..count {
        let entry = match decode_entry(&mut cur) {
            Some(entry) => entry,
            None => {
                debug!(
                    "batch truncated after {} of {} entries, keeping intact prefix",
                    entries.len(),
                    count
                );
                break;
            }
        };
        match entry {
            Ok(e) => entries.push(e),
            Err(err) => {
                // Structurally intact but semantically unreadable entry;
                // skip it rather than losing the rest of the batch.
                warn!("skipping unreadable batch entry: {}", err);
            }
        }
    }
    Ok(entries)
}

/// `None` means truncation (stop); `Some(Err)` means a decodable frame
/// with an unreadable body (skip).
fn decode_entry(cur: &mut Cursor<'_>) -> Option<Result<CacheEntry, CacheError>> {
    let key_len = cur.u32()?;
    let value_len = cur.u32()?;
    if key_len > MAX_KEY_LEN || value_len > MAX_VALUE_LEN {
        // Lengths this size mean the frame stream is garbage; treat as
        // truncation so the intact prefix survives.
        return None;
    }
    let key_bytes = cur.take(key_len as usize)?.to_vec();
    let value_bytes = cur.take(value_len as usize)?.to_vec();
    let timestamp_ms = cur.u64()?;
    let ttl = cur.u32()?;
    let flags = EntryFlags::from_bits(cur.u32()?);

    Some(build_entry(key_bytes, value_bytes, timestamp_ms, ttl, flags))
}

fn build_entry(
    key_bytes: Vec<u8>,
    value_bytes: Vec<u8>,
    timestamp_ms: u64,
    ttl: u32,
    mut flags: EntryFlags,
) -> Result<CacheEntry, CacheError> {
    let key = String::from_utf8(key_bytes)
        .map_err(|_| CacheError::invalid_format("batch key is not utf-8"))?;
    let json = if flags.contains(EntryFlags::COMPRESSED) {
        flags.remove(EntryFlags::COMPRESSED);
        lz4_flex::decompress_size_prepended(&value_bytes)
            .map_err(|e| CacheError::invalid_format(format!("batch value decompress: {}", e)))?
    } else {
        value_bytes
    };
    let body: ValueBody = serde_json::from_slice(&json)
        .map_err(|e| CacheError::invalid_format(format!("batch value unreadable: {}", e)))?;
    Ok(CacheEntry {
        key,
        source_text: body.source_text,
        source_lang: body.source_lang,
        target_lang: body.target_lang,
        translation: body.translation,
        confidence: body.confidence,
        timestamp_ms,
        ttl_ms: ttl as u64,
        flags,
        metadata: body.metadata,
    })
}

/// File name for a batch written at `now_ms`.
pub fn batch_file_name(now_ms: u64) -> String {
    format!("batch_{:0width$}.bin", now_ms, width = SUFFIX_WIDTH)
}

/// Stage-and-rename write: the batch becomes visible only after the
/// rename of its `.tmp`, so readers never observe a partial file under
/// its final name.
pub fn write_batch_file(
    dir: &Path,
    entries: &[CacheEntry],
    config: &DurableTierConfig,
    now_ms: u64,
) -> Result<PathBuf, CacheError> {
    let data = encode_batch(entries, config)?;
    let final_path = dir.join(batch_file_name(now_ms));
    let tmp_path = final_path.with_extension("bin.tmp");

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, &final_path)?;
    Ok(final_path)
}

/// Batch files in the directory, newest first by suffix.
pub fn list_batches(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let mut found: Vec<(u64, PathBuf)> = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        let name = item.file_name();
        let name = name.to_string_lossy();
        if let Some(ms) = name
            .strip_prefix("batch_")
            .and_then(|rest| rest.strip_suffix(".bin"))
            .and_then(|digits| digits.parse::<u64>().ok())
        {
            found.push((ms, item.path()));
        }
    }
    found.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(found.into_iter().map(|(_, p)| p).collect())
}

/// Load the most recent readable batch. Files with corrupted headers
/// are logged and skipped in favor of the next older one.
pub fn load_newest(dir: &Path) -> Result<Vec<CacheEntry>, CacheError> {
    for path in list_batches(dir)? {
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                warn!("cannot read batch file {}: {}", path.display(), err);
                continue;
            }
        };
        match decode_batch(&data) {
            Ok(entries) => {
                debug!("loaded {} entries from {}", entries.len(), path.display());
                return Ok(entries);
            }
            Err(err) => {
                warn!("skipping corrupt batch file {}: {}", path.display(), err);
            }
        }
    }
    Ok(Vec::new())
}

/// Remove leftover staging files from an interrupted save.
pub fn remove_stale_tmp_files(dir: &Path) {
    if let Ok(items) = fs::read_dir(dir) {
        for item in items.flatten() {
            if item.file_name().to_string_lossy().ends_with(".tmp") {
                debug!("removing stale staging file {:?}", item.file_name());
                let _ = fs::remove_file(item.path());
            }
        }
    }
}
