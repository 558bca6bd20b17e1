//! Durable store metadata file
//!
//! `metadata.bin` carries the schema version and save bookkeeping:
//!
//! ```text
//! magic          u32 = 0x54434C4D ("TCLM")
//! schema_version u32
//! total_entries  u64
//! total_saves    u64
//! last_save_ms   u64
//! ```
//!
//! Written with the same stage-and-rename discipline as batch files.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::cache::error::CacheError;

/// "TCLM"
pub const METADATA_MAGIC: u32 = 0x5443_4C4D;
pub const METADATA_FILE: &str = "metadata.bin";

/// Decoded metadata state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageMetadata {
    pub schema_version: u32,
    pub total_entries: u64,
    pub total_saves: u64,
    pub last_save_ms: u64,
}

impl StorageMetadata {
    pub fn fresh(schema_version: u32) -> Self {
        Self {
            schema_version,
            total_entries: 0,
            total_saves: 0,
            last_save_ms: 0,
        }
    }
}

/// Read `metadata.bin` from the storage root. `Ok(None)` on first run.
pub fn read_metadata(root: &Path) -> Result<Option<StorageMetadata>, CacheError> {
    let path = root.join(METADATA_FILE);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if data.len() < 32 {
        return Err(CacheError::invalid_format("metadata file truncated"));
    }
    let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
    if magic != METADATA_MAGIC {
        return Err(CacheError::invalid_format(format!(
            "bad metadata magic {:#010x}",
            magic
        )));
    }
    Ok(Some(StorageMetadata {
        schema_version: u32::from_le_bytes(data[4..8].try_into().unwrap()),
        total_entries: u64::from_le_bytes(data[8..16].try_into().unwrap()),
        total_saves: u64::from_le_bytes(data[16..24].try_into().unwrap()),
        last_save_ms: u64::from_le_bytes(data[24..32].try_into().unwrap()),
    }))
}

/// Write `metadata.bin` atomically.
pub fn write_metadata(root: &Path, meta: &StorageMetadata) -> Result<(), CacheError> {
    let mut buf = Vec::with_capacity(32);
    buf.extend_from_slice(&METADATA_MAGIC.to_le_bytes());
    buf.extend_from_slice(&meta.schema_version.to_le_bytes());
    buf.extend_from_slice(&meta.total_entries.to_le_bytes());
    buf.extend_from_slice(&meta.total_saves.to_le_bytes());
    buf.extend_from_slice(&meta.last_save_ms.to_le_bytes());

    let final_path = root.join(METADATA_FILE);
    let tmp_path = root.join("metadata.bin.tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}
