//! Durable schema migration
//!
//! A single schema version integer lives in `metadata.bin`. On open,
//! stored versions older than the code run the missing migrations in
//! order; a stored version newer than the code refuses to start.
//! Each migration is idempotent: re-running it on already-migrated
//! state is a no-op.

use std::fs;
use std::path::Path;

use log::info;

use crate::cache::error::CacheError;
use crate::cache::tier::durable::batch::{batch_file_name, SUFFIX_WIDTH};
use crate::cache::tier::durable::metadata::{self, StorageMetadata};

/// Schema version written by this build.
pub const DURABLE_SCHEMA_VERSION: u32 = 2;

/// Reconcile the stored schema with the code version. Returns the
/// up-to-date metadata.
pub fn reconcile_schema(root: &Path) -> Result<StorageMetadata, CacheError> {
    let mut meta = match metadata::read_metadata(root)? {
        Some(meta) => meta,
        None => {
            let fresh = StorageMetadata::fresh(DURABLE_SCHEMA_VERSION);
            metadata::write_metadata(root, &fresh)?;
            return Ok(fresh);
        }
    };

    if meta.schema_version > DURABLE_SCHEMA_VERSION {
        return Err(CacheError::SchemaTooNew {
            stored: meta.schema_version,
            supported: DURABLE_SCHEMA_VERSION,
        });
    }

    while meta.schema_version < DURABLE_SCHEMA_VERSION {
        let target = meta.schema_version + 1;
        info!("migrating durable schema to version {}", target);
        run_migration(root, target)?;
        meta.schema_version = target;
        metadata::write_metadata(root, &meta)?;
    }
    Ok(meta)
}

fn run_migration(root: &Path, target: u32) -> Result<(), CacheError> {
    match target {
        // v1 -> v2: batch suffixes become fixed-width so lexicographic
        // order matches numeric order. Entry layout is unchanged.
        2 => pad_batch_suffixes(root),
        other => Err(CacheError::Internal(format!(
            "no migration step defined for schema version {}",
            other
        ))),
    }
}

fn pad_batch_suffixes(root: &Path) -> Result<(), CacheError> {
    for item in fs::read_dir(root)? {
        let item = item?;
        let name = item.file_name();
        let name = name.to_string_lossy().into_owned();
        let suffix_ms = match name
            .strip_prefix("batch_")
            .and_then(|rest| rest.strip_suffix(".bin"))
        {
            Some(d) if d.len() < SUFFIX_WIDTH => match d.parse::<u64>() {
                Ok(ms) => ms,
                Err(_) => continue,
            },
            _ => continue,
        };
        let padded = batch_file_name(suffix_ms);
        info!("renaming batch file {} -> {}", name, padded);
        fs::rename(item.path(), root.join(padded))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tier::durable::metadata::{read_metadata, write_metadata};

    #[test]
    fn fresh_directory_starts_at_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let meta = reconcile_schema(dir.path()).unwrap();
        assert_eq!(meta.schema_version, DURABLE_SCHEMA_VERSION);
        assert_eq!(
            read_metadata(dir.path()).unwrap().unwrap().schema_version,
            DURABLE_SCHEMA_VERSION
        );
    }

    #[test]
    fn old_version_migrates_and_pads_batch_names() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(dir.path(), &StorageMetadata::fresh(1)).unwrap();
        fs::write(dir.path().join("batch_1234.bin"), b"x").unwrap();

        let meta = reconcile_schema(dir.path()).unwrap();
        assert_eq!(meta.schema_version, DURABLE_SCHEMA_VERSION);
        assert!(dir.path().join("batch_0000000001234.bin").exists());
        assert!(!dir.path().join("batch_1234.bin").exists());
    }

    #[test]
    fn migration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(dir.path(), &StorageMetadata::fresh(1)).unwrap();
        fs::write(dir.path().join("batch_7.bin"), b"x").unwrap();
        reconcile_schema(dir.path()).unwrap();
        let meta = reconcile_schema(dir.path()).unwrap();
        assert_eq!(meta.schema_version, DURABLE_SCHEMA_VERSION);
        assert!(dir.path().join("batch_0000000000007.bin").exists());
    }

    #[test]
    fn newer_schema_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(dir.path(), &StorageMetadata::fresh(DURABLE_SCHEMA_VERSION + 5)).unwrap();
        assert!(matches!(
            reconcile_schema(dir.path()),
            Err(CacheError::SchemaTooNew { .. })
        ));
    }
}
