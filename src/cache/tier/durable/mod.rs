//! Durable tier (L3)
//!
//! Crash-safe batch snapshots of cache content. All disk writes happen
//! on a dedicated writer thread owned by the tier and fed through a
//! bounded channel; cache operations only touch the in-memory index and
//! never block on I/O. Saves are triggered by the auto-save interval,
//! by pending-change pressure, or explicitly by `flush`.

pub mod batch;
pub mod metadata;
pub mod migrate;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use log::{error, info, warn};

use crate::cache::config::types::DurableTierConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;
use crate::cache::ttl;
use crate::telemetry::TierStats;

use metadata::StorageMetadata;
pub use migrate::DURABLE_SCHEMA_VERSION;

enum WriterCommand {
    /// Save soon if there are pending changes (capacity pressure).
    TrySave,
    /// Save now and report the outcome.
    Flush(tokio::sync::oneshot::Sender<Result<(), CacheError>>),
    Shutdown,
}

/// L3 cache tier.
#[derive(Debug)]
pub struct DurableTier {
    root: PathBuf,
    config: DurableTierConfig,
    index: Arc<DashMap<String, CacheEntry>>,
    pending_changes: Arc<AtomicUsize>,
    stats: Arc<TierStats>,
    tx: Sender<WriterCommand>,
    writer: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DurableTier {
    /// Open the storage root: create it on first run, reconcile the
    /// schema version, load the most recent snapshot and start the
    /// writer thread.
    pub fn open(config: DurableTierConfig) -> Result<Self, CacheError> {
        let root = PathBuf::from(config.storage_path.as_str());
        fs::create_dir_all(&root)?;
        batch::remove_stale_tmp_files(&root);

        let meta = migrate::reconcile_schema(&root)?;
        let index: Arc<DashMap<String, CacheEntry>> = Arc::new(DashMap::new());
        let now = ttl::now_ms();
        let mut loaded = 0usize;
        for entry in batch::load_newest(&root)? {
            if !entry.is_expired(now) {
                index.insert(entry.key.clone(), entry);
                loaded += 1;
            }
        }
        info!(
            "durable store open at {} (schema v{}, {} entries loaded)",
            root.display(),
            meta.schema_version,
            loaded
        );

        let stats = Arc::new(TierStats::new());
        stats.set_current_size(index.len() as u64);
        let pending_changes = Arc::new(AtomicUsize::new(0));

        let (tx, rx) = bounded(16);
        let writer = WriterState {
            root: root.clone(),
            config: config.clone(),
            index: Arc::clone(&index),
            pending_changes: Arc::clone(&pending_changes),
            meta,
        };
        let handle = thread::Builder::new()
            .name("babelcache-durable".to_string())
            .spawn(move || writer.run(rx))
            .map_err(|e| CacheError::storage(format!("cannot spawn writer thread: {}", e)))?;

        Ok(Self {
            root,
            config,
            index,
            pending_changes,
            stats,
            tx,
            writer: Mutex::new(Some(handle)),
        })
    }

    /// Point lookup against the loaded snapshot.
    pub fn get(&self, key: &str, now_ms: u64) -> Option<CacheEntry> {
        let started = Instant::now();
        // Clone out of the shard before any removal; holding a ref
        // across remove would deadlock on the same shard.
        let found = self.index.get(key).map(|e| e.value().clone());
        let result = match found {
            Some(entry) if !entry.is_expired(now_ms) => Some(entry),
            Some(_) => {
                self.index.remove(key);
                self.note_change(1);
                None
            }
            None => None,
        };
        let elapsed = started.elapsed().as_micros() as u64;
        match &result {
            Some(_) => self.stats.record_hit(elapsed),
            None => self.stats.record_miss(elapsed),
        }
        self.stats.set_current_size(self.index.len() as u64);
        result
    }

    /// Upsert into the snapshot index; persisted by the next save.
    pub fn set(&self, entry: CacheEntry, now_ms: u64) {
        if entry.is_expired(now_ms) {
            return;
        }
        self.index.insert(entry.key.clone(), entry);
        self.stats.set_current_size(self.index.len() as u64);
        self.note_change(1);
    }

    /// Idempotent delete.
    pub fn delete(&self, key: &str) {
        if self.index.remove(key).is_some() {
            self.stats.set_current_size(self.index.len() as u64);
            self.note_change(1);
        }
    }

    pub fn contains(&self, key: &str, now_ms: u64) -> bool {
        self.index
            .get(key)
            .map(|e| !e.is_expired(now_ms))
            .unwrap_or(false)
    }

    /// Drop expired entries from the index.
    pub fn clear_expired(&self, now_ms: u64) -> usize {
        let before = self.index.len();
        self.index.retain(|_, e| !e.is_expired(now_ms));
        let removed = before - self.index.len();
        if removed > 0 {
            self.stats.record_evictions(removed as u64);
            self.stats.set_current_size(self.index.len() as u64);
            self.note_change(removed);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.index.len()
    }

    /// Persist the current snapshot and wait for the result, up to
    /// `grace`.
    pub async fn flush(&self, grace: Duration) -> Result<(), CacheError> {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(done_tx))
            .map_err(|_| CacheError::storage("durable writer is gone"))?;
        match tokio::time::timeout(grace, done_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CacheError::storage("durable writer dropped flush")),
            Err(_) => Err(CacheError::Timeout),
        }
    }

    /// Copy `metadata.bin` and every committed batch file into
    /// `target`. The caller is responsible for quiescing writes first.
    pub fn backup(&self, target: &Path) -> Result<usize, CacheError> {
        fs::create_dir_all(target)?;
        let mut copied = 0;
        let meta_path = self.root.join(metadata::METADATA_FILE);
        if meta_path.exists() {
            fs::copy(&meta_path, target.join(metadata::METADATA_FILE))?;
            copied += 1;
        }
        for path in batch::list_batches(&self.root)? {
            if let Some(name) = path.file_name() {
                fs::copy(&path, target.join(name))?;
                copied += 1;
            }
        }
        info!("backed up {} files to {}", copied, target.display());
        Ok(copied)
    }

    /// Copy a backup into a storage root. Run before `open`; the next
    /// open loads the restored snapshot.
    pub fn restore(storage_root: &Path, source: &Path) -> Result<usize, CacheError> {
        fs::create_dir_all(storage_root)?;
        let mut copied = 0;
        for item in fs::read_dir(source)? {
            let item = item?;
            let name = item.file_name();
            let name_str = name.to_string_lossy();
            if name_str == metadata::METADATA_FILE
                || (name_str.starts_with("batch_") && name_str.ends_with(".bin"))
            {
                fs::copy(item.path(), storage_root.join(&name))?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Remove all persisted state and the in-memory index.
    pub fn clear_all(&self) -> Result<(), CacheError> {
        self.index.clear();
        self.pending_changes.store(0, Ordering::Relaxed);
        self.stats.set_current_size(0);
        for path in batch::list_batches(&self.root)? {
            fs::remove_file(path)?;
        }
        let meta_path = self.root.join(metadata::METADATA_FILE);
        if meta_path.exists() {
            fs::remove_file(meta_path)?;
        }
        metadata::write_metadata(&self.root, &StorageMetadata::fresh(DURABLE_SCHEMA_VERSION))?;
        Ok(())
    }

    pub fn pending_changes(&self) -> usize {
        self.pending_changes.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> &Arc<TierStats> {
        &self.stats
    }

    /// Stop the writer. Pending changes are flushed before the thread
    /// exits.
    pub fn shutdown(&self) {
        let _ = self.tx.send(WriterCommand::Shutdown);
        if let Some(handle) = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if handle.join().is_err() {
                error!("durable writer thread panicked during shutdown");
            }
        }
    }

    fn note_change(&self, n: usize) {
        let pending = self.pending_changes.fetch_add(n, Ordering::Relaxed) + n;
        if pending >= self.config.max_batch_size {
            // Best effort: a full command queue already has a save coming.
            let _ = self.tx.try_send(WriterCommand::TrySave);
        }
    }
}

impl Drop for DurableTier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the writer thread.
struct WriterState {
    root: PathBuf,
    config: DurableTierConfig,
    index: Arc<DashMap<String, CacheEntry>>,
    pending_changes: Arc<AtomicUsize>,
    meta: StorageMetadata,
}

impl WriterState {
    fn run(mut self, rx: Receiver<WriterCommand>) {
        let tick = Duration::from_millis(self.config.auto_save_interval_ms.max(50));
        loop {
            match rx.recv_timeout(tick) {
                Ok(WriterCommand::TrySave) => {
                    if self.pending_changes.load(Ordering::Relaxed) > 0 {
                        if let Err(err) = self.save() {
                            warn!("pressure-triggered save failed: {}", err);
                        }
                    }
                }
                Ok(WriterCommand::Flush(done)) => {
                    let _ = done.send(self.save());
                }
                Ok(WriterCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    if self.pending_changes.load(Ordering::Relaxed) > 0 {
                        if let Err(err) = self.save() {
                            error!("final flush failed, pending changes lost: {}", err);
                        }
                    }
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.config.enable_auto_save
                        && self.pending_changes.load(Ordering::Relaxed) > 0
                    {
                        if let Err(err) = self.save() {
                            warn!("auto-save failed: {}", err);
                        }
                    }
                }
            }
        }
    }

    fn save(&mut self) -> Result<(), CacheError> {
        let now = ttl::now_ms();
        let entries: Vec<CacheEntry> = self
            .index
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| e.value().clone())
            .collect();
        let path = batch::write_batch_file(&self.root, &entries, &self.config, now)?;
        self.meta.total_entries = entries.len() as u64;
        self.meta.total_saves += 1;
        self.meta.last_save_ms = now;
        metadata::write_metadata(&self.root, &self.meta)?;
        self.pending_changes.store(0, Ordering::Relaxed);
        info!("saved {} entries to {}", entries.len(), path.display());
        Ok(())
    }
}
