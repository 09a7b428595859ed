//! Shared cache tier backends.
//!
//! A [`SharedStore`] outlives a single request and may outlive the process.
//! Stores hand back whatever they hold; the caller verifies the source pair
//! before trusting an entry.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use tempfile::NamedTempFile;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::CacheKey;
use crate::error::StoreError;
use crate::variant::Variant;

const ENTRY_EXT: &str = "zst";

/// [`MemoryStore`] drops expired entries once per this many writes.
pub const SWEEP_INTERVAL: usize = 256;

/// A cached conversion as persisted by a shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub source: String,
    pub variant: Variant,
    pub value: String,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub expires_at: u64,
}

impl StoredEntry {
    pub fn new(source: &str, variant: Variant, value: &str, ttl: Duration) -> Self {
        let now = unix_now();
        Self {
            source: source.to_string(),
            variant,
            value: value.to_string(),
            created_at: now,
            expires_at: now.saturating_add(ttl.as_secs()),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_now()
    }

    pub fn matches(&self, source: &str, variant: Variant) -> bool {
        self.variant == variant && self.source == source
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Backend of the shared tier.
pub trait SharedStore: Send + Sync {
    /// Returns the live entry under `key`, if any. Expired entries are misses.
    fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, StoreError>;

    fn set(&self, key: &CacheKey, entry: &StoredEntry) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// Process-wide map with per-entry expiry.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<FxHashMap<CacheKey, StoredEntry>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, StoreError> {
        let entries = self.entries.read();
        Ok(entries.get(key).filter(|e| !e.is_expired()).cloned())
    }

    fn set(&self, key: &CacheKey, entry: &StoredEntry) -> Result<(), StoreError> {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        let sweep = writes % SWEEP_INTERVAL == 0;
        let mut entries = self.entries.write();
        if sweep {
            entries.retain(|_, e| !e.is_expired());
        }
        entries.insert(*key, entry.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().clear();
        Ok(())
    }
}

/// One Zstd-compressed CBOR file per key under a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// concurrent reader sees either the old entry or the new one.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) the store directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        if !dir.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key.to_hex(), ENTRY_EXT))
    }
}

impl SharedStore for FileStore {
    fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, StoreError> {
        let path = self.entry_path(key);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut decoder = zstd::stream::read::Decoder::new(file)?;
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes)?;
        let entry: StoredEntry = serde_cbor::from_slice(&bytes)?;

        if entry.is_expired() {
            // Another process may have removed it already.
            let _ = fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn set(&self, key: &CacheKey, entry: &StoredEntry) -> Result<(), StoreError> {
        let bytes = serde_cbor::to_vec(entry)?;
        // Unique per writer; dropped (and deleted) on any early return.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut encoder = zstd::stream::write::Encoder::new(tmp.as_file_mut(), 3)?;
            encoder.write_all(&bytes)?;
            encoder.finish()?;
        }
        tmp.persist(self.entry_path(key)).map_err(|err| err.error)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }
}
