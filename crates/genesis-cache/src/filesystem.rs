//! Filesystem backend: one record file per key

use crate::backend::CacheBackend;
use crate::config::{BackendKind, FilesystemConfig};
use crate::error::{CacheError, Result};
use crate::types::{CacheItem, CacheStats, Metadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

const ENTRY_EXTENSION: &str = "json";

/// Distinguishes temp files of concurrent writes within one process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A cache storing each entry as a file under `cache_dir`.
///
/// When `max_size` is set, every write first evicts the oldest-created
/// entries so that the directory holds at most `max_size` entries once the
/// write lands. Eviction is FIFO by write time; reads do not refresh entries.
pub struct FilesystemBackend {
    cache_dir: PathBuf,
    max_size: Option<usize>,
}

impl FilesystemBackend {
    /// Create a backend without touching the filesystem
    pub fn new(cache_dir: PathBuf, max_size: Option<usize>) -> Result<Self> {
        if max_size == Some(0) {
            return Err(CacheError::Config(
                "max_size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            cache_dir,
            max_size,
        })
    }

    /// Create a backend from config and make sure its directory exists
    pub async fn open(config: &FilesystemConfig) -> Result<Self> {
        let backend = Self::new(config.cache_dir.clone(), config.max_size)?;
        backend.init().await?;
        Ok(backend)
    }

    /// Initialize the cache by ensuring the cache directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        info!(cache_dir = ?self.cache_dir, max_size = ?self.max_size, "Filesystem cache initialized");
        Ok(())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// File name for a key: hex SHA-256 of the key plus the entry extension.
    ///
    /// Hashing makes any key string (separators, `..`, NUL, very long keys)
    /// safe to use as a single path component.
    pub fn entry_filename(key: &str) -> String {
        format!("{}.{}", hash_key(key), ENTRY_EXTENSION)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(Self::entry_filename(key))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.cache_dir
            .join(format!(".{}.{}.{}.tmp", hash_key(key), std::process::id(), n))
    }

    /// All entry files currently in the cache directory
    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut dir = match fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION);
            if is_entry && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Evict oldest entries so the incoming write leaves at most `max_size`.
    ///
    /// The incoming key's own file is excluded from the count since the write
    /// replaces it. Files that fail to decode are deleted.
    async fn enforce_max_size(&self, max_size: usize, incoming: &Path) -> Result<()> {
        let mut entries: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();

        for path in self.entry_paths().await? {
            if path == incoming {
                continue;
            }
            let Some(bytes) = read_if_exists(&path).await? else {
                continue;
            };
            match CacheItem::decode(&bytes) {
                Some(item) => entries.push((path, item.created_at)),
                None => {
                    warn!(path = ?path, "Removing corrupted cache entry");
                    remove_if_exists(&path).await?;
                }
            }
        }

        let excess = (entries.len() + 1).saturating_sub(max_size);
        if excess == 0 {
            return Ok(());
        }

        entries.sort_by_key(|(_, created_at)| *created_at);
        for (path, created_at) in entries.into_iter().take(excess) {
            remove_if_exists(&path).await?;
            debug!(path = ?path, %created_at, "Evicted oldest cache entry");
        }

        Ok(())
    }
}

#[async_trait]
impl CacheBackend for FilesystemBackend {
    async fn get_item(&self, key: &str) -> Result<Option<CacheItem>> {
        let path = self.entry_path(key);

        let Some(bytes) = read_if_exists(&path).await? else {
            debug!(key, "Cache miss");
            return Ok(None);
        };

        let Some(item) = CacheItem::decode(&bytes) else {
            warn!(key, path = ?path, "Unreadable cache entry, treating as miss");
            return Ok(None);
        };

        if item.key != key {
            warn!(key, stored_key = %item.key, "Cache entry key mismatch, treating as miss");
            return Ok(None);
        }

        if item.is_expired() {
            debug!(key, ttl = ?item.ttl, "Cache entry expired");
            remove_if_exists(&path).await?;
            return Ok(None);
        }

        debug!(key, "Cache hit");
        Ok(Some(item))
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let path = self.entry_path(key);

        if let Some(max_size) = self.max_size {
            self.enforce_max_size(max_size, &path).await?;
        }

        let item = CacheItem::new(key, value, ttl, metadata);
        let bytes = item.encode()?;

        // Write then rename so readers never observe a partial record
        let tmp = self.temp_path(key);
        let written = match fs::write(&tmp, &bytes).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = remove_if_exists(&tmp).await {
                warn!(path = ?tmp, error = %cleanup, "Failed to remove temp file");
            }
            return Err(e.into());
        }

        debug!(key, size = bytes.len(), ttl = ?ttl, "Cached entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        remove_if_exists(&self.entry_path(key)).await
    }

    async fn clear(&self) -> Result<()> {
        let paths = self.entry_paths().await?;
        let count = paths.len();
        for path in paths {
            remove_if_exists(&path).await?;
        }
        info!(cache_dir = ?self.cache_dir, count, "Cache cleared");
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::empty(BackendKind::Filesystem);
        stats.cache_dir = Some(self.cache_dir.clone());
        stats.max_size = self.max_size;

        let now = Utc::now();
        for path in self.entry_paths().await? {
            let Some(bytes) = read_if_exists(&path).await? else {
                continue;
            };
            stats.total_items += 1;
            stats.total_size_bytes += bytes.len() as u64;

            if CacheItem::decode(&bytes).is_some_and(|item| !item.is_expired_at(now)) {
                stats.valid_items += 1;
            }
        }

        Ok(stats)
    }
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
