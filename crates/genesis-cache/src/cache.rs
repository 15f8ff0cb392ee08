//! Cache facade selecting a backend from configuration

use crate::backend::CacheBackend;
use crate::config::{BackendKind, CacheConfig};
use crate::error::Result;
use crate::filesystem::FilesystemBackend;
use crate::remote::RedisBackend;
use crate::types::{CacheItem, CacheStats, Metadata};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Handle to a configured cache backend.
///
/// Every operation is forwarded to the backend unchanged. Clones share the
/// same backend.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    kind: BackendKind,
}

impl Cache {
    /// Build the backend named by `config`.
    ///
    /// Invalid settings fail here rather than on first use. The filesystem
    /// backend creates its directory; the Redis backend connects lazily.
    pub async fn open(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        let backend: Arc<dyn CacheBackend> = match config.backend {
            BackendKind::Filesystem => {
                Arc::new(FilesystemBackend::open(&config.filesystem).await?)
            }
            BackendKind::Redis => Arc::new(RedisBackend::from_config(&config.redis)),
        };

        info!(backend = %config.backend, "Cache opened");
        Ok(Self {
            backend,
            kind: config.backend,
        })
    }

    /// Wrap an already constructed backend
    pub fn with_backend(kind: BackendKind, backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend, kind }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.backend.get(key).await
    }

    /// Like [`get`](Self::get) but returns the whole item, including metadata
    pub async fn get_item(&self, key: &str) -> Result<Option<CacheItem>> {
        self.backend.get_item(key).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        self.backend.set(key, value, ttl, metadata).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.backend.stats().await
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache").field("backend", &self.kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilesystemConfig;
    use crate::error::CacheError;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn filesystem_config(dir: &Path, max_size: Option<usize>) -> CacheConfig {
        CacheConfig {
            backend: BackendKind::Filesystem,
            filesystem: FilesystemConfig {
                cache_dir: dir.to_path_buf(),
                max_size,
            },
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let dir = tempdir().unwrap();
        let cache = Cache::open(&filesystem_config(dir.path(), None)).await.unwrap();
        assert_eq!(cache.backend_kind(), BackendKind::Filesystem);

        cache.set("key1", json!("value1"), None, None).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), Some(json!("value1")));

        assert_eq!(cache.get("nonexistent").await.unwrap(), None);

        cache.delete("key1").await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl() {
        let dir = tempdir().unwrap();
        let cache = Cache::open(&filesystem_config(dir.path(), None)).await.unwrap();

        cache.set("k", json!("v"), Some(1), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("v")));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_max_size() {
        let dir = tempdir().unwrap();
        let cache = Cache::open(&filesystem_config(dir.path(), Some(2)))
            .await
            .unwrap();

        cache.set("a", json!(1), None, None).await.unwrap();
        cache.set("b", json!(2), None, None).await.unwrap();
        cache.set("c", json!(3), None, None).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), Some(json!(2)));
        assert_eq!(cache.get("c").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_clear_then_stats_reports_zero() {
        let dir = tempdir().unwrap();
        let cache = Cache::open(&filesystem_config(dir.path(), None)).await.unwrap();

        for i in 0..5 {
            cache
                .set(&format!("k{}", i), json!(i), None, None)
                .await
                .unwrap();
        }
        assert_eq!(cache.stats().await.unwrap().total_items, 5);

        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_clones_share_backend() {
        let dir = tempdir().unwrap();
        let cache = Cache::open(&filesystem_config(dir.path(), None)).await.unwrap();
        let other = cache.clone();

        cache.set("shared", json!([1, 2]), None, None).await.unwrap();
        assert_eq!(other.get("shared").await.unwrap(), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_zero_max_size_fails_at_open() {
        let dir = tempdir().unwrap();
        let err = Cache::open(&filesystem_config(dir.path(), Some(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[tokio::test]
    async fn test_redis_backend_opens_without_connecting() {
        let config = CacheConfig {
            backend: BackendKind::Redis,
            ..CacheConfig::default()
        };
        let cache = Cache::open(&config).await.unwrap();
        assert_eq!(cache.backend_kind(), BackendKind::Redis);
        assert_eq!(format!("{:?}", cache), "Cache { backend: Redis }");
    }

    #[tokio::test]
    async fn test_with_backend() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().to_path_buf(), None).unwrap();
        let cache = Cache::with_backend(BackendKind::Filesystem, Arc::new(backend));

        cache.set("x", json!(true), None, None).await.unwrap();
        assert_eq!(cache.get("x").await.unwrap(), Some(json!(true)));
    }
}
