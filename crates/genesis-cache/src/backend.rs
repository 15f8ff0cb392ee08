//! The storage contract every cache backend implements

use crate::error::Result;
use crate::types::{CacheItem, CacheStats, Metadata};
use async_trait::async_trait;
use serde_json::Value;

/// A storage medium behind the [`Cache`](crate::Cache) facade.
///
/// Expiry is checked lazily on read. Stored data that fails to decode is a
/// miss, never an error; I/O and connection failures are returned as-is.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the full stored item, or `None` if absent, expired or unreadable
    async fn get_item(&self, key: &str) -> Result<Option<CacheItem>>;

    /// Fetch only the value
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_item(key).await?.map(|item| item.value))
    }

    /// Store a value, replacing any previous entry for the key
    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) -> Result<()>;

    /// Remove an entry; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry owned by this backend
    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<CacheStats>;
}
