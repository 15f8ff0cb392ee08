//! Remote key-value backend (Redis or any Redis-compatible server)
//!
//! Entries live under `prefix + key` so several logical caches can share one
//! store. TTLs are handed to the store's native expiry and checked again
//! against the record on read.

use crate::backend::CacheBackend;
use crate::config::{BackendKind, RedisConfig};
use crate::error::{CacheError, Result};
use crate::types::{CacheItem, CacheStats, Metadata};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Keys requested per SCAN round trip
const SCAN_BATCH: usize = 500;

/// Longest expiry handed to the server; beyond this only the record TTL applies
const MAX_NATIVE_TTL: u64 = i32::MAX as u64;

/// Minimal raw byte store the key-value backend runs on
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Raw bytes under `key`. A key holding a non-string value fails with
    /// [`CacheError::WrongType`].
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes, expiring natively after `ttl` seconds when given
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()>;

    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// One page of keys starting with `prefix`. Iteration begins at cursor 0
    /// and is complete when the returned cursor is 0 again.
    async fn scan_prefix(&self, prefix: &str, cursor: u64) -> Result<(u64, Vec<String>)>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        (**self).delete(keys).await
    }

    async fn scan_prefix(&self, prefix: &str, cursor: u64) -> Result<(u64, Vec<String>)> {
        (**self).scan_prefix(prefix, cursor).await
    }
}

/// Redis client with a lazily established, shared connection.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    url: String,
}

impl RedisStore {
    pub fn new(url: &str) -> Self {
        Self {
            connection: Arc::new(RwLock::new(None)),
            url: url.to_string(),
        }
    }

    pub fn from_config(config: &RedisConfig) -> Self {
        Self::new(&config.connection_url())
    }

    async fn get_connection(&self) -> Result<ConnectionManager> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn = self.connection.write().await;
        // Another task may have connected while we waited for the lock
        if let Some(ref c) = *conn {
            return Ok(c.clone());
        }

        let client = redis::Client::open(self.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        *conn = Some(manager.clone());

        let info = client_info(&self.url);
        info!(server = %info, "Connected to Redis");
        Ok(manager)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => Ok(value),
            Err(e) if is_wrong_type(&e) => Err(CacheError::WrongType(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection().await?;
        match ttl.and_then(native_expiry) {
            Some(secs) => conn.set_ex::<_, _, ()>(key, value, secs).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.get_connection().await?;
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str, cursor: u64) -> Result<(u64, Vec<String>)> {
        let mut conn = self.get_connection().await?;
        let page: (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(prefix_pattern(prefix))
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(&mut conn)
            .await?;
        Ok(page)
    }
}

/// Expiry in seconds to hand to the server for a record TTL.
///
/// SETEX rejects 0, so it becomes 1; the record's own TTL still expires the
/// entry on read. TTLs past the server's range get no native expiry.
fn native_expiry(ttl: u64) -> Option<u64> {
    match ttl {
        0 => Some(1),
        secs if secs > MAX_NATIVE_TTL => None,
        secs => Some(secs),
    }
}

fn is_wrong_type(err: &redis::RedisError) -> bool {
    err.code() == Some("WRONGTYPE") || err.kind() == redis::ErrorKind::TypeError
}

/// Glob pattern matching exactly the keys that start with `prefix`
fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Host/port/db part of a connection URL, without credentials
fn client_info(url: &str) -> &str {
    match url.rsplit_once('@') {
        Some((_, rest)) => rest,
        None => url.strip_prefix("redis://").unwrap_or(url),
    }
}

/// Cache backend over a [`KeyValueStore`], namespaced by a key prefix
pub struct KeyValueBackend<S> {
    store: S,
    prefix: String,
}

/// The key-value backend on a Redis connection
pub type RedisBackend = KeyValueBackend<RedisStore>;

impl RedisBackend {
    /// Create a Redis backend; the connection is opened on first use
    pub fn from_config(config: &RedisConfig) -> Self {
        KeyValueBackend::new(RedisStore::from_config(config), config.prefix.clone())
    }
}

impl<S: KeyValueStore> KeyValueBackend<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl<S: KeyValueStore> CacheBackend for KeyValueBackend<S> {
    async fn get_item(&self, key: &str) -> Result<Option<CacheItem>> {
        let full_key = self.full_key(key);

        let bytes = match self.store.get(&full_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %full_key, "Cache miss");
                return Ok(None);
            }
            Err(CacheError::WrongType(_)) => {
                warn!(key = %full_key, "Key holds a non-cache value, treating as miss");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(item) = CacheItem::decode(&bytes) else {
            warn!(key = %full_key, "Unreadable cache entry, treating as miss");
            return Ok(None);
        };

        if item.is_expired() {
            debug!(key = %full_key, ttl = ?item.ttl, "Cache entry expired");
            self.store.delete(&[full_key]).await?;
            return Ok(None);
        }

        debug!(key = %full_key, "Cache hit");
        Ok(Some(item))
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let full_key = self.full_key(key);
        let item = CacheItem::new(key, value, ttl, metadata);
        let bytes = item.encode()?;
        let size = bytes.len();

        self.store.set(&full_key, bytes, ttl).await?;

        debug!(key = %full_key, size, ttl = ?ttl, "Cached entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(&[self.full_key(key)]).await
    }

    async fn clear(&self) -> Result<()> {
        let mut cursor = 0;
        let mut count = 0;
        loop {
            let (next, keys) = self.store.scan_prefix(&self.prefix, cursor).await?;
            count += keys.len();
            self.store.delete(&keys).await?;
            if next == 0 {
                break;
            }
            cursor = next;
        }
        info!(prefix = %self.prefix, count, "Cache cleared");
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::empty(BackendKind::Redis);
        stats.prefix = Some(self.prefix.clone());

        let now = Utc::now();
        let mut cursor = 0;
        loop {
            let (next, keys) = self.store.scan_prefix(&self.prefix, cursor).await?;
            for key in keys {
                stats.total_items += 1;
                let bytes = match self.store.get(&key).await {
                    Ok(Some(bytes)) => bytes,
                    // Expired between SCAN and GET
                    Ok(None) => continue,
                    Err(CacheError::WrongType(_)) => {
                        warn!(key = %key, "Skipping non-cache value in stats");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                stats.total_size_bytes += bytes.len() as u64;
                if CacheItem::decode(&bytes).is_some_and(|item| !item.is_expired_at(now)) {
                    stats.valid_items += 1;
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(stats)
    }
}
