//! Cache types
//!
//! Stored records are `serde_json` bytes, the same encoding on disk and in
//! Redis. JSON is chosen over a binary format so entries stay readable with
//! ordinary tools; `created_at` is an RFC 3339 string.

use crate::config::BackendKind;
use crate::error::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Caller-supplied descriptive fields attached to an entry
pub type Metadata = serde_json::Map<String, Value>;

/// A cached value together with its write time and expiry settings.
///
/// This is also the stored record: backends serialize the whole item, so the
/// original key, timestamp and TTL travel with the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    /// Time-to-live in whole seconds; `None` never expires
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl CacheItem {
    /// Create an item stamped with the current time
    pub fn new(
        key: impl Into<String>,
        value: Value,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            ttl,
            metadata,
        }
    }

    /// Whether the TTL has elapsed as of now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the TTL has elapsed as of `now`.
    ///
    /// An entry is still valid when its age equals the TTL exactly; it expires
    /// once the age is strictly greater.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        // TTLs too large to represent never elapse
        let Some(ttl) = i64::try_from(ttl).ok().and_then(TimeDelta::try_seconds) else {
            return false;
        };
        now.signed_duration_since(self.created_at) > ttl
    }

    /// Serialize the record for storage
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored record, returning `None` for anything malformed
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// Statistics about a cache backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub backend: BackendKind,
    /// Stored entries, including expired and unreadable ones
    pub total_items: usize,
    /// Entries that decode and have not expired
    pub valid_items: usize,
    pub total_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl CacheStats {
    pub(crate) fn empty(backend: BackendKind) -> Self {
        Self {
            backend,
            total_items: 0,
            valid_items: 0,
            total_size_bytes: 0,
            cache_dir: None,
            max_size: None,
            prefix: None,
        }
    }

    pub fn expired_items(&self) -> usize {
        self.total_items.saturating_sub(self.valid_items)
    }
}
