//! Key/value cache for agent state with filesystem and Redis backends
//!
//! Values are JSON documents stored with an optional time-to-live and
//! free-form metadata. The filesystem backend keeps one file per key and can
//! cap the number of entries (oldest written first out). The Redis backend
//! namespaces keys under a prefix and lets the server expire them.

mod backend;
mod cache;
mod config;
mod context;
mod error;
mod filesystem;
mod remote;
mod types;

pub use backend::CacheBackend;
pub use cache::Cache;
pub use config::{BackendKind, CacheConfig, FilesystemConfig, RedisConfig};
pub use context::{ContextKind, ContextStore};
pub use error::{CacheError, Result};
pub use filesystem::FilesystemBackend;
pub use remote::{KeyValueBackend, KeyValueStore, RedisBackend, RedisStore};
pub use types::{CacheItem, CacheStats, Metadata};
