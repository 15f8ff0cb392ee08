//! Cache configuration

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_REDIS_PORT: u16 = 6379;

/// Which storage medium backs the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Filesystem,
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Filesystem => "filesystem",
            BackendKind::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filesystem" => Ok(BackendKind::Filesystem),
            "redis" => Ok(BackendKind::Redis),
            _ => Err(CacheError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Settings for the filesystem backend
#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemConfig {
    pub cache_dir: PathBuf,
    /// Maximum number of entries; `None` is unbounded
    pub max_size: Option<usize>,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(env::var_os("HOME").map(PathBuf::from)),
            max_size: None,
        }
    }
}

fn default_cache_dir(home: Option<PathBuf>) -> PathBuf {
    home.unwrap_or_else(|| PathBuf::from("."))
        .join(".genesis")
        .join("cache")
}

/// Settings for the Redis backend
#[derive(Clone, PartialEq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    /// Namespace prepended to every key
    pub prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            db: 0,
            password: None,
            prefix: String::new(),
        }
    }
}

impl RedisConfig {
    /// Connection URL in `redis://[:password@]host:port/db` form
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

// Keeps the password out of logs
impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Cache configuration: the backend selector plus settings for each backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheConfig {
    pub backend: BackendKind,
    pub filesystem: FilesystemConfig,
    pub redis: RedisConfig,
}

impl CacheConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Parse configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("CACHE_BACKEND") {
            Some(name) => name.parse()?,
            None => BackendKind::default(),
        };

        let cache_dir = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_cache_dir(lookup("HOME").map(PathBuf::from)));

        let max_size = lookup("CACHE_MAX_SIZE")
            .map(|s| parse_var("CACHE_MAX_SIZE", &s))
            .transpose()?;

        let host = lookup("REDIS_HOST").unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string());

        let port = lookup("REDIS_PORT")
            .map(|s| parse_var("REDIS_PORT", &s))
            .transpose()?
            .unwrap_or(DEFAULT_REDIS_PORT);

        let db = lookup("REDIS_DB")
            .map(|s| parse_var("REDIS_DB", &s))
            .transpose()?
            .unwrap_or(0);

        let password = lookup("REDIS_PASSWORD").filter(|p| !p.is_empty());

        let prefix = lookup("CACHE_PREFIX").unwrap_or_default();

        let config = Self {
            backend,
            filesystem: FilesystemConfig {
                cache_dir,
                max_size,
            },
            redis: RedisConfig {
                host,
                port,
                db,
                password,
                prefix,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no backend can honor
    pub fn validate(&self) -> Result<()> {
        if self.filesystem.max_size == Some(0) {
            return Err(CacheError::Config(
                "max_size must be greater than zero".to_string(),
            ));
        }
        if self.redis.db < 0 {
            return Err(CacheError::Config(format!(
                "invalid Redis database index: {}",
                self.redis.db
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CacheError::Config(format!("invalid value for {}: {:?}", name, value)))
}
