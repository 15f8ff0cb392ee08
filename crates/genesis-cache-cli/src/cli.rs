//! Argument parsing and command execution

use crate::error::{CliError, Result};
use clap::{Parser, Subcommand};
use genesis_cache::{BackendKind, Cache, CacheConfig, Metadata};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "genesis-cache",
    version = env!("CARGO_PKG_VERSION"),
    about = "Inspect and edit a genesis cache",
    long_about = None
)]
pub struct Cli {
    /// Storage backend (filesystem or redis); overrides CACHE_BACKEND
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// Cache directory for the filesystem backend; overrides CACHE_DIR
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Entry limit for the filesystem backend; overrides CACHE_MAX_SIZE
    #[arg(long, global = true)]
    pub max_size: Option<usize>,

    /// Key prefix for the Redis backend; overrides CACHE_PREFIX
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Print the value stored under KEY
    Get { key: String },
    /// Store VALUE under KEY. VALUE is parsed as JSON, else kept as a string
    Set {
        key: String,
        #[arg(value_parser = parse_value)]
        value: Value,
        /// Lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
        /// Metadata entry as key=value; repeatable
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, Value)>,
    },
    /// Remove KEY
    Delete { key: String },
    /// Remove every entry
    Clear,
    /// Print cache statistics as JSON
    Stats,
}

/// Result of a command that completed without error
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Miss,
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    pub fn config(&self) -> Result<CacheConfig> {
        let config = CacheConfig::from_env()?;
        self.apply(config)
    }

    fn apply(&self, mut config: CacheConfig) -> Result<CacheConfig> {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(dir) = &self.cache_dir {
            config.filesystem.cache_dir = dir.clone();
        }
        if let Some(max_size) = self.max_size {
            config.filesystem.max_size = Some(max_size);
        }
        if let Some(prefix) = &self.prefix {
            config.redis.prefix = prefix.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

impl Commands {
    pub async fn execute<W: Write>(&self, cache: &Cache, out: &mut W) -> Result<Outcome> {
        match self {
            Commands::Get { key } => match cache.get(key).await? {
                Some(value) => {
                    writeln!(out, "{}", serde_json::to_string(&value)?)?;
                    Ok(Outcome::Done)
                }
                None => Ok(Outcome::Miss),
            },
            Commands::Set {
                key,
                value,
                ttl,
                meta,
            } => {
                let metadata = if meta.is_empty() {
                    None
                } else {
                    Some(meta.iter().cloned().collect::<Metadata>())
                };
                cache.set(key, value.clone(), *ttl, metadata).await?;
                Ok(Outcome::Done)
            }
            Commands::Delete { key } => {
                cache.delete(key).await?;
                Ok(Outcome::Done)
            }
            Commands::Clear => {
                cache.clear().await?;
                Ok(Outcome::Done)
            }
            Commands::Stats => {
                let stats = cache.stats().await?;
                writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
                Ok(Outcome::Done)
            }
        }
    }
}

fn parse_value(raw: &str) -> std::result::Result<Value, CliError> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

fn parse_meta(raw: &str) -> std::result::Result<(String, Value), CliError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::Parse(format!("expected key=value, got {:?}", raw)))?;
    if key.is_empty() {
        return Err(CliError::Parse(format!("empty metadata key in {:?}", raw)));
    }
    Ok((key.to_string(), parse_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_cache::FilesystemBackend;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn filesystem_cache() -> (TempDir, Cache) {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().to_path_buf(), None).unwrap();
        let cache = Cache::with_backend(BackendKind::Filesystem, Arc::new(backend));
        (dir, cache)
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("genesis-cache").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_parse_value_falls_back_to_string() {
        assert_eq!(parse_value("42").unwrap(), json!(42));
        assert_eq!(parse_value("{\"a\": [1]}").unwrap(), json!({"a": [1]}));
        assert_eq!(parse_value("\"quoted\"").unwrap(), json!("quoted"));
        assert_eq!(parse_value("hello world").unwrap(), json!("hello world"));
    }

    #[test]
    fn test_parse_meta() {
        assert_eq!(
            parse_meta("source=planner").unwrap(),
            ("source".to_string(), json!("planner"))
        );
        assert_eq!(
            parse_meta("attempt=3").unwrap(),
            ("attempt".to_string(), json!(3))
        );
        // Only the first '=' separates
        assert_eq!(
            parse_meta("expr=a=b").unwrap(),
            ("expr".to_string(), json!("a=b"))
        );
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=x").is_err());
    }

    #[test]
    fn test_parse_set_command() {
        let cli = parse(&[
            "--cache-dir",
            "/tmp/c",
            "set",
            "plan",
            "[1,2]",
            "--ttl",
            "60",
            "--meta",
            "type=strategy",
        ]);

        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/c")));
        assert_eq!(
            cli.command,
            Commands::Set {
                key: "plan".to_string(),
                value: json!([1, 2]),
                ttl: Some(60),
                meta: vec![("type".to_string(), json!("strategy"))],
            }
        );
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = Cli::try_parse_from(["genesis-cache", "--backend", "memcached", "stats"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = parse(&["--backend", "redis", "--prefix", "agent:", "stats"]);
        let config = cli.apply(CacheConfig::default()).unwrap();
        assert_eq!(config.backend, BackendKind::Redis);
        assert_eq!(config.redis.prefix, "agent:");

        let cli = parse(&["--max-size", "0", "clear"]);
        assert!(cli.apply(CacheConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_dir, cache) = filesystem_cache();

        let set = parse(&["set", "k", "{\"n\": 1}", "--meta", "who=cli"]).command;
        assert_eq!(set.execute(&cache, &mut Vec::new()).await.unwrap(), Outcome::Done);

        let item = cache.get_item("k").await.unwrap().unwrap();
        assert_eq!(item.value, json!({"n": 1}));
        assert_eq!(item.metadata.unwrap()["who"], "cli");

        let mut out = Vec::new();
        let get = parse(&["get", "k"]).command;
        assert_eq!(get.execute(&cache, &mut out).await.unwrap(), Outcome::Done);
        assert_eq!(String::from_utf8(out).unwrap(), "{\"n\":1}\n");
    }

    #[tokio::test]
    async fn test_get_miss() {
        let (_dir, cache) = filesystem_cache();
        let mut out = Vec::new();
        let get = parse(&["get", "absent"]).command;
        assert_eq!(get.execute(&cache, &mut out).await.unwrap(), Outcome::Miss);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_stats_prints_json() {
        let (_dir, cache) = filesystem_cache();
        cache.set("a", json!(1), None, None).await.unwrap();

        let mut out = Vec::new();
        let stats = parse(&["stats"]).command;
        stats.execute(&cache, &mut out).await.unwrap();

        let printed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed["backend"], "filesystem");
        assert_eq!(printed["total_items"], 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (_dir, cache) = filesystem_cache();
        cache.set("a", json!(1), None, None).await.unwrap();
        cache.set("b", json!(2), None, None).await.unwrap();

        let delete = parse(&["delete", "a"]).command;
        delete.execute(&cache, &mut Vec::new()).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);

        let clear = parse(&["clear"]).command;
        clear.execute(&cache, &mut Vec::new()).await.unwrap();
        assert_eq!(cache.stats().await.unwrap().total_items, 0);
    }
}
