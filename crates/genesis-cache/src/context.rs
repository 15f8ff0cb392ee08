//! Agent context store: an in-memory layer written through to the cache
//!
//! Context values, prompt templates, parameters and strategies each live
//! under their own key namespace in the backing [`Cache`], tagged with a
//! `type` metadata field.

use crate::cache::Cache;
use crate::error::Result;
use crate::types::Metadata;
use serde_json::Value;
use tracing::debug;

/// Memory layer bound when a backing cache can refill evicted values
const MEMORY_CAPACITY: u64 = 10_000;

/// Namespace of a context entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Context,
    PromptTemplate,
    Parameter,
    Strategy,
}

impl ContextKind {
    /// Value of the `type` metadata field
    pub fn tag(&self) -> &'static str {
        match self {
            ContextKind::Context => "context",
            ContextKind::PromptTemplate => "prompt_template",
            ContextKind::Parameter => "parameter",
            ContextKind::Strategy => "strategy",
        }
    }

    /// Cache key for `name` within this namespace
    pub fn cache_key(&self, name: &str) -> String {
        format!("{}:{}", self.tag(), name)
    }
}

/// Context values held in memory and persisted to an optional cache
pub struct ContextStore {
    cache: Option<Cache>,
    memory: moka::future::Cache<String, Value>,
}

impl ContextStore {
    /// Create a store backed by `cache`, or memory only when `None`.
    ///
    /// Without a backing cache the memory layer is the only copy, so it is
    /// left unbounded.
    pub fn new(cache: Option<Cache>) -> Self {
        let memory = match cache {
            Some(_) => moka::future::Cache::builder()
                .max_capacity(MEMORY_CAPACITY)
                .build(),
            None => moka::future::Cache::builder().build(),
        };
        Self { cache, memory }
    }

    /// Record a value in memory and write it through to the cache
    pub async fn put(&self, kind: ContextKind, name: &str, value: Value) -> Result<()> {
        let key = kind.cache_key(name);

        if let Some(cache) = &self.cache {
            let mut metadata = Metadata::new();
            metadata.insert("type".to_string(), Value::String(kind.tag().to_string()));
            cache.set(&key, value.clone(), None, Some(metadata)).await?;
        }

        self.memory.insert(key, value).await;
        Ok(())
    }

    /// Look a value up in memory first, then in the cache.
    ///
    /// Values found only in the cache are promoted into memory.
    pub async fn get(&self, kind: ContextKind, name: &str) -> Result<Option<Value>> {
        let key = kind.cache_key(name);

        if let Some(value) = self.memory.get(&key).await {
            return Ok(Some(value));
        }

        let Some(cache) = &self.cache else {
            return Ok(None);
        };

        match cache.get(&key).await? {
            Some(value) => {
                debug!(key = %key, "Context loaded from cache");
                self.memory.insert(key, value.clone()).await;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn add_context(&self, key: &str, value: Value) -> Result<()> {
        self.put(ContextKind::Context, key, value).await
    }

    pub async fn get_context(&self, key: &str) -> Result<Option<Value>> {
        self.get(ContextKind::Context, key).await
    }

    pub async fn update_prompt_template(&self, name: &str, template: &str) -> Result<()> {
        self.put(
            ContextKind::PromptTemplate,
            name,
            Value::String(template.to_string()),
        )
        .await
    }

    pub async fn prompt_template(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .get(ContextKind::PromptTemplate, name)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    pub async fn update_parameter(&self, name: &str, value: Value) -> Result<()> {
        self.put(ContextKind::Parameter, name, value).await
    }

    pub async fn parameter(&self, name: &str) -> Result<Option<Value>> {
        self.get(ContextKind::Parameter, name).await
    }

    pub async fn update_strategy(&self, name: &str, strategy: Value) -> Result<()> {
        self.put(ContextKind::Strategy, name, strategy).await
    }

    pub async fn strategy(&self, name: &str) -> Result<Option<Value>> {
        self.get(ContextKind::Strategy, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::filesystem::FilesystemBackend;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn filesystem_cache() -> (TempDir, Cache) {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().to_path_buf(), None).unwrap();
        let cache = Cache::with_backend(BackendKind::Filesystem, Arc::new(backend));
        (dir, cache)
    }

    #[test]
    fn test_cache_keys_are_namespaced() {
        assert_eq!(ContextKind::Context.cache_key("goal"), "context:goal");
        assert_eq!(
            ContextKind::PromptTemplate.cache_key("plan"),
            "prompt_template:plan"
        );
        assert_eq!(ContextKind::Parameter.cache_key("t"), "parameter:t");
        assert_eq!(ContextKind::Strategy.cache_key("s"), "strategy:s");
    }

    #[tokio::test]
    async fn test_memory_only_store() {
        let store = ContextStore::new(None);

        store.add_context("goal", json!("ship it")).await.unwrap();
        assert_eq!(
            store.get_context("goal").await.unwrap(),
            Some(json!("ship it"))
        );
        assert_eq!(store.get_context("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_only_store_keeps_every_entry() {
        let store = ContextStore::new(None);
        let count = MEMORY_CAPACITY as usize + 200;

        for i in 0..count {
            store
                .add_context(&format!("step-{}", i), json!(i))
                .await
                .unwrap();
        }
        store.memory.run_pending_tasks().await;

        for i in 0..count {
            assert_eq!(
                store.get_context(&format!("step-{}", i)).await.unwrap(),
                Some(json!(i)),
                "lost context step-{}",
                i
            );
        }
    }

    #[tokio::test]
    async fn test_writes_through_with_type_metadata() {
        let (_dir, cache) = filesystem_cache();
        let store = ContextStore::new(Some(cache.clone()));

        store
            .update_strategy("explore", json!({"depth": 3}))
            .await
            .unwrap();

        let item = cache.get_item("strategy:explore").await.unwrap().unwrap();
        assert_eq!(item.value, json!({"depth": 3}));
        assert_eq!(item.metadata.unwrap()["type"], "strategy");
    }

    #[tokio::test]
    async fn test_reads_fall_back_to_cache() {
        let (_dir, cache) = filesystem_cache();

        let writer = ContextStore::new(Some(cache.clone()));
        writer
            .update_prompt_template("plan", "Plan the next step for {objective}")
            .await
            .unwrap();
        writer.update_parameter("temperature", json!(0.7)).await.unwrap();

        // A fresh store has an empty memory layer
        let reader = ContextStore::new(Some(cache.clone()));
        assert_eq!(
            reader.prompt_template("plan").await.unwrap().as_deref(),
            Some("Plan the next step for {objective}")
        );
        assert_eq!(
            reader.parameter("temperature").await.unwrap(),
            Some(json!(0.7))
        );

        // Promoted into memory: still served after the cache is cleared
        cache.clear().await.unwrap();
        assert_eq!(
            reader.parameter("temperature").await.unwrap(),
            Some(json!(0.7))
        );
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() {
        let store = ContextStore::new(None);

        store.add_context("x", json!("context")).await.unwrap();
        store.update_parameter("x", json!("parameter")).await.unwrap();

        assert_eq!(store.get_context("x").await.unwrap(), Some(json!("context")));
        assert_eq!(store.parameter("x").await.unwrap(), Some(json!("parameter")));
        assert_eq!(store.strategy("x").await.unwrap(), None);
    }
}
