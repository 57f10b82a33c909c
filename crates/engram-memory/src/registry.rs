// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-space handle caching.
//!
//! Opening a history store or index runs migrations, seeds from history,
//! and probes the embedder, so opened handles are cached per space name.
//! The cache is bounded and TTL-based: idle handles age out, and when the
//! cache is full the least recently used entry makes room. The registry
//! is an explicit injected value with no global state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use engram_config::EngramConfig;
use engram_core::{EngramError, TextEmbedder};
use engram_index::SqliteIndex;
use engram_store::HistoryStore;
use tokio::sync::Mutex;
use tracing::debug;

use crate::space::SpaceLayout;

struct CacheSlot<T> {
    value: Arc<T>,
    last_used: Instant,
}

/// Bounded TTL cache keyed by space name.
struct TtlCache<T> {
    slots: Mutex<HashMap<String, CacheSlot<T>>>,
    max_entries: usize,
    ttl: Duration,
}

impl<T> TtlCache<T> {
    fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Fetch a live cached handle, refreshing its recency.
    async fn get(&self, key: &str) -> Option<Arc<T>> {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| slot.last_used.elapsed() < self.ttl);
        let slot = slots.get_mut(key)?;
        slot.last_used = Instant::now();
        Some(slot.value.clone())
    }

    /// Insert a freshly opened handle, evicting the least recently used
    /// entry if the cache is full.
    async fn insert(&self, key: String, value: Arc<T>) {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| slot.last_used.elapsed() < self.ttl);
        if slots.len() >= self.max_entries && !slots.contains_key(&key) {
            if let Some(oldest) = slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone())
            {
                slots.remove(&oldest);
            }
        }
        slots.insert(
            key,
            CacheSlot {
                value,
                last_used: Instant::now(),
            },
        );
    }
}

/// Factory and cache for per-space history stores and indexes.
pub struct SpaceRegistry {
    config: EngramConfig,
    embedder: Option<Arc<dyn TextEmbedder>>,
    stores: TtlCache<HistoryStore>,
    indexes: TtlCache<SqliteIndex>,
}

impl SpaceRegistry {
    pub fn new(config: EngramConfig, embedder: Option<Arc<dyn TextEmbedder>>) -> Self {
        let max = config.history.cache_max_entries;
        let ttl = Duration::from_secs(config.history.cache_ttl_secs);
        Self {
            config,
            embedder,
            stores: TtlCache::new(max, ttl),
            indexes: TtlCache::new(max, ttl),
        }
    }

    fn layout(&self, space: &str) -> Result<SpaceLayout, EngramError> {
        if space.trim().is_empty() || space.contains(['/', '\\']) || space == "." || space == ".." {
            return Err(EngramError::Validation(format!(
                "invalid space name: {space:?}"
            )));
        }
        SpaceLayout::ensure(Path::new(&self.config.space.data_dir).join(space))
    }

    /// The history store for a space, opened on first use.
    pub async fn history_store(&self, space: &str) -> Result<Arc<HistoryStore>, EngramError> {
        if let Some(store) = self.stores.get(space).await {
            return Ok(store);
        }
        let layout = self.layout(space)?;
        debug!(space, "opening history store");
        let store = Arc::new(HistoryStore::open(&layout.history_path()).await?);
        self.stores.insert(space.to_string(), store.clone()).await;
        Ok(store)
    }

    /// The search index for a space. A cold index is seeded from the
    /// space's history store before it is handed out.
    pub async fn retriever(&self, space: &str) -> Result<Arc<SqliteIndex>, EngramError> {
        if let Some(index) = self.indexes.get(space).await {
            return Ok(index);
        }
        let layout = self.layout(space)?;
        let history = self.history_store(space).await?;

        let index_root = Path::new(&self.config.index.index_root);
        std::fs::create_dir_all(index_root)
            .map_err(|e| EngramError::Storage { source: Box::new(e) })?;

        debug!(space, space_id = %layout.identity().id, "opening search index");
        let index = Arc::new(
            SqliteIndex::open(
                &layout.index_path(index_root),
                self.config.index.clone(),
                self.embedder.clone(),
                Some(&history),
            )
            .await?,
        );
        self.indexes.insert(space.to_string(), index.clone()).await;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path, ttl_secs: u64, max_entries: usize) -> EngramConfig {
        let mut config = EngramConfig::default();
        config.space.data_dir = dir.join("spaces").to_string_lossy().into_owned();
        config.index.index_root = dir.join("index").to_string_lossy().into_owned();
        config.index.poll_interval_ms = 2;
        config.index.task_timeout_secs = 5;
        config.history.cache_ttl_secs = ttl_secs;
        config.history.cache_max_entries = max_entries;
        config
    }

    #[tokio::test]
    async fn cached_handles_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SpaceRegistry::new(test_config(dir.path(), 60, 16), None);

        let a = registry.history_store("alpha").await.unwrap();
        let b = registry.history_store("alpha").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let ia = registry.retriever("alpha").await.unwrap();
        let ib = registry.retriever("alpha").await.unwrap();
        assert!(Arc::ptr_eq(&ia, &ib));
    }

    #[tokio::test]
    async fn zero_ttl_always_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SpaceRegistry::new(test_config(dir.path(), 0, 16), None);

        let a = registry.history_store("alpha").await.unwrap();
        let b = registry.history_store("alpha").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn full_cache_evicts_least_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SpaceRegistry::new(test_config(dir.path(), 60, 2), None);

        let alpha = registry.history_store("alpha").await.unwrap();
        let _beta = registry.history_store("beta").await.unwrap();
        // Touch alpha so beta is the LRU entry, then overflow the cache.
        let alpha_again = registry.history_store("alpha").await.unwrap();
        assert!(Arc::ptr_eq(&alpha, &alpha_again));
        let _gamma = registry.history_store("gamma").await.unwrap();

        let alpha_after = registry.history_store("alpha").await.unwrap();
        assert!(Arc::ptr_eq(&alpha, &alpha_after), "alpha must survive eviction");
    }

    #[tokio::test]
    async fn path_traversing_space_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SpaceRegistry::new(test_config(dir.path(), 60, 16), None);

        for name in ["../escape", "a/b", "a\\b", "..", ".", ""] {
            let err = registry.history_store(name).await.err().unwrap();
            assert!(matches!(err, EngramError::Validation(_)), "name {name:?}");
        }
    }

    #[tokio::test]
    async fn index_is_seeded_from_the_space_history() {
        use engram_core::types::{utc_now_iso, ActionEntry, MemoryEvent, Metadata, SearchOptions};
        use engram_core::Retriever;

        let dir = tempfile::tempdir().unwrap();
        let registry = SpaceRegistry::new(test_config(dir.path(), 60, 16), None);

        let store = registry.history_store("alpha").await.unwrap();
        let now = utc_now_iso();
        store
            .add_history(&ActionEntry {
                id: uuid::Uuid::new_v4().to_string(),
                memory_id: "m1".to_string(),
                old_memory: None,
                new_memory: Some("User likes pizza".to_string()),
                event: MemoryEvent::Add,
                user_id: Some("u1".to_string()),
                session_id: None,
                metadata: Metadata::new(),
                is_deleted: false,
                created_at: now.clone(),
                updated_at: now,
            })
            .await
            .unwrap();

        let index = registry.retriever("alpha").await.unwrap();
        let listed = index.list(10, &SearchOptions::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "m1");
    }
}
