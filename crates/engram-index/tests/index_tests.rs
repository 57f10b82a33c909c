// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the embedded search index.

use std::sync::Arc;

use async_trait::async_trait;
use engram_config::IndexConfig;
use engram_core::types::{utc_now_iso, MemoryRecord, Metadata, SearchOptions};
use engram_core::{EngramError, Retriever, TextEmbedder};
use engram_index::{IndexState, SqliteIndex};
use engram_store::HistoryStore;
use serde_json::json;

fn test_config() -> IndexConfig {
    IndexConfig {
        poll_interval_ms: 2,
        task_timeout_secs: 5,
        seed_batch_size: 2,
        ..IndexConfig::default()
    }
}

fn record(id: &str, memory: &str, user_id: Option<&str>, session_id: Option<&str>) -> MemoryRecord {
    let now = utc_now_iso();
    MemoryRecord {
        id: id.to_string(),
        user_id: user_id.map(str::to_string),
        session_id: session_id.map(str::to_string),
        memory: memory.to_string(),
        metadata: Metadata::new(),
        created_at: now.clone(),
        updated_at: now,
    }
}

fn filter(pairs: &[(&str, serde_json::Value)]) -> SearchOptions {
    SearchOptions::with_filter(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

/// Deterministic embedder: maps known words onto fixed axes.
struct StubEmbedder;

#[async_trait]
impl TextEmbedder for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngramError> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                vec![
                    if lower.contains("pizza") { 1.0 } else { 0.0 },
                    if lower.contains("sushi") { 1.0 } else { 0.0 },
                    if lower.contains("rust") { 1.0 } else { 0.1 },
                ]
            })
            .collect())
    }
}

/// Embedder that always fails, for degrade-path tests.
struct BrokenEmbedder;

#[async_trait]
impl TextEmbedder for BrokenEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EngramError> {
        Err(EngramError::provider("embedding backend offline"))
    }
}

#[tokio::test]
async fn open_reaches_ready_state() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    assert_eq!(index.state(), IndexState::Ready);
}

#[tokio::test]
async fn insert_then_get_round_trips() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    let mut r = record("m1", "User likes pizza", Some("u1"), None);
    r.metadata.insert("topic".into(), json!("food"));
    index.insert(&r).await.unwrap();

    let fetched = index.get("m1").await.unwrap().unwrap();
    assert_eq!(fetched.memory, "User likes pizza");
    assert_eq!(fetched.user_id.as_deref(), Some("u1"));
    assert_eq!(fetched.metadata.get("topic"), Some(&json!("food")));

    assert!(index.get("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn lexical_search_finds_keyword_matches() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    index
        .insert(&record("m1", "User likes pizza", Some("u1"), None))
        .await
        .unwrap();
    index
        .insert(&record("m2", "User works with Rust", Some("u1"), None))
        .await
        .unwrap();

    let results = index
        .search("pizza", 10, &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "m1");
}

#[tokio::test]
async fn hybrid_search_ranks_semantic_matches() {
    let index = SqliteIndex::open_in_memory(test_config(), Some(Arc::new(StubEmbedder)), None)
        .await
        .unwrap();
    index
        .insert(&record("m1", "User likes pizza", None, None))
        .await
        .unwrap();
    index
        .insert(&record("m2", "User prefers sushi", None, None))
        .await
        .unwrap();

    let results = index
        .search_with_score("pizza", 10, &SearchOptions::default())
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].record.id, "m1");
    assert!(results[0].score > 0.0);
}

#[tokio::test]
async fn broken_embedder_degrades_to_lexical_only() {
    // Initialization must not fail; the probe demotes the embedder.
    let index = SqliteIndex::open_in_memory(test_config(), Some(Arc::new(BrokenEmbedder)), None)
        .await
        .unwrap();
    assert_eq!(index.state(), IndexState::Ready);

    index
        .insert(&record("m1", "User likes pizza", None, None))
        .await
        .unwrap();
    let results = index
        .search("pizza", 10, &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn k_zero_returns_empty_not_error() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    index
        .insert(&record("m1", "User likes pizza", None, None))
        .await
        .unwrap();

    assert!(index
        .search("pizza", 0, &SearchOptions::default())
        .await
        .unwrap()
        .is_empty());
    assert!(index
        .list(0, &SearchOptions::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn punctuation_only_query_is_not_an_error() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    index
        .insert(&record("m1", "User likes pizza", None, None))
        .await
        .unwrap();

    let results = index
        .search("?!*", 10, &SearchOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn filters_scope_search_and_list() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    index
        .insert(&record("m1", "User likes pizza", None, Some("A")))
        .await
        .unwrap();
    index
        .insert(&record("m2", "User likes pizza too", None, Some("B")))
        .await
        .unwrap();

    let scoped = filter(&[("session_id", json!("A"))]);
    let results = index.search("pizza", 10, &scoped).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].session_id.as_deref(), Some("A"));

    let listed = index.list(10, &scoped).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "m1");

    // IN-membership over both sessions.
    let both = filter(&[("session_id", json!(["A", "B"]))]);
    assert_eq!(index.list(10, &both).await.unwrap().len(), 2);
}

#[tokio::test]
async fn scoped_search_survives_a_dominant_foreign_scope() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();

    index
        .insert(&record("mine", "User likes pizza", Some("u1"), None))
        .await
        .unwrap();
    // Enough matching documents in another scope to fill the fused
    // candidate window (default cap is 100) on their own.
    for i in 0..120 {
        index
            .insert(&record(
                &format!("other-{i}"),
                "User likes pizza a lot",
                Some("u2"),
                None,
            ))
            .await
            .unwrap();
    }

    let scoped = filter(&[("user_id", json!("u1"))]);
    let results = index.search_with_score("pizza", 5, &scoped).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.id, "mine");
}

#[tokio::test]
async fn update_changes_content_and_search_follows() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    let mut r = record("m1", "User likes pizza", Some("u1"), None);
    index.insert(&r).await.unwrap();

    r.memory = "User prefers sushi over pizza".to_string();
    r.updated_at = utc_now_iso();
    index.update(&r).await.unwrap();

    let fetched = index.get("m1").await.unwrap().unwrap();
    assert_eq!(fetched.memory, "User prefers sushi over pizza");

    let results = index
        .search("sushi", 10, &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "m1");
}

#[tokio::test]
async fn delete_and_delete_all_remove_documents() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    for i in 0..3 {
        index
            .insert(&record(&format!("m{i}"), "some fact", None, None))
            .await
            .unwrap();
    }

    index.delete("m0").await.unwrap();
    assert!(index.get("m0").await.unwrap().is_none());

    index
        .delete_all(&["m1".to_string(), "m2".to_string()])
        .await
        .unwrap();
    assert!(index.list(10, &SearchOptions::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn reset_drops_everything() {
    let index = SqliteIndex::open_in_memory(test_config(), None, None)
        .await
        .unwrap();
    index
        .insert(&record("m1", "User likes pizza", None, None))
        .await
        .unwrap();
    index.reset().await.unwrap();
    assert!(index.get("m1").await.unwrap().is_none());
    assert!(index
        .search("pizza", 10, &SearchOptions::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn cold_start_seeds_live_records_from_history() {
    use engram_core::types::{ActionEntry, MemoryEvent};

    let history = HistoryStore::open_in_memory().await.unwrap();
    // Five adds, one of which is later tombstoned.
    for i in 0..5 {
        let now = format!("2026-01-0{}T00:00:00.000Z", i + 1);
        history
            .add_history(&ActionEntry {
                id: uuid::Uuid::new_v4().to_string(),
                memory_id: format!("m{i}"),
                old_memory: None,
                new_memory: Some(format!("fact number {i}")),
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
    }
    history
        .add_history(&ActionEntry {
            id: uuid::Uuid::new_v4().to_string(),
            memory_id: "m0".to_string(),
            old_memory: Some("fact number 0".to_string()),
            new_memory: None,
            event: MemoryEvent::Delete,
            user_id: Some("u1".to_string()),
            session_id: None,
            metadata: Metadata::new(),
            is_deleted: true,
            created_at: "2026-01-09T00:00:00.000Z".to_string(),
            updated_at: "2026-01-09T00:00:00.000Z".to_string(),
        })
        .await
        .unwrap();

    // seed_batch_size is 2, so seeding takes multiple batches.
    let index = SqliteIndex::open_in_memory(test_config(), None, Some(&history))
        .await
        .unwrap();

    let listed = index.list(10, &SearchOptions::default()).await.unwrap();
    assert_eq!(listed.len(), 4, "tombstoned memory must not be seeded");
    assert!(index.get("m0").await.unwrap().is_none());
    assert!(index.get("m3").await.unwrap().is_some());
}

#[tokio::test]
async fn on_disk_index_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");

    {
        let index = SqliteIndex::open(&path, test_config(), None, None)
            .await
            .unwrap();
        index
            .insert(&record("m1", "User likes pizza", None, None))
            .await
            .unwrap();
    }

    let index = SqliteIndex::open(&path, test_config(), None, None)
        .await
        .unwrap();
    assert!(index.get("m1").await.unwrap().is_some());
}
