// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed search index with FTS5 BM25 and optional vector ranking.
//!
//! Lifecycle: `Uninitialized -> Creating -> Ready`. On first open the
//! schema is created and the index is seeded from the history store's
//! backlog in bounded batches. The embedder is probed once; a failing
//! probe demotes the index to lexical-only search instead of failing
//! initialization.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use engram_config::IndexConfig;
use engram_core::types::{MemoryRecord, Metadata, ScoredMemoryItem, SearchOptions};
use engram_core::{EngramError, Retriever, TextEmbedder};
use engram_store::HistoryStore;
use rusqlite::OptionalExtension;
use tokio::sync::mpsc;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::filter::{record_matches, sort_records};
use crate::task::{wait_for_task, TaskTable};
use crate::vector::{blob_to_vec, cosine_similarity, reciprocal_rank_fusion};
use crate::writer::{spawn_writer, WriteJob, WriteOp};

/// Convert tokio-rusqlite errors into [`EngramError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error) -> EngramError {
    EngramError::Storage {
        source: Box::new(e),
    }
}

/// Connection open errors come back as plain rusqlite errors.
fn map_open_err(e: rusqlite::Error) -> EngramError {
    EngramError::Storage {
        source: Box::new(e),
    }
}

/// Index lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Creating,
    Ready,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    memory TEXT NOT NULL,
    user_id TEXT,
    session_id TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(memory, content='documents', content_rowid='rowid');
CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
    INSERT INTO documents_fts(rowid, memory) VALUES (new.rowid, new.memory);
END;
CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, memory) VALUES ('delete', old.rowid, old.memory);
END;
CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, memory) VALUES ('delete', old.rowid, old.memory);
    INSERT INTO documents_fts(rowid, memory) VALUES (new.rowid, new.memory);
END;
";

/// Embedded index over live memory records.
///
/// Reads go straight to the connection; mutations flow through the
/// single-writer queue and are awaited via polled task handles.
pub struct SqliteIndex {
    conn: Connection,
    writer_tx: mpsc::Sender<WriteJob>,
    tasks: Arc<TaskTable>,
    embedder: Option<Arc<dyn TextEmbedder>>,
    config: IndexConfig,
    state: Arc<RwLock<IndexState>>,
}

impl SqliteIndex {
    /// Open (or create) the index database at `path`.
    ///
    /// When the index is brand new and a history store is supplied, live
    /// records are replayed from the audit trail in batches before the
    /// index is marked ready.
    pub async fn open(
        path: &Path,
        config: IndexConfig,
        embedder: Option<Arc<dyn TextEmbedder>>,
        seed_from: Option<&HistoryStore>,
    ) -> Result<Self, EngramError> {
        let conn = Connection::open(path).await.map_err(map_open_err)?;
        Self::initialize(conn, config, embedder, seed_from).await
    }

    /// In-memory index for tests and ephemeral spaces.
    pub async fn open_in_memory(
        config: IndexConfig,
        embedder: Option<Arc<dyn TextEmbedder>>,
        seed_from: Option<&HistoryStore>,
    ) -> Result<Self, EngramError> {
        let conn = Connection::open_in_memory().await.map_err(map_open_err)?;
        Self::initialize(conn, config, embedder, seed_from).await
    }

    async fn initialize(
        conn: Connection,
        config: IndexConfig,
        embedder: Option<Arc<dyn TextEmbedder>>,
        seed_from: Option<&HistoryStore>,
    ) -> Result<Self, EngramError> {
        let state = Arc::new(RwLock::new(IndexState::Uninitialized));
        set_state(&state, IndexState::Creating);

        let fresh = !schema_exists(&conn).await?;
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        // Probe the embedder once; degrade to lexical-only on failure.
        let embedder = match embedder {
            Some(e) => match e.embed(&["engram".to_string()]).await {
                Ok(_) => Some(e),
                Err(err) => {
                    warn!("embedder probe failed, continuing lexical-only: {err}");
                    None
                }
            },
            None => None,
        };

        let tasks = Arc::new(TaskTable::new());
        let writer_tx = spawn_writer(conn.clone(), Arc::clone(&tasks));
        let index = Self {
            conn,
            writer_tx,
            tasks,
            embedder,
            config,
            state: Arc::clone(&state),
        };

        if fresh {
            if let Some(history) = seed_from {
                index.seed_from_history(history).await?;
            }
        }

        set_state(&state, IndexState::Ready);
        Ok(index)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IndexState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replay live records from the history backlog, one batch at a time,
    /// to bound memory on cold start.
    async fn seed_from_history(&self, history: &HistoryStore) -> Result<(), EngramError> {
        let batch_size = self.config.seed_batch_size.max(1);
        let mut offset = 0usize;
        let mut total = 0usize;

        loop {
            let batch = history.live_records(batch_size, offset).await?;
            if batch.is_empty() {
                break;
            }
            offset += batch.len();
            total += batch.len();

            for record in batch {
                let embedding = self.embed_best_effort(&record.memory).await;
                let task_id = self.tasks.register();
                self.send_job(WriteJob {
                    task_id,
                    op: WriteOp::Insert { record, embedding },
                })
                .await?;
                self.await_task(task_id).await?;
            }
        }

        if total > 0 {
            info!(records = total, "seeded index from history backlog");
        }
        Ok(())
    }

    /// Embed one text; failures degrade to a lexical-only document.
    async fn embed_best_effort(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&[text.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.swap_remove(0)),
            Ok(_) => None,
            Err(e) => {
                warn!("embedding failed, storing document lexical-only: {e}");
                None
            }
        }
    }

    async fn send_job(&self, job: WriteJob) -> Result<(), EngramError> {
        self.writer_tx
            .send(job)
            .await
            .map_err(|_| EngramError::Internal("index writer task stopped".to_string()))
    }

    async fn await_task(&self, task_id: u64) -> Result<(), EngramError> {
        wait_for_task(
            &self.tasks,
            task_id,
            Duration::from_secs(self.config.task_timeout_secs),
            Duration::from_millis(self.config.poll_interval_ms.max(1)),
        )
        .await
    }

    /// Enqueue one mutation and block until it settles or times out.
    async fn submit(&self, op: WriteOp) -> Result<(), EngramError> {
        let task_id = self.tasks.register();
        self.send_job(WriteJob { task_id, op }).await?;
        self.await_task(task_id).await
    }

    async fn bm25_search(
        &self,
        query: &str,
        limit: usize,
        scope: &ScopeFilter,
    ) -> Result<Vec<(String, f64)>, EngramError> {
        let Some(match_query) = sanitize_match_query(query) else {
            return Ok(vec![]);
        };
        let scope = scope.clone();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT d.id, bm25(documents_fts) AS score
                     FROM documents_fts
                     JOIN documents d ON d.rowid = documents_fts.rowid
                     WHERE documents_fts MATCH ?1
                       AND (?3 IS NULL OR d.user_id = ?3)
                       AND (?4 IS NULL OR d.session_id = ?4)
                     ORDER BY bm25(documents_fts)
                     LIMIT ?2",
                )?;
                let results = stmt
                    .query_map(
                        rusqlite::params![
                            match_query,
                            limit as i64,
                            scope.user_id,
                            scope.session_id
                        ],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(results)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn vector_search(
        &self,
        query: &str,
        limit: usize,
        scope: &ScopeFilter,
    ) -> Result<Vec<(String, f32)>, EngramError> {
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(vec![]);
        };
        let query_embedding = match embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
            Ok(_) => return Ok(vec![]),
            Err(e) => {
                // Ranking degrades to lexical-only for this query.
                warn!("query embedding failed: {e}");
                return Ok(vec![]);
            }
        };

        let scope = scope.clone();
        let stored = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, embedding FROM documents
                     WHERE embedding IS NOT NULL
                       AND (?1 IS NULL OR user_id = ?1)
                       AND (?2 IS NULL OR session_id = ?2)",
                )?;
                let results = stmt
                    .query_map(rusqlite::params![scope.user_id, scope.session_id], |row| {
                        let id: String = row.get(0)?;
                        let blob: Vec<u8> = row.get(1)?;
                        Ok((id, blob_to_vec(&blob)))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(results)
            })
            .await
            .map_err(map_tr_err)?;

        let threshold = self.config.similarity_threshold as f32;
        let mut results: Vec<(String, f32)> = stored
            .into_iter()
            .filter(|(_, embedding)| embedding.len() == query_embedding.len())
            .map(|(id, embedding)| {
                let similarity = cosine_similarity(&query_embedding, &embedding);
                (id, similarity)
            })
            .filter(|(_, similarity)| *similarity >= threshold)
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn get_by_ids(&self, ids: Vec<String>) -> Result<Vec<MemoryRecord>, EngramError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, memory, user_id, session_id, metadata, created_at, updated_at
                     FROM documents WHERE id = ?1",
                )?;
                let mut records = Vec::with_capacity(ids.len());
                for id in &ids {
                    let record = stmt
                        .query_row(rusqlite::params![id], row_to_record)
                        .optional()?;
                    if let Some(record) = record {
                        records.push(record);
                    }
                }
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Scope fields lifted out of a filter so retrieval can apply them in SQL.
///
/// Without this, a dominant foreign scope could crowd a caller's own
/// records out of the fused candidate window before filtering. Only
/// exact-string scope values are pushed down; array (IN-membership)
/// filters still apply post-fetch.
#[derive(Debug, Clone, Default)]
struct ScopeFilter {
    user_id: Option<String>,
    session_id: Option<String>,
}

impl ScopeFilter {
    fn from_filter(filter: &Metadata) -> Self {
        let scalar = |key: &str| filter.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Self {
            user_id: scalar("user_id"),
            session_id: scalar("session_id"),
        }
    }
}

fn set_state(state: &Arc<RwLock<IndexState>>, next: IndexState) {
    let mut guard = state.write().unwrap_or_else(|e| e.into_inner());
    *guard = next;
}

async fn schema_exists(conn: &Connection) -> Result<bool, EngramError> {
    conn.call(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'documents'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    })
    .await
    .map_err(map_tr_err)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let metadata_raw: String = row.get(4)?;
    let metadata: Metadata = serde_json::from_str(&metadata_raw).unwrap_or_default();
    Ok(MemoryRecord {
        id: row.get(0)?,
        memory: row.get(1)?,
        user_id: row.get(2)?,
        session_id: row.get(3)?,
        metadata,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Build an FTS5 MATCH expression that cannot fail to parse.
///
/// Tokens are reduced to alphanumerics and individually quoted; a query
/// with no usable tokens yields `None` (caller skips BM25 entirely).
fn sanitize_match_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

#[async_trait]
impl Retriever for SqliteIndex {
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, EngramError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let record = conn
                    .query_row(
                        "SELECT id, memory, user_id, session_id, metadata, created_at, updated_at
                         FROM documents WHERE id = ?1",
                        rusqlite::params![id],
                        row_to_record,
                    )
                    .optional()?;
                Ok(record)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn insert(&self, record: &MemoryRecord) -> Result<(), EngramError> {
        let embedding = self.embed_best_effort(&record.memory).await;
        self.submit(WriteOp::Insert {
            record: record.clone(),
            embedding,
        })
        .await
    }

    async fn update(&self, record: &MemoryRecord) -> Result<(), EngramError> {
        let embedding = self.embed_best_effort(&record.memory).await;
        self.submit(WriteOp::Update {
            record: record.clone(),
            embedding,
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), EngramError> {
        self.submit(WriteOp::Delete(id.to_string())).await
    }

    async fn delete_all(&self, ids: &[String]) -> Result<(), EngramError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::DeleteAll(ids.to_vec())).await
    }

    async fn list(
        &self,
        k: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        if k == 0 {
            return Ok(vec![]);
        }
        let all = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, memory, user_id, session_id, metadata, created_at, updated_at
                     FROM documents",
                )?;
                let records = stmt
                    .query_map([], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(map_tr_err)?;

        let mut records: Vec<MemoryRecord> = all
            .into_iter()
            .filter(|r| record_matches(r, &opts.filter))
            .collect();
        sort_records(&mut records, opts.sort.as_deref());
        records.truncate(k);
        Ok(records)
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        let scored = self.search_with_score(query, k, opts).await?;
        Ok(scored.into_iter().map(|s| s.record).collect())
    }

    async fn search_with_score(
        &self,
        query: &str,
        k: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredMemoryItem>, EngramError> {
        if k == 0 {
            return Ok(vec![]);
        }
        let limit = self.config.max_fused_results.max(k);
        let scope = ScopeFilter::from_filter(&opts.filter);

        let vector_results = self.vector_search(query, limit, &scope).await?;
        let bm25_results = self.bm25_search(query, limit, &scope).await?;
        let mut fused = reciprocal_rank_fusion(&vector_results, &bm25_results);
        fused.truncate(limit);

        if fused.is_empty() {
            return Ok(vec![]);
        }
        debug!(
            vector = vector_results.len(),
            bm25 = bm25_results.len(),
            fused = fused.len(),
            "hybrid search"
        );

        let ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
        let records = self.get_by_ids(ids).await?;
        let score_of: std::collections::HashMap<&str, f32> = fused
            .iter()
            .map(|(id, score)| (id.as_str(), *score))
            .collect();

        let mut items: Vec<ScoredMemoryItem> = records
            .into_iter()
            .filter(|r| record_matches(r, &opts.filter))
            .map(|record| {
                let score = score_of.get(record.id.as_str()).copied().unwrap_or(0.0);
                ScoredMemoryItem { record, score }
            })
            .collect();
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        items.truncate(k);
        Ok(items)
    }

    async fn reset(&self) -> Result<(), EngramError> {
        self.submit(WriteOp::Reset).await
    }
}
