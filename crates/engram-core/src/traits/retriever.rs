// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retriever contract: the semantically searchable, filterable document
//! store that owns live memory records.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::types::{MemoryRecord, ScoredMemoryItem, SearchOptions};

/// Abstraction over the index that stores and queries live memory records.
///
/// Mutating methods block until the backing index has durably applied the
/// change (bounded by the implementation's task timeout) — a timeout
/// surfaces as [`EngramError::ConsistencyTimeout`], never silent success.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Fetch one record by id, `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, EngramError>;

    /// Insert a new record.
    async fn insert(&self, record: &MemoryRecord) -> Result<(), EngramError>;

    /// Replace an existing record in place.
    async fn update(&self, record: &MemoryRecord) -> Result<(), EngramError>;

    /// Remove one record.
    async fn delete(&self, id: &str) -> Result<(), EngramError>;

    /// Remove a batch of records.
    async fn delete_all(&self, ids: &[String]) -> Result<(), EngramError>;

    /// List up to `k` records matching the filter, sorted per `opts.sort`
    /// (default: newest first).
    async fn list(&self, k: usize, opts: &SearchOptions)
    -> Result<Vec<MemoryRecord>, EngramError>;

    /// Ranked search, records only.
    async fn search(
        &self,
        query: &str,
        k: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<MemoryRecord>, EngramError>;

    /// Ranked search with retrieval scores.
    async fn search_with_score(
        &self,
        query: &str,
        k: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredMemoryItem>, EngramError>;

    /// Destructive: drop every record in the index.
    async fn reset(&self) -> Result<(), EngramError>;
}
