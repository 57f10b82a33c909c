// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only history store for the Engram memory engine.
//!
//! Two durable logs back the audit trail:
//!
//! - **action_history**: one row per memory mutation, including no-ops.
//! - **message_history**: one row per raw message batch ingested.
//!
//! Entries are immutable once written; only an explicit space `reset()`
//! deletes them. The store never owns live memory state — the search index
//! does — but its entries carry enough of a snapshot that the index can be
//! rebuilt from history alone (see [`HistoryStore::live_records`]).

pub mod database;
pub mod migrations;
pub mod queries;

use std::path::Path;

use engram_core::types::{ActionEntry, MemoryRecord, MessageEntry};
use engram_core::EngramError;

use crate::database::Database;

/// Durable append-only log of memory mutations and ingested messages.
///
/// Opening a store is expensive (connection setup plus schema migration);
/// callers are expected to cache instances per memory space.
pub struct HistoryStore {
    db: Database,
}

impl HistoryStore {
    /// Open (or create) the history database at `path`.
    pub async fn open(path: &Path) -> Result<Self, EngramError> {
        Ok(Self {
            db: Database::open(path).await?,
        })
    }

    /// In-memory store for tests and ephemeral spaces.
    pub async fn open_in_memory() -> Result<Self, EngramError> {
        Ok(Self {
            db: Database::open_in_memory().await?,
        })
    }

    /// Append one mutation entry to the audit trail.
    pub async fn add_history(&self, entry: &ActionEntry) -> Result<ActionEntry, EngramError> {
        queries::history::add_history(&self.db, entry).await?;
        Ok(entry.clone())
    }

    /// All audit entries for one memory, ascending by update time.
    pub async fn get_history(&self, memory_id: &str) -> Result<Vec<ActionEntry>, EngramError> {
        queries::history::get_history(&self.db, memory_id).await
    }

    /// Append one raw message batch.
    pub async fn add_message(&self, entry: &MessageEntry) -> Result<MessageEntry, EngramError> {
        queries::messages::add_message(&self.db, entry).await?;
        Ok(entry.clone())
    }

    /// Message batches for the given scope, ascending by ingestion time.
    pub async fn get_messages(
        &self,
        user_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Vec<MessageEntry>, EngramError> {
        queries::messages::get_messages(&self.db, user_id, session_id).await
    }

    /// Reconstruct a page of live memory records from the audit trail.
    ///
    /// Used by the index for cold-start seeding, batched to bound memory.
    pub async fn live_records(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        queries::history::live_records(&self.db, limit, offset).await
    }

    /// Destructive: wipe both logs. Used by space `reset()` only.
    pub async fn reset(&self) -> Result<(), EngramError> {
        queries::history::reset(&self.db).await?;
        queries::messages::reset(&self.db).await
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), EngramError> {
        self.db.close().await
    }
}
