// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Action history queries: append, read back per memory, reconstruct live
//! state for index seeding.

use engram_core::types::{ActionEntry, MemoryEvent, MemoryRecord, Metadata};
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

fn parse_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_default()
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionEntry> {
    let metadata_raw: String = row.get(7)?;
    Ok(ActionEntry {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        old_memory: row.get(2)?,
        new_memory: row.get(3)?,
        event: MemoryEvent::from_str_value(&row.get::<_, String>(4)?),
        user_id: row.get(5)?,
        session_id: row.get(6)?,
        metadata: parse_metadata(&metadata_raw),
        is_deleted: row.get::<_, i64>(8)? != 0,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Append one action entry. Entries are never updated afterwards.
pub async fn add_history(db: &Database, entry: &ActionEntry) -> Result<(), EngramError> {
    let entry = entry.clone();
    let metadata = serde_json::to_string(&entry.metadata)
        .map_err(|e| EngramError::Internal(format!("metadata serialization: {e}")))?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO action_history
                 (id, memory_id, old_memory, new_memory, event, user_id, session_id, metadata, is_deleted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.id,
                    entry.memory_id,
                    entry.old_memory,
                    entry.new_memory,
                    entry.event.as_str(),
                    entry.user_id,
                    entry.session_id,
                    metadata,
                    entry.is_deleted as i64,
                    entry.created_at,
                    entry.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All entries for one memory, ascending by update time.
pub async fn get_history(db: &Database, memory_id: &str) -> Result<Vec<ActionEntry>, EngramError> {
    let memory_id = memory_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, memory_id, old_memory, new_memory, event, user_id, session_id, metadata, is_deleted, created_at, updated_at
                 FROM action_history WHERE memory_id = ?1
                 ORDER BY updated_at ASC, created_at ASC",
            )?;
            let entries = stmt
                .query_map(params![memory_id], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// Reconstruct live memory records from the audit trail, one page at a time.
///
/// A record is live when its newest entry is not a delete tombstone. The
/// record's `created_at` is the memory's first entry time; everything else
/// comes from the newest entry's snapshot. Timestamps have millisecond
/// resolution, so same-millisecond entries are disambiguated by `rowid`
/// (insertion order — the log is append-only).
pub async fn live_records(
    db: &Database,
    limit: usize,
    offset: usize,
) -> Result<Vec<MemoryRecord>, EngramError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT memory_id, new_memory, user_id, session_id, metadata,
                        first_created, updated_at
                 FROM (
                     SELECT a.*,
                            ROW_NUMBER() OVER (
                                PARTITION BY memory_id
                                ORDER BY created_at DESC, rowid DESC
                            ) AS recency,
                            MIN(created_at) OVER (
                                PARTITION BY memory_id
                            ) AS first_created
                     FROM action_history a
                 )
                 WHERE recency = 1 AND is_deleted = 0 AND new_memory IS NOT NULL
                 ORDER BY memory_id
                 LIMIT ?1 OFFSET ?2",
            )?;
            let records = stmt
                .query_map(params![limit as i64, offset as i64], |row| {
                    let metadata_raw: String = row.get(4)?;
                    Ok(MemoryRecord {
                        id: row.get(0)?,
                        memory: row.get(1)?,
                        user_id: row.get(2)?,
                        session_id: row.get(3)?,
                        metadata: parse_metadata(&metadata_raw),
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Wipe the action history. Only `reset()` on the owning space calls this.
pub async fn reset(db: &Database) -> Result<(), EngramError> {
    db.connection()
        .call(|conn| {
            conn.execute("DELETE FROM action_history", [])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
