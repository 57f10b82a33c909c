// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message history queries.

use engram_core::types::{ConversationMessage, MessageEntry, Metadata};
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageEntry> {
    let messages_raw: String = row.get(3)?;
    let metadata_raw: String = row.get(4)?;
    let messages: Vec<ConversationMessage> =
        serde_json::from_str(&messages_raw).unwrap_or_default();
    let metadata: Metadata = serde_json::from_str(&metadata_raw).unwrap_or_default();
    Ok(MessageEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        messages,
        metadata,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Append one raw message batch.
pub async fn add_message(db: &Database, entry: &MessageEntry) -> Result<(), EngramError> {
    let entry = entry.clone();
    let messages = serde_json::to_string(&entry.messages)
        .map_err(|e| EngramError::Internal(format!("message serialization: {e}")))?;
    let metadata = serde_json::to_string(&entry.metadata)
        .map_err(|e| EngramError::Internal(format!("metadata serialization: {e}")))?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO message_history
                 (id, user_id, session_id, messages, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id,
                    entry.user_id,
                    entry.session_id,
                    messages,
                    metadata,
                    entry.created_at,
                    entry.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Message batches matching the optional scope, ascending by ingestion time.
pub async fn get_messages(
    db: &Database,
    user_id: Option<&str>,
    session_id: Option<&str>,
) -> Result<Vec<MessageEntry>, EngramError> {
    let user_id = user_id.map(str::to_string);
    let session_id = session_id.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, session_id, messages, metadata, created_at, updated_at
                 FROM message_history
                 WHERE (?1 IS NULL OR user_id = ?1)
                   AND (?2 IS NULL OR session_id = ?2)
                 ORDER BY created_at ASC",
            )?;
            let entries = stmt
                .query_map(params![user_id, session_id], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// Wipe the message history. Only `reset()` on the owning space calls this.
pub async fn reset(db: &Database) -> Result<(), EngramError> {
    db.connection()
        .call(|conn| {
            conn.execute("DELETE FROM message_history", [])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
