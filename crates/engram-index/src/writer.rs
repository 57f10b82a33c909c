// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-writer mutation queue.
//!
//! All index mutations flow through one background task holding the
//! connection, which applies them in arrival order and records per-task
//! terminal status in the shared [`TaskTable`]. Callers block on
//! [`crate::task::wait_for_task`].

use std::sync::Arc;

use engram_core::types::MemoryRecord;
use engram_core::EngramError;
use metrics::counter;
use tokio::sync::mpsc;
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::task::TaskTable;
use crate::vector::vec_to_blob;

/// One queued index mutation.
#[derive(Debug)]
pub enum WriteOp {
    Insert {
        record: MemoryRecord,
        embedding: Option<Vec<f32>>,
    },
    Update {
        record: MemoryRecord,
        embedding: Option<Vec<f32>>,
    },
    Delete(String),
    DeleteAll(Vec<String>),
    Reset,
}

impl WriteOp {
    fn kind(&self) -> &'static str {
        match self {
            WriteOp::Insert { .. } => "insert",
            WriteOp::Update { .. } => "update",
            WriteOp::Delete(_) => "delete",
            WriteOp::DeleteAll(_) => "delete_all",
            WriteOp::Reset => "reset",
        }
    }
}

/// A mutation paired with its task handle.
#[derive(Debug)]
pub struct WriteJob {
    pub task_id: u64,
    pub op: WriteOp,
}

/// Spawn the writer task; returns the job sender.
pub fn spawn_writer(conn: Connection, tasks: Arc<TaskTable>) -> mpsc::Sender<WriteJob> {
    let (tx, mut rx) = mpsc::channel::<WriteJob>(64);
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let kind = job.op.kind();
            match apply(&conn, job.op).await {
                Ok(()) => {
                    counter!("engram_index_tasks_total", "op" => kind, "status" => "succeeded")
                        .increment(1);
                    tasks.succeed(job.task_id);
                }
                Err(e) => {
                    warn!(task_id = job.task_id, op = kind, "index mutation failed: {e}");
                    counter!("engram_index_tasks_total", "op" => kind, "status" => "failed")
                        .increment(1);
                    tasks.fail(job.task_id, &e);
                }
            }
        }
    });
    tx
}

async fn apply(conn: &Connection, op: WriteOp) -> Result<(), EngramError> {
    match op {
        WriteOp::Insert { record, embedding } => {
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|e| EngramError::Internal(format!("metadata serialization: {e}")))?;
            let blob = embedding.as_deref().map(vec_to_blob);
            conn.call(move |conn| {
                conn.execute(
                    "INSERT INTO documents
                     (id, memory, user_id, session_id, metadata, embedding, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        record.id,
                        record.memory,
                        record.user_id,
                        record.session_id,
                        metadata,
                        blob,
                        record.created_at,
                        record.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(crate::index::map_tr_err)
        }
        WriteOp::Update { record, embedding } => {
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|e| EngramError::Internal(format!("metadata serialization: {e}")))?;
            let blob = embedding.as_deref().map(vec_to_blob);
            conn.call(move |conn| {
                // Scope fields are immutable; only content columns change.
                conn.execute(
                    "UPDATE documents
                     SET memory = ?2, metadata = ?3, embedding = ?4, updated_at = ?5
                     WHERE id = ?1",
                    rusqlite::params![
                        record.id,
                        record.memory,
                        metadata,
                        blob,
                        record.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(crate::index::map_tr_err)
        }
        WriteOp::Delete(id) => {
            conn.call(move |conn| {
                conn.execute("DELETE FROM documents WHERE id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
            .map_err(crate::index::map_tr_err)
        }
        WriteOp::DeleteAll(ids) => {
            conn.call(move |conn| {
                let mut stmt = conn.prepare("DELETE FROM documents WHERE id = ?1")?;
                for id in &ids {
                    stmt.execute(rusqlite::params![id])?;
                }
                Ok(())
            })
            .await
            .map_err(crate::index::map_tr_err)
        }
        WriteOp::Reset => {
            conn.call(|conn| {
                conn.execute("DELETE FROM documents", [])?;
                Ok(())
            })
            .await
            .map_err(crate::index::map_tr_err)
        }
    }
}
