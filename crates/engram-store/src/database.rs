// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and
//! migration-on-open.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The `Database` struct IS the single writer; query modules
//! accept `&Database` and go through `connection().call()`. Do NOT create
//! additional Connection instances for writes against the same file.

use std::path::Path;

use engram_core::EngramError;
use tokio_rusqlite::Connection;
use tracing::debug;

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

/// Handle to one open history database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run
    /// pending migrations.
    pub async fn open(path: &Path) -> Result<Self, EngramError> {
        let conn = Connection::open(path).await.map_err(map_open_err)?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        crate::migrations::run_migrations(&conn).await?;
        debug!(path = %path.display(), "history database opened");

        Ok(Self { conn })
    }

    /// Open an in-memory database (tests and ephemeral spaces).
    pub async fn open_in_memory() -> Result<Self, EngramError> {
        let conn = Connection::open_in_memory().await.map_err(map_open_err)?;
        crate::migrations::run_migrations(&conn).await?;
        Ok(Self { conn })
    }

    /// The underlying serialized connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), EngramError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}
