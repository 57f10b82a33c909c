// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL migration files are compiled into the binary at build time via
//! `embed_migrations!`. Migrations run automatically on database open and
//! are idempotent: refinery tracks applied versions in its own
//! `refinery_schema_history` table, so reopening a store is a no-op.

use engram_core::EngramError;
use tokio_rusqlite::Connection;

use crate::database::map_tr_err;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), EngramError> {
    let report = conn
        .call(|conn| Ok(embedded::migrations::runner().run(conn)))
        .await
        .map_err(map_tr_err)?;
    report.map_err(|e| EngramError::Storage {
        source: Box::new(e),
    })?;
    Ok(())
}
