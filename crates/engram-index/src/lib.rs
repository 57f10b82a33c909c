// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded search index for the Engram memory engine.
//!
//! Implements the [`engram_core::Retriever`] contract over SQLite:
//!
//! - **FTS5 BM25** keyword search, kept in sync by triggers
//! - optional **vector ranking** through an injected embedder, fused with
//!   BM25 via Reciprocal Rank Fusion
//! - a **single-writer queue** whose mutations are awaited via polled
//!   task handles with a bounded timeout
//! - **cold-start seeding** from the history store's audit trail

pub mod filter;
pub mod index;
pub mod task;
pub mod vector;
pub mod writer;

pub use index::{IndexState, SqliteIndex};
pub use task::{wait_for_task, TaskStatus, TaskTable};
