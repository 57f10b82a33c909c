// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable memory for conversational agents.
//!
//! The pipeline behind [`Memory::add`] runs in three LLM-assisted stages:
//! fact extraction from the transcript, candidate lookup in the index,
//! and reconciliation of new facts against the candidates. Reconciled
//! actions land in an append-only history log before they mutate the
//! index, so the log can always rebuild the index from scratch.
//!
//! [`SpaceRegistry`] opens and caches the per-space stores; [`Memory`] is
//! the facade hosts call.

pub mod dispatch;
pub mod extractor;
pub mod facade;
pub mod reconciler;
pub mod registry;
pub mod space;

pub use dispatch::MemoryAction;
pub use facade::{
    ActionFailure, AddOptions, AddOutcome, CreateOptions, FilterOptions, Memory, MemoryBuilder,
    SearchRequest,
};
pub use registry::SpaceRegistry;
pub use space::{SpaceIdentity, SpaceLayout};
