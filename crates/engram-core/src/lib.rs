// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Engram memory engine.
//!
//! Provides the error taxonomy, domain types, and the trait contracts
//! implemented or consumed by the other workspace crates. No I/O lives
//! here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::EngramError;
pub use traits::{LanguageModel, Retriever, TextEmbedder};
pub use types::{
    ActionEntry, ConversationMessage, MemoryActionItem, MemoryEvent, MemoryRecord, MessageEntry,
    Metadata, ScoredMemoryItem, SearchOptions, SortDirection, SortSpec,
};
