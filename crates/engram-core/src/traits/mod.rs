// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait contracts at the seams of the memory engine.
//!
//! The LLM and embedding providers are external capabilities with narrow
//! contracts; the retriever is the index abstraction the facade writes
//! through. All three are injected, never globally registered.

pub mod embedding;
pub mod language_model;
pub mod retriever;

pub use embedding::TextEmbedder;
pub use language_model::LanguageModel;
pub use retriever::Retriever;
