// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding contract for semantic ranking.

use async_trait::async_trait;

use crate::error::EngramError;

/// An external embedding capability.
///
/// Optional: the index falls back to lexical-only search when no embedder
/// is configured or when the configured one fails its startup probe.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed each input text into a vector. Output length must equal
    /// input length.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngramError>;
}
