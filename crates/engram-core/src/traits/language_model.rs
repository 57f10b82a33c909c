// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured-output LLM contract.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::types::ConversationMessage;

/// An external LLM capability with a strict structured-output mode.
///
/// `run` sends the messages with a JSON-schema response constraint and
/// returns the parsed object. Provider failures surface as
/// [`EngramError::Provider`]; callers decide whether a failure is fatal.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Issue one completion constrained to `response_schema`.
    async fn run(
        &self,
        messages: &[ConversationMessage],
        response_schema: serde_json::Value,
    ) -> Result<serde_json::Value, EngramError>;
}
