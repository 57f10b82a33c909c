// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based fact extraction from conversation transcripts.
//!
//! One structured-output call turns a transcript into a flat list of
//! candidate factual statements. A malformed response is fatal to the
//! calling `add()` — no partial fact list is accepted.

use std::sync::Arc;

use engram_core::types::ConversationMessage;
use engram_core::{EngramError, LanguageModel};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prompt for the extraction call. `{transcript}` is replaced with the
/// serialized conversation.
const EXTRACTION_PROMPT: &str = r#"Extract factual information from this conversation that would be useful to remember for future conversations.

Only include facts that are:
1. Stated by the user (not the assistant)
2. Specific and factual (not opinions unless explicitly stated as preferences)
3. Likely to be relevant in future conversations

Each fact must be a standalone statement (e.g. "The user's dog is named Max").
If there are no memorable facts, return an empty list.

Conversation:
{transcript}"#;

/// Structured-output shape of the extraction response.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub(crate) struct FactList {
    /// Atomic factual statements extracted from the transcript.
    pub facts: Vec<String>,
}

/// Turns a raw transcript into candidate facts via one LLM round-trip.
pub struct FactExtractor {
    llm: Arc<dyn LanguageModel>,
}

impl FactExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Extract facts from the transcript. Empty vec when the conversation
    /// holds nothing worth remembering; never partial results.
    pub async fn extract(
        &self,
        transcript: &[ConversationMessage],
    ) -> Result<Vec<String>, EngramError> {
        let prompt = EXTRACTION_PROMPT.replace("{transcript}", &serialize_transcript(transcript));
        let schema = serde_json::to_value(schemars::schema_for!(FactList))
            .map_err(|e| EngramError::Internal(format!("fact schema serialization: {e}")))?;

        let response = self
            .llm
            .run(&[ConversationMessage::new("user", prompt)], schema)
            .await?;

        let parsed: FactList = serde_json::from_value(response).map_err(|e| {
            EngramError::provider(format!("extraction response did not match schema: {e}"))
        })?;
        debug!(facts = parsed.facts.len(), "extracted facts from transcript");
        Ok(parsed.facts)
    }
}

/// Render the transcript as "Role: text" lines for the prompt.
fn serialize_transcript(transcript: &[ConversationMessage]) -> String {
    let mut out = String::new();
    for message in transcript {
        let role = match message.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            "system" => "System",
            other => other,
        };
        out.push_str(role);
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }
    out
}
