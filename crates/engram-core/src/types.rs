// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Engram workspace.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp format used everywhere a row stores a time.
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC time as an ISO 8601 string with millisecond precision.
pub fn utc_now_iso() -> String {
    chrono::Utc::now().format(ISO_FORMAT).to_string()
}

/// Free-form metadata attached to records, history entries, and filters.
pub type Metadata = Map<String, Value>;

/// One message of a raw conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Speaker role ("user", "assistant", "system").
    pub role: String,
    /// Plain-text message content.
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// What the reconciler decided to do with one memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryEvent {
    /// Store a brand-new fact.
    Add,
    /// Revise an existing memory's text.
    Update,
    /// Retire an existing memory.
    Delete,
    /// Keep the existing memory unchanged (still audit-logged).
    None,
}

impl MemoryEvent {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryEvent::Add => "add",
            MemoryEvent::Update => "update",
            MemoryEvent::Delete => "delete",
            MemoryEvent::None => "none",
        }
    }

    /// Parse from SQLite string. Unknown strings degrade to `None`.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "add" => MemoryEvent::Add,
            "update" => MemoryEvent::Update,
            "delete" => MemoryEvent::Delete,
            _ => MemoryEvent::None,
        }
    }
}

/// A live memory record, owned by the search index.
///
/// `user_id` and `session_id` define the write/read partition and are
/// immutable after creation. Everything else may change via `update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque, stable, generator-assigned identity.
    pub id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// The factual statement itself.
    pub memory: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// A memory record with a retrieval score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemoryItem {
    pub record: MemoryRecord,
    pub score: f32,
}

/// Transient reconciliation output. Drives writes to the index and the
/// audit trail; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryActionItem {
    pub id: String,
    pub memory: String,
    pub event: MemoryEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_memory: Option<String>,
}

/// One append-only audit entry per memory mutation, including no-ops.
///
/// Carries a scope/metadata snapshot of the record at mutation time so the
/// live index can be rebuilt from history alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub id: String,
    pub memory_id: String,
    pub old_memory: Option<String>,
    pub new_memory: Option<String>,
    pub event: MemoryEvent,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One append-only entry per raw message batch ingested, independent of
/// whether any memory mutation resulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: String,
    pub updated_at: String,
}

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key for list queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Filter and sort options for retriever queries.
///
/// Filter semantics: equality per key, or IN-membership when the value is
/// an array; all keys must match (conjunction). `user_id` and `session_id`
/// match top-level record fields, any other key matches metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub filter: Metadata,
    #[serde(default)]
    pub sort: Option<Vec<SortSpec>>,
}

impl SearchOptions {
    pub fn with_filter(filter: Metadata) -> Self {
        Self { filter, sort: None }
    }
}
