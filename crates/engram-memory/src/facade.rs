// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory facade: the stable public API over extraction,
//! reconciliation, the index, and the audit trail.
//!
//! Every public method starts with an explicit collaborator guard that
//! fails fast with a configuration error before any I/O. Scope fields
//! (`user_id`/`session_id`) are merged into every read and write so a
//! caller can never cross partitions by accident.

use std::sync::Arc;

use engram_config::EngramConfig;
use engram_core::types::{
    utc_now_iso, ActionEntry, ConversationMessage, MemoryActionItem, MemoryEvent, MemoryRecord,
    MessageEntry, Metadata, ScoredMemoryItem, SearchOptions, SortSpec,
};
use engram_core::{EngramError, LanguageModel, Retriever};
use engram_store::HistoryStore;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::extractor::FactExtractor;
use crate::reconciler::{gather_candidates, MemoryReconciler};

/// Options for [`Memory::add`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddOptions {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Metadata attached to new/updated records and history entries.
    #[serde(default)]
    pub metadata: Metadata,
    /// Extra filter keys applied to candidate lookup.
    #[serde(default)]
    pub filters: Metadata,
}

/// Options for [`Memory::search`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub k: Option<usize>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub filter: Metadata,
    #[serde(default)]
    pub sort: Option<Vec<SortSpec>>,
}

/// Options for [`Memory::filter`] and [`Memory::delete_all`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    pub k: Option<usize>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub filter: Metadata,
    #[serde(default)]
    pub sort: Option<Vec<SortSpec>>,
}

/// Options for [`Memory::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOptions {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One action that could not be applied during [`Memory::add`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFailure {
    pub memory_id: String,
    pub event: MemoryEvent,
    pub error: String,
}

/// Result of [`Memory::add`]: applied actions plus any that failed.
///
/// One bad action never silently drops the rest of the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddOutcome {
    pub results: Vec<MemoryActionItem>,
    #[serde(default)]
    pub failures: Vec<ActionFailure>,
}

/// Builder for [`Memory`] with injected collaborators.
#[derive(Default)]
pub struct MemoryBuilder {
    config: Option<EngramConfig>,
    llm: Option<Arc<dyn LanguageModel>>,
    retriever: Option<Arc<dyn Retriever>>,
    history: Option<Arc<HistoryStore>>,
}

impl MemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngramConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn language_model(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn history_store(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Build the facade. Collaborators stay optional here; each operation
    /// guards for what it actually needs.
    pub fn build(self) -> Memory {
        Memory {
            config: self.config.unwrap_or_default(),
            llm: self.llm,
            retriever: self.retriever,
            history: self.history,
        }
    }
}

/// Durable, queryable memory for conversational agents.
pub struct Memory {
    config: EngramConfig,
    llm: Option<Arc<dyn LanguageModel>>,
    retriever: Option<Arc<dyn Retriever>>,
    history: Option<Arc<HistoryStore>>,
}

impl Memory {
    pub fn builder() -> MemoryBuilder {
        MemoryBuilder::new()
    }

    // --- collaborator guards (checked before any I/O) ---

    fn require_retriever(&self) -> Result<&Arc<dyn Retriever>, EngramError> {
        self.retriever
            .as_ref()
            .ok_or_else(|| EngramError::Config("no retriever configured".to_string()))
    }

    fn require_history(&self) -> Result<&Arc<HistoryStore>, EngramError> {
        self.history
            .as_ref()
            .ok_or_else(|| EngramError::Config("no history store configured".to_string()))
    }

    fn require_llm(&self) -> Result<&Arc<dyn LanguageModel>, EngramError> {
        self.llm
            .as_ref()
            .ok_or_else(|| EngramError::Config("no language model configured".to_string()))
    }

    /// Ingest a transcript: extract facts, reconcile them against stored
    /// memories, and apply the resulting actions.
    ///
    /// The raw messages are logged to the history store unconditionally,
    /// before extraction — they survive even when reconciliation fails.
    pub async fn add(
        &self,
        messages: &[ConversationMessage],
        options: AddOptions,
    ) -> Result<AddOutcome, EngramError> {
        let llm = self.require_llm()?.clone();
        let retriever = self.require_retriever()?.clone();
        let history = self.require_history()?.clone();

        if messages.is_empty() {
            return Err(EngramError::Validation(
                "transcript must contain at least one message".to_string(),
            ));
        }
        if messages.iter().any(|m| m.role.trim().is_empty()) {
            return Err(EngramError::Validation(
                "every message needs a role".to_string(),
            ));
        }

        let now = utc_now_iso();
        history
            .add_message(&MessageEntry {
                id: Uuid::new_v4().to_string(),
                user_id: options.user_id.clone(),
                session_id: options.session_id.clone(),
                messages: messages.to_vec(),
                metadata: options.metadata.clone(),
                created_at: now.clone(),
                updated_at: now,
            })
            .await?;

        let facts = FactExtractor::new(llm.clone()).extract(messages).await?;
        if facts.is_empty() {
            debug!("transcript produced no facts");
            return Ok(AddOutcome::default());
        }

        let scope = scoped_filter(&options.user_id, &options.session_id, &options.filters);
        let candidates = gather_candidates(
            retriever.as_ref(),
            &facts,
            &scope,
            self.config.memory.candidate_k,
        )
        .await;

        let actions = MemoryReconciler::new(llm)
            .reconcile(&facts, &candidates)
            .await?;

        let mut outcome = AddOutcome::default();
        for action in actions {
            match self
                .apply_action(&action, &options, retriever.as_ref(), history.as_ref())
                .await
            {
                Ok(item) => {
                    counter!("engram_memory_actions_total", "event" => item.event.as_str())
                        .increment(1);
                    outcome.results.push(item);
                }
                Err(e) => {
                    warn!(memory_id = %action.id, event = action.event.as_str(),
                        "memory action failed: {e}");
                    counter!("engram_memory_actions_total", "event" => "failed").increment(1);
                    outcome.failures.push(ActionFailure {
                        memory_id: action.id.clone(),
                        event: action.event,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    /// Apply one reconciled action. History is written before the index
    /// mutation so the audit trail never lags behind observable state.
    async fn apply_action(
        &self,
        action: &MemoryActionItem,
        options: &AddOptions,
        retriever: &dyn Retriever,
        history: &HistoryStore,
    ) -> Result<MemoryActionItem, EngramError> {
        let now = utc_now_iso();
        match action.event {
            MemoryEvent::Add => {
                let record = MemoryRecord {
                    id: action.id.clone(),
                    user_id: options.user_id.clone(),
                    session_id: options.session_id.clone(),
                    memory: action.memory.clone(),
                    metadata: options.metadata.clone(),
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };
                history
                    .add_history(&history_entry(&record, MemoryEvent::Add, None, &now))
                    .await?;
                retriever.insert(&record).await?;
                Ok(action.clone())
            }
            MemoryEvent::Update => {
                let existing = retriever
                    .get(&action.id)
                    .await?
                    .ok_or_else(|| EngramError::NotFound {
                        id: action.id.clone(),
                    })?;
                // Scope fields and created_at survive; metadata merges.
                let mut record = existing.clone();
                record.memory = action.memory.clone();
                record.updated_at = now.clone();
                for (key, value) in &options.metadata {
                    record.metadata.insert(key.clone(), value.clone());
                }
                history
                    .add_history(&history_entry(
                        &record,
                        MemoryEvent::Update,
                        Some(existing.memory.clone()),
                        &now,
                    ))
                    .await?;
                retriever.update(&record).await?;
                Ok(MemoryActionItem {
                    old_memory: Some(existing.memory),
                    ..action.clone()
                })
            }
            MemoryEvent::Delete => {
                let existing = retriever
                    .get(&action.id)
                    .await?
                    .ok_or_else(|| EngramError::NotFound {
                        id: action.id.clone(),
                    })?;
                let mut entry = history_entry(
                    &existing,
                    MemoryEvent::Delete,
                    Some(existing.memory.clone()),
                    &now,
                );
                entry.new_memory = None;
                entry.is_deleted = true;
                history.add_history(&entry).await?;
                retriever.delete(&action.id).await?;
                Ok(MemoryActionItem {
                    old_memory: Some(existing.memory),
                    ..action.clone()
                })
            }
            MemoryEvent::None => {
                // Audit-only: no index mutation.
                let existing = retriever.get(&action.id).await?;
                let text = existing
                    .as_ref()
                    .map(|r| r.memory.clone())
                    .unwrap_or_else(|| action.memory.clone());
                let mut entry = ActionEntry {
                    id: Uuid::new_v4().to_string(),
                    memory_id: action.id.clone(),
                    old_memory: None,
                    new_memory: Some(text),
                    event: MemoryEvent::None,
                    user_id: options.user_id.clone(),
                    session_id: options.session_id.clone(),
                    metadata: options.metadata.clone(),
                    is_deleted: false,
                    created_at: now.clone(),
                    updated_at: now,
                };
                if let Some(existing) = existing {
                    entry.user_id = existing.user_id;
                    entry.session_id = existing.session_id;
                    entry.metadata = existing.metadata;
                }
                history.add_history(&entry).await?;
                Ok(action.clone())
            }
        }
    }

    /// Ranked search scoped to the caller's partition.
    pub async fn search(
        &self,
        query: &str,
        request: SearchRequest,
    ) -> Result<Vec<ScoredMemoryItem>, EngramError> {
        let retriever = self.require_retriever()?;
        let k = request.k.unwrap_or(self.config.memory.search_limit);
        let opts = SearchOptions {
            filter: scoped_filter(&request.user_id, &request.session_id, &request.filter),
            sort: request.sort,
        };
        retriever.search_with_score(query, k, &opts).await
    }

    /// List records matching a filter, bypassing ranking.
    pub async fn filter(&self, options: FilterOptions) -> Result<Vec<MemoryRecord>, EngramError> {
        let retriever = self.require_retriever()?;
        let k = options.k.unwrap_or(self.config.memory.search_limit);
        let opts = SearchOptions {
            filter: scoped_filter(&options.user_id, &options.session_id, &options.filter),
            sort: options.sort,
        };
        retriever.list(k, &opts).await
    }

    /// Fetch one record, erroring when it does not exist.
    pub async fn get(&self, id: &str) -> Result<MemoryRecord, EngramError> {
        let retriever = self.require_retriever()?;
        retriever
            .get(id)
            .await?
            .ok_or_else(|| EngramError::NotFound { id: id.to_string() })
    }

    /// Programmatic write bypassing extraction and reconciliation.
    pub async fn create(
        &self,
        memory: &str,
        options: CreateOptions,
    ) -> Result<MemoryRecord, EngramError> {
        let retriever = self.require_retriever()?;
        let history = self.require_history()?;
        if memory.trim().is_empty() {
            return Err(EngramError::Validation(
                "memory text must not be empty".to_string(),
            ));
        }

        let now = utc_now_iso();
        let record = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            user_id: options.user_id,
            session_id: options.session_id,
            memory: memory.to_string(),
            metadata: options.metadata,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        history
            .add_history(&history_entry(&record, MemoryEvent::Add, None, &now))
            .await?;
        retriever.insert(&record).await?;
        counter!("engram_memory_actions_total", "event" => "add").increment(1);
        Ok(record)
    }

    /// Replace a record's text. Scope fields are immutable.
    pub async fn update(&self, id: &str, memory: &str) -> Result<MemoryRecord, EngramError> {
        let retriever = self.require_retriever()?;
        let history = self.require_history()?;
        if memory.trim().is_empty() {
            return Err(EngramError::Validation(
                "memory text must not be empty".to_string(),
            ));
        }

        let existing = retriever
            .get(id)
            .await?
            .ok_or_else(|| EngramError::NotFound { id: id.to_string() })?;

        let now = utc_now_iso();
        let mut record = existing.clone();
        record.memory = memory.to_string();
        record.updated_at = now.clone();

        history
            .add_history(&history_entry(
                &record,
                MemoryEvent::Update,
                Some(existing.memory),
                &now,
            ))
            .await?;
        retriever.update(&record).await?;
        counter!("engram_memory_actions_total", "event" => "update").increment(1);
        Ok(record)
    }

    /// Remove a record. The history tombstone keeps the final text.
    pub async fn delete(&self, id: &str) -> Result<(), EngramError> {
        let retriever = self.require_retriever()?;
        let history = self.require_history()?;

        let existing = retriever
            .get(id)
            .await?
            .ok_or_else(|| EngramError::NotFound { id: id.to_string() })?;

        let now = utc_now_iso();
        let mut entry = history_entry(
            &existing,
            MemoryEvent::Delete,
            Some(existing.memory.clone()),
            &now,
        );
        entry.new_memory = None;
        entry.is_deleted = true;
        history.add_history(&entry).await?;
        retriever.delete(id).await?;
        counter!("engram_memory_actions_total", "event" => "delete").increment(1);
        Ok(())
    }

    /// Bulk delete by filter. Returns the number of records removed.
    pub async fn delete_all(&self, options: FilterOptions) -> Result<usize, EngramError> {
        let retriever = self.require_retriever()?;
        let history = self.require_history()?;

        let opts = SearchOptions {
            filter: scoped_filter(&options.user_id, &options.session_id, &options.filter),
            sort: None,
        };
        let victims = retriever.list(usize::MAX, &opts).await?;
        let now = utc_now_iso();
        let mut ids = Vec::with_capacity(victims.len());
        for record in &victims {
            let mut entry =
                history_entry(record, MemoryEvent::Delete, Some(record.memory.clone()), &now);
            entry.new_memory = None;
            entry.is_deleted = true;
            history.add_history(&entry).await?;
            ids.push(record.id.clone());
        }
        retriever.delete_all(&ids).await?;
        Ok(ids.len())
    }

    /// The full audit trail for one memory, oldest first.
    pub async fn history(&self, memory_id: &str) -> Result<Vec<ActionEntry>, EngramError> {
        let history = self.require_history()?;
        history.get_history(memory_id).await
    }

    /// Destructive: wipe the index and both history logs for this space.
    /// Intended for tests and dev resets only.
    pub async fn reset(&self) -> Result<(), EngramError> {
        let retriever = self.require_retriever()?;
        let history = self.require_history()?;
        retriever.reset().await?;
        history.reset().await
    }
}

/// Merge scope fields into a filter map. Explicit scope wins over any
/// same-named key in the extra filter.
fn scoped_filter(
    user_id: &Option<String>,
    session_id: &Option<String>,
    extra: &Metadata,
) -> Metadata {
    let mut filter = extra.clone();
    if let Some(user_id) = user_id {
        filter.insert("user_id".to_string(), Value::String(user_id.clone()));
    }
    if let Some(session_id) = session_id {
        filter.insert("session_id".to_string(), Value::String(session_id.clone()));
    }
    filter
}

/// Build a history entry snapshotting the record at mutation time.
fn history_entry(
    record: &MemoryRecord,
    event: MemoryEvent,
    old_memory: Option<String>,
    now: &str,
) -> ActionEntry {
    ActionEntry {
        id: Uuid::new_v4().to_string(),
        memory_id: record.id.clone(),
        old_memory,
        new_memory: Some(record.memory.clone()),
        event,
        user_id: record.user_id.clone(),
        session_id: record.session_id.clone(),
        metadata: record.metadata.clone(),
        is_deleted: false,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}
