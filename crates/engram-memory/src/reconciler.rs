// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based reconciliation of new facts against stored memories.
//!
//! Candidates are presented to the model under short numeric aliases
//! (`0..n-1`) instead of their opaque ids — long ids get corrupted or
//! truncated when a model copies them back. After the call, aliases are
//! remapped to stable ids; an alias the model made up becomes a fresh
//! `add` with a generated id rather than failing the batch.

use std::collections::HashSet;
use std::sync::Arc;

use engram_core::types::{ConversationMessage, MemoryActionItem, MemoryEvent, Metadata, SearchOptions};
use engram_core::{EngramError, LanguageModel, Retriever};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Prompt for the reconciliation call. `{facts}` and `{memories}` are
/// replaced with JSON renderings.
const RECONCILE_PROMPT: &str = r#"You are maintaining a long-term memory store. Compare the newly retrieved facts with the existing memories and decide, for every resulting memory, one of four events:

- "add": the fact is new; no existing memory covers it
- "update": an existing memory covers the same subject but the fact changes or refines it; output the revised text
- "delete": an existing memory is contradicted and should be removed
- "none": an existing memory already states the fact; nothing changes

Rules:
- Reference existing memories only by their "id" value exactly as given.
- For "add", use an empty string as the id.
- For "update" and "delete", set "old_memory" to the existing text.
- Do not invent memories that are neither in the facts nor in the existing list.

New facts:
{facts}

Existing memories:
{memories}"#;

/// One existing memory offered to the model, under its alias.
#[derive(Debug, Clone, Serialize)]
struct AliasedMemory {
    id: String,
    text: String,
}

/// An existing memory considered during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub text: String,
}

/// Structured-output shape of the reconciliation response.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub(crate) struct DecisionList {
    pub memories: Vec<Decision>,
}

/// One per-memory decision as emitted by the model. `id` is an alias (or
/// empty for adds); `event` is a lowercase event tag.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub(crate) struct Decision {
    pub id: String,
    pub text: String,
    pub event: String,
    #[serde(default)]
    pub old_memory: Option<String>,
}

/// Decides add/update/delete/none per fact via one LLM round-trip.
pub struct MemoryReconciler {
    llm: Arc<dyn LanguageModel>,
}

impl MemoryReconciler {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Reconcile new facts against candidate memories.
    ///
    /// Returns the typed action list with stable ids. An LLM failure or a
    /// response that does not match the schema is fatal to the caller.
    pub async fn reconcile(
        &self,
        new_facts: &[String],
        candidates: &[Candidate],
    ) -> Result<Vec<MemoryActionItem>, EngramError> {
        if new_facts.is_empty() {
            return Ok(vec![]);
        }

        // Alias table: position = alias handed to the model.
        let aliased: Vec<AliasedMemory> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| AliasedMemory {
                id: i.to_string(),
                text: c.text.clone(),
            })
            .collect();

        let facts_json = serde_json::to_string_pretty(new_facts)
            .map_err(|e| EngramError::Internal(format!("facts serialization: {e}")))?;
        let memories_json = serde_json::to_string_pretty(&aliased)
            .map_err(|e| EngramError::Internal(format!("candidate serialization: {e}")))?;
        let prompt = RECONCILE_PROMPT
            .replace("{facts}", &facts_json)
            .replace("{memories}", &memories_json);

        let schema = serde_json::to_value(schemars::schema_for!(DecisionList))
            .map_err(|e| EngramError::Internal(format!("decision schema serialization: {e}")))?;

        let response = self
            .llm
            .run(&[ConversationMessage::new("user", prompt)], schema)
            .await?;
        let parsed: DecisionList = serde_json::from_value(response).map_err(|e| {
            EngramError::provider(format!("reconciliation response did not match schema: {e}"))
        })?;

        Ok(remap_decisions(parsed, candidates))
    }
}

/// Translate model decisions back into stable-id action items.
///
/// The alias table defends against id corruption; an alias outside the
/// table is treated as a hallucination and downgraded to a fresh `add`.
fn remap_decisions(decisions: DecisionList, candidates: &[Candidate]) -> Vec<MemoryActionItem> {
    let mut items = Vec::with_capacity(decisions.memories.len());

    for decision in decisions.memories {
        let event = MemoryEvent::from_str_value(&decision.event);

        if event == MemoryEvent::Add {
            items.push(MemoryActionItem {
                id: Uuid::new_v4().to_string(),
                memory: decision.text,
                event: MemoryEvent::Add,
                old_memory: None,
            });
            continue;
        }

        // Non-add events must reference an existing memory by alias.
        match decision.id.trim().parse::<usize>() {
            Ok(alias) if alias < candidates.len() => {
                let candidate = &candidates[alias];
                items.push(MemoryActionItem {
                    id: candidate.id.clone(),
                    memory: decision.text,
                    event,
                    old_memory: decision.old_memory.or_else(|| Some(candidate.text.clone())),
                });
            }
            _ => {
                warn!(
                    alias = %decision.id,
                    "reconciler referenced an unknown memory alias, storing as a new memory"
                );
                items.push(MemoryActionItem {
                    id: Uuid::new_v4().to_string(),
                    memory: decision.text,
                    event: MemoryEvent::Add,
                    old_memory: None,
                });
            }
        }
    }

    items
}

/// Fetch candidate memories for each fact, scoped by the caller's filter.
///
/// Candidates are merged and de-duplicated by id in discovery order — the
/// same order the alias table is built in. A per-fact search failure is
/// logged and degrades that fact to an empty candidate set; it never
/// aborts the batch.
pub async fn gather_candidates(
    retriever: &dyn Retriever,
    facts: &[String],
    filter: &Metadata,
    k: usize,
) -> Vec<Candidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for fact in facts {
        let opts = SearchOptions::with_filter(filter.clone());
        match retriever.search(fact, k, &opts).await {
            Ok(records) => {
                for record in records {
                    if seen.insert(record.id.clone()) {
                        candidates.push(Candidate {
                            id: record.id,
                            text: record.memory,
                        });
                    }
                }
            }
            Err(e) => {
                warn!("candidate search failed for a fact, treating it as new: {e}");
            }
        }
    }

    debug!(candidates = candidates.len(), facts = facts.len(), "gathered candidates");
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct ScriptedModel {
        response: serde_json::Value,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn run(
            &self,
            _messages: &[ConversationMessage],
            _response_schema: serde_json::Value,
        ) -> Result<serde_json::Value, EngramError> {
            Ok(self.response.clone())
        }
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate {
                id: "stable-id-aaaa".to_string(),
                text: "User likes pizza".to_string(),
            },
            Candidate {
                id: "stable-id-bbbb".to_string(),
                text: "User lives in Berlin".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn update_remaps_alias_to_stable_id() {
        let reconciler = MemoryReconciler::new(Arc::new(ScriptedModel {
            response: json!({"memories": [
                {"id": "0", "text": "User prefers sushi over pizza", "event": "update",
                 "old_memory": "User likes pizza"}
            ]}),
        }));
        let items = reconciler
            .reconcile(&["User prefers sushi".to_string()], &candidates())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "stable-id-aaaa");
        assert_eq!(items[0].event, MemoryEvent::Update);
        assert_eq!(items[0].old_memory.as_deref(), Some("User likes pizza"));
    }

    #[tokio::test]
    async fn add_gets_a_fresh_generated_id() {
        let reconciler = MemoryReconciler::new(Arc::new(ScriptedModel {
            response: json!({"memories": [
                {"id": "", "text": "User has a cat", "event": "add"}
            ]}),
        }));
        let items = reconciler
            .reconcile(&["User has a cat".to_string()], &candidates())
            .await
            .unwrap();
        assert_eq!(items[0].event, MemoryEvent::Add);
        assert!(!items[0].id.is_empty());
        assert_ne!(items[0].id, "stable-id-aaaa");
    }

    #[tokio::test]
    async fn hallucinated_alias_becomes_fresh_add() {
        // Alias 7 does not exist (table has 2 entries).
        let reconciler = MemoryReconciler::new(Arc::new(ScriptedModel {
            response: json!({"memories": [
                {"id": "7", "text": "User plays chess", "event": "update"}
            ]}),
        }));
        let items = reconciler
            .reconcile(&["User plays chess".to_string()], &candidates())
            .await
            .unwrap();
        assert_eq!(items.len(), 1, "hallucinated alias must not drop the entry");
        assert_eq!(items[0].event, MemoryEvent::Add);
        assert!(items[0].old_memory.is_none());
    }

    #[tokio::test]
    async fn non_numeric_alias_becomes_fresh_add() {
        let reconciler = MemoryReconciler::new(Arc::new(ScriptedModel {
            response: json!({"memories": [
                {"id": "mem_abc123", "text": "User plays chess", "event": "delete"}
            ]}),
        }));
        let items = reconciler
            .reconcile(&["User plays chess".to_string()], &candidates())
            .await
            .unwrap();
        assert_eq!(items[0].event, MemoryEvent::Add);
    }

    #[tokio::test]
    async fn delete_carries_old_text_from_candidate_when_missing() {
        let reconciler = MemoryReconciler::new(Arc::new(ScriptedModel {
            response: json!({"memories": [
                {"id": "1", "text": "", "event": "delete"}
            ]}),
        }));
        let items = reconciler
            .reconcile(&["User moved away from Berlin".to_string()], &candidates())
            .await
            .unwrap();
        assert_eq!(items[0].id, "stable-id-bbbb");
        assert_eq!(items[0].event, MemoryEvent::Delete);
        assert_eq!(items[0].old_memory.as_deref(), Some("User lives in Berlin"));
    }

    #[tokio::test]
    async fn none_event_keeps_stable_id() {
        let reconciler = MemoryReconciler::new(Arc::new(ScriptedModel {
            response: json!({"memories": [
                {"id": "0", "text": "User likes pizza", "event": "none"}
            ]}),
        }));
        let items = reconciler
            .reconcile(&["User likes pizza".to_string()], &candidates())
            .await
            .unwrap();
        assert_eq!(items[0].event, MemoryEvent::None);
        assert_eq!(items[0].id, "stable-id-aaaa");
    }

    #[tokio::test]
    async fn empty_fact_list_short_circuits_without_llm_call() {
        struct PanickingModel;

        #[async_trait]
        impl LanguageModel for PanickingModel {
            async fn run(
                &self,
                _messages: &[ConversationMessage],
                _response_schema: serde_json::Value,
            ) -> Result<serde_json::Value, EngramError> {
                panic!("must not be called for empty fact lists");
            }
        }

        let reconciler = MemoryReconciler::new(Arc::new(PanickingModel));
        let items = reconciler.reconcile(&[], &candidates()).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn malformed_response_is_fatal() {
        let reconciler = MemoryReconciler::new(Arc::new(ScriptedModel {
            response: json!({"decisions": "not the schema"}),
        }));
        let err = reconciler
            .reconcile(&["fact".to_string()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::Provider { .. }));
    }

    mod candidate_gathering {
        use super::*;
        use engram_core::types::{MemoryRecord, ScoredMemoryItem};

        /// Retriever stub that returns fixed records per query and can be
        /// set to fail on a specific query.
        struct StubRetriever {
            responses: Vec<(String, Vec<MemoryRecord>)>,
            fail_on: Option<String>,
        }

        fn rec(id: &str, memory: &str) -> MemoryRecord {
            MemoryRecord {
                id: id.to_string(),
                user_id: None,
                session_id: None,
                memory: memory.to_string(),
                metadata: Metadata::new(),
                created_at: String::new(),
                updated_at: String::new(),
            }
        }

        #[async_trait]
        impl Retriever for StubRetriever {
            async fn get(&self, _id: &str) -> Result<Option<MemoryRecord>, EngramError> {
                Ok(None)
            }
            async fn insert(&self, _r: &MemoryRecord) -> Result<(), EngramError> {
                Ok(())
            }
            async fn update(&self, _r: &MemoryRecord) -> Result<(), EngramError> {
                Ok(())
            }
            async fn delete(&self, _id: &str) -> Result<(), EngramError> {
                Ok(())
            }
            async fn delete_all(&self, _ids: &[String]) -> Result<(), EngramError> {
                Ok(())
            }
            async fn list(
                &self,
                _k: usize,
                _opts: &SearchOptions,
            ) -> Result<Vec<MemoryRecord>, EngramError> {
                Ok(vec![])
            }
            async fn search(
                &self,
                query: &str,
                _k: usize,
                _opts: &SearchOptions,
            ) -> Result<Vec<MemoryRecord>, EngramError> {
                if self.fail_on.as_deref() == Some(query) {
                    return Err(EngramError::provider("index offline"));
                }
                Ok(self
                    .responses
                    .iter()
                    .find(|(q, _)| q == query)
                    .map(|(_, records)| records.clone())
                    .unwrap_or_default())
            }
            async fn search_with_score(
                &self,
                _query: &str,
                _k: usize,
                _opts: &SearchOptions,
            ) -> Result<Vec<ScoredMemoryItem>, EngramError> {
                Ok(vec![])
            }
            async fn reset(&self) -> Result<(), EngramError> {
                Ok(())
            }
        }

        #[tokio::test]
        async fn merges_and_dedups_by_id_in_discovery_order() {
            let retriever = StubRetriever {
                responses: vec![
                    ("fact a".into(), vec![rec("m1", "one"), rec("m2", "two")]),
                    ("fact b".into(), vec![rec("m2", "two"), rec("m3", "three")]),
                ],
                fail_on: None,
            };
            let out = gather_candidates(
                &retriever,
                &["fact a".to_string(), "fact b".to_string()],
                &Metadata::new(),
                5,
            )
            .await;
            let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
            assert_eq!(ids, vec!["m1", "m2", "m3"]);
        }

        #[tokio::test]
        async fn per_fact_search_failure_degrades_to_empty_set() {
            let retriever = StubRetriever {
                responses: vec![("fact b".into(), vec![rec("m1", "one")])],
                fail_on: Some("fact a".into()),
            };
            let out = gather_candidates(
                &retriever,
                &["fact a".to_string(), "fact b".to_string()],
                &Metadata::new(),
                5,
            )
            .await;
            // The failing fact contributes nothing, the batch survives.
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].id, "m1");
        }
    }
}
