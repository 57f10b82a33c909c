// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! String-keyed dispatch over the memory facade.
//!
//! `Memory::run` lets hosts wire the engine behind a tool-call or RPC
//! surface without enumerating methods: the action name selects the
//! operation and a JSON object carries its inputs.

use serde::Deserialize;
use serde_json::{json, Value};
use strum::{Display, EnumString};

use engram_core::types::ConversationMessage;
use engram_core::EngramError;

use crate::facade::{AddOptions, CreateOptions, FilterOptions, Memory, SearchRequest};

/// Actions accepted by [`Memory::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MemoryAction {
    Add,
    Search,
    Filter,
    Get,
    Create,
    Update,
    Delete,
    DeleteAll,
    Reset,
}

#[derive(Deserialize)]
struct AddInputs {
    messages: Vec<ConversationMessage>,
    #[serde(flatten)]
    options: AddOptions,
}

#[derive(Deserialize)]
struct SearchInputs {
    query: String,
    #[serde(flatten)]
    request: SearchRequest,
}

#[derive(Deserialize)]
struct GetInputs {
    id: String,
}

#[derive(Deserialize)]
struct CreateInputs {
    memory: String,
    #[serde(flatten)]
    options: CreateOptions,
}

#[derive(Deserialize)]
struct UpdateInputs {
    id: String,
    memory: String,
}

impl Memory {
    /// Dispatch one operation by action name with JSON inputs.
    ///
    /// Unknown actions and malformed inputs are validation errors; the
    /// dispatched operation's own errors pass through unchanged.
    pub async fn run(&self, action: &str, inputs: Value) -> Result<Value, EngramError> {
        let action: MemoryAction = action.parse().map_err(|_| {
            EngramError::Validation(format!("unknown memory action: {action:?}"))
        })?;

        match action {
            MemoryAction::Add => {
                let inputs: AddInputs = parse(inputs)?;
                let outcome = self.add(&inputs.messages, inputs.options).await?;
                encode(&outcome)
            }
            MemoryAction::Search => {
                let inputs: SearchInputs = parse(inputs)?;
                let results = self.search(&inputs.query, inputs.request).await?;
                Ok(json!({ "results": encode(&results)? }))
            }
            MemoryAction::Filter => {
                let options: FilterOptions = parse(inputs)?;
                let results = self.filter(options).await?;
                Ok(json!({ "results": encode(&results)? }))
            }
            MemoryAction::Get => {
                let inputs: GetInputs = parse(inputs)?;
                encode(&self.get(&inputs.id).await?)
            }
            MemoryAction::Create => {
                let inputs: CreateInputs = parse(inputs)?;
                encode(&self.create(&inputs.memory, inputs.options).await?)
            }
            MemoryAction::Update => {
                let inputs: UpdateInputs = parse(inputs)?;
                encode(&self.update(&inputs.id, &inputs.memory).await?)
            }
            MemoryAction::Delete => {
                let inputs: GetInputs = parse(inputs)?;
                self.delete(&inputs.id).await?;
                Ok(json!({ "deleted": inputs.id }))
            }
            MemoryAction::DeleteAll => {
                let options: FilterOptions = parse(inputs)?;
                let deleted = self.delete_all(options).await?;
                Ok(json!({ "deleted": deleted }))
            }
            MemoryAction::Reset => {
                self.reset().await?;
                Ok(json!({ "reset": true }))
            }
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(inputs: Value) -> Result<T, EngramError> {
    serde_json::from_value(inputs)
        .map_err(|e| EngramError::Validation(format!("invalid inputs: {e}")))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, EngramError> {
    serde_json::to_value(value).map_err(|e| EngramError::Internal(format!("encoding result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_parse_snake_case() {
        assert_eq!("add".parse::<MemoryAction>().unwrap(), MemoryAction::Add);
        assert_eq!(
            "delete_all".parse::<MemoryAction>().unwrap(),
            MemoryAction::DeleteAll
        );
        assert!("deleteAll".parse::<MemoryAction>().is_err());
        assert!("compact".parse::<MemoryAction>().is_err());
    }

    #[test]
    fn action_names_round_trip_through_display() {
        for action in [
            MemoryAction::Add,
            MemoryAction::Search,
            MemoryAction::Filter,
            MemoryAction::Get,
            MemoryAction::Create,
            MemoryAction::Update,
            MemoryAction::Delete,
            MemoryAction::DeleteAll,
            MemoryAction::Reset,
        ] {
            let name = action.to_string();
            assert_eq!(name.parse::<MemoryAction>().unwrap(), action);
        }
    }

    #[tokio::test]
    async fn unknown_action_is_a_validation_error() {
        let memory = Memory::builder().build();
        let err = memory.run("explode", json!({})).await.unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }

    #[tokio::test]
    async fn malformed_inputs_are_a_validation_error() {
        let memory = Memory::builder().build();
        let err = memory
            .run("get", json!({ "wrong": "shape" }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }
}
