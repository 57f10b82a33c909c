// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Engram memory engine.

use thiserror::Error;

/// The primary error type used across all Engram traits and operations.
///
/// Variants are split so callers can tell "nothing to retry" failures
/// (config, validation, not-found) apart from transient ones (provider,
/// storage, consistency timeout). See [`EngramError::is_retryable`].
#[derive(Debug, Error)]
pub enum EngramError {
    /// A required collaborator or setting is missing. Raised before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input to a public method.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation targeted a memory id that does not exist.
    #[error("memory not found: {id}")]
    NotFound { id: String },

    /// LLM or index backend failure.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Relational store failure (connection, query, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An index mutation task did not reach a terminal state in time.
    #[error("index task did not settle within {duration:?}")]
    ConsistencyTimeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngramError {
    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        EngramError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Whether retrying the failed operation could plausibly succeed.
    ///
    /// Provider, storage, and timeout failures are transient; config,
    /// validation, and not-found failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngramError::Provider { .. }
                | EngramError::Storage { .. }
                | EngramError::ConsistencyTimeout { .. }
        )
    }
}
