// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Engram memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at load time.

use serde::{Deserialize, Serialize};

/// Top-level Engram configuration.
///
/// Loaded from `engram.toml` with `ENGRAM_*` environment overrides. All
/// sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngramConfig {
    /// Memory space layout settings.
    #[serde(default)]
    pub space: SpaceConfig,

    /// Search index settings.
    #[serde(default)]
    pub index: IndexConfig,

    /// History store settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Extraction/reconciliation LLM settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Reconciliation pipeline settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Where memory spaces live on disk.
///
/// Each space is one directory under `data_dir` holding a `space.toml`
/// identity file and the history database. The search index is addressed
/// by the space's derived id under `index_root`, not by space path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpaceConfig {
    /// Root directory for memory space directories.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Search index behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Directory holding per-space index databases.
    #[serde(default = "default_index_root")]
    pub index_root: String,

    /// Documents per batch when seeding a cold index from history.
    #[serde(default = "default_seed_batch_size")]
    pub seed_batch_size: usize,

    /// Upper bound on waiting for one index mutation task.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Fixed interval between task status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum cosine similarity for a vector match to count.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Cap on fused candidates considered per search.
    #[serde(default = "default_max_fused_results")]
    pub max_fused_results: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_root: default_index_root(),
            seed_batch_size: default_seed_batch_size(),
            task_timeout_secs: default_task_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            similarity_threshold: default_similarity_threshold(),
            max_fused_results: default_max_fused_results(),
        }
    }
}

/// History store instance caching.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Maximum number of cached open store instances.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Seconds an idle cached instance survives before eviction.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// LLM settings for the extraction and reconciliation calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Model identifier handed to the provider.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Completion token budget per call.
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

/// Reconciliation pipeline tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Candidates fetched per new fact during reconciliation.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,

    /// Default result cap for `search` and `filter`.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_data_dir() -> String {
    "./engram-data".to_string()
}

fn default_index_root() -> String {
    "./engram-data/index".to_string()
}

fn default_seed_batch_size() -> usize {
    2000
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_similarity_threshold() -> f64 {
    0.3
}

fn default_max_fused_results() -> usize {
    100
}

fn default_cache_max_entries() -> usize {
    16
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_llm_model() -> String {
    "default".to_string()
}

fn default_llm_max_tokens() -> u32 {
    2048
}

fn default_candidate_k() -> usize {
    5
}

fn default_search_limit() -> usize {
    100
}
