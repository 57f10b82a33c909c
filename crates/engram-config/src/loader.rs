// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults < `engram.toml` in the working directory
//! < `ENGRAM_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::EngramConfig;

/// Load configuration from `./engram.toml` with env var overrides.
pub fn load_config() -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file("engram.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a specific TOML file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Load configuration from TOML content only (no file lookup, no env).
///
/// Used for testing and embedded configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Environment provider mapping `ENGRAM_SECTION_KEY` to `section.key`.
///
/// Uses explicit `map()` rather than `split("_")` so underscore-containing
/// key names stay intact: `ENGRAM_INDEX_TASK_TIMEOUT_SECS` must map to
/// `index.task_timeout_secs`, not `index.task.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("ENGRAM_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("space_", "space.", 1)
            .replacen("index_", "index.", 1)
            .replacen("history_", "history.", 1)
            .replacen("llm_", "llm.", 1)
            .replacen("memory_", "memory.", 1);
        mapped.into()
    })
}
