// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for the Engram memory engine.
//!
//! TOML file plus `ENGRAM_*` environment overrides, merged through Figment
//! onto compiled defaults.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    EngramConfig, HistoryConfig, IndexConfig, LlmConfig, MemoryConfig, SpaceConfig,
};
