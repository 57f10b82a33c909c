// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk layout of a memory space.
//!
//! A space is one directory holding a `space.toml` identity file and the
//! `history.db` relational store. The index database lives under a
//! separate configurable root, addressed by the space's generated id, so
//! moving or renaming the space directory never orphans its index.

use std::fs;
use std::path::{Path, PathBuf};

use engram_core::types::utc_now_iso;
use engram_core::EngramError;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

const IDENTITY_FILE: &str = "space.toml";
const HISTORY_FILE: &str = "history.db";

/// Identity of a memory space, persisted as `space.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpaceIdentity {
    /// Stable generated id; never derived from the directory path.
    pub id: String,
    pub created_at: String,
}

/// Resolved paths for one memory space directory.
#[derive(Debug, Clone)]
pub struct SpaceLayout {
    dir: PathBuf,
    identity: SpaceIdentity,
}

impl SpaceLayout {
    /// Open a space directory, creating it and its identity file on first
    /// use. Re-opening an existing space returns the persisted identity.
    pub fn ensure(dir: impl AsRef<Path>) -> Result<Self, EngramError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(storage)?;

        let identity_path = dir.join(IDENTITY_FILE);
        let identity = if identity_path.exists() {
            let raw = fs::read_to_string(&identity_path).map_err(storage)?;
            toml::from_str(&raw).map_err(|e| {
                EngramError::Config(format!(
                    "invalid identity file {}: {e}",
                    identity_path.display()
                ))
            })?
        } else {
            let identity = SpaceIdentity {
                id: Uuid::new_v4().to_string(),
                created_at: utc_now_iso(),
            };
            let raw = toml::to_string_pretty(&identity)
                .map_err(|e| EngramError::Internal(format!("identity serialization: {e}")))?;
            fs::write(&identity_path, raw).map_err(storage)?;
            debug!(space_id = %identity.id, dir = %dir.display(), "created memory space");
            identity
        };

        Ok(Self { dir, identity })
    }

    pub fn identity(&self) -> &SpaceIdentity {
        &self.identity
    }

    /// Path of the relational history database inside the space directory.
    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Path of the index database for this space under `index_root`.
    pub fn index_path(&self, index_root: impl AsRef<Path>) -> PathBuf {
        index_root.as_ref().join(format!("{}.db", self.identity.id))
    }
}

fn storage(e: std::io::Error) -> EngramError {
    EngramError::Storage { source: Box::new(e) }
}
