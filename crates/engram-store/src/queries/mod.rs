// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules over the history database.

pub mod history;
pub mod messages;
