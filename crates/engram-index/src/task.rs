// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task handles for asynchronous index mutations.
//!
//! Every mutating index call enqueues a job on the single writer and gets
//! a task id back. Callers poll the task table at a fixed interval until
//! the task reaches a terminal state or the bounded timeout elapses; a
//! timeout surfaces as [`EngramError::ConsistencyTimeout`], never silent
//! success.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use engram_core::EngramError;
use tokio::time::Instant;

/// Terminal and in-flight states of one index mutation task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Accepted, waiting for the writer.
    Enqueued,
    /// Writer applied the mutation.
    Succeeded,
    /// Writer failed; the cause's retryability classification survives.
    Failed { message: String, retryable: bool },
}

/// Shared table of in-flight index mutation tasks.
#[derive(Debug, Default)]
pub struct TaskTable {
    statuses: DashMap<u64, TaskStatus>,
    next_id: AtomicU64,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task in the `Enqueued` state.
    pub fn register(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.statuses.insert(id, TaskStatus::Enqueued);
        id
    }

    /// Mark a task as applied.
    pub fn succeed(&self, id: u64) {
        self.statuses.insert(id, TaskStatus::Succeeded);
    }

    /// Mark a task as failed, keeping the cause's retryability.
    pub fn fail(&self, id: u64, error: &EngramError) {
        self.statuses.insert(
            id,
            TaskStatus::Failed {
                message: error.to_string(),
                retryable: error.is_retryable(),
            },
        );
    }

    /// Current status, if the task is known.
    pub fn status(&self, id: u64) -> Option<TaskStatus> {
        self.statuses.get(&id).map(|s| s.clone())
    }

    /// Drop a settled task from the table.
    fn remove(&self, id: u64) {
        self.statuses.remove(&id);
    }
}

/// Poll `task_id` until it settles, at `poll_interval`, for at most
/// `timeout`.
pub async fn wait_for_task(
    tasks: &TaskTable,
    task_id: u64,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), EngramError> {
    let deadline = Instant::now() + timeout;
    loop {
        match tasks.status(task_id) {
            Some(TaskStatus::Succeeded) => {
                tasks.remove(task_id);
                return Ok(());
            }
            Some(TaskStatus::Failed { message, retryable }) => {
                tasks.remove(task_id);
                let message = format!("index task {task_id} failed: {message}");
                return Err(if retryable {
                    EngramError::provider(message)
                } else {
                    EngramError::Internal(message)
                });
            }
            Some(TaskStatus::Enqueued) => {}
            None => {
                // Unknown id: either never registered or already reaped.
                return Err(EngramError::Internal(format!(
                    "index task {task_id} is not tracked"
                )));
            }
        }

        if Instant::now() >= deadline {
            return Err(EngramError::ConsistencyTimeout { duration: timeout });
        }
        tokio::time::sleep(poll_interval).await;
    }
}
