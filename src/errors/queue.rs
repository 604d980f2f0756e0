// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::models::TaskStatus;

/// Errors returned by task queue operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("task '{0}' is already queued")]
    DuplicateTask(String),

    #[error("task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency { task_id: String, dependency: String },

    #[error("task '{0}' not found")]
    UnknownTask(String),

    #[error("task '{task_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}
