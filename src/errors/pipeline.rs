// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::{ConfigError, QueueError, RegistryError, SessionError};

/// Failure taxonomy shared by dispatch, the task queue and error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    WorkerUnavailable,
    Timeout,
    MalformedResult,
    /// Current value missing or zero. A classification, never recorded as an error.
    ComparisonAmbiguous,
    StoreWriteConflict,
    RetriesExhausted,
    SessionCancelled,
    /// Failure reported by the worker itself; recoverability is the worker's call.
    WorkerReported,
    /// Item whose modification task never ran because a predecessor failed.
    DependencyBlocked,
}

impl ErrorKind {
    /// Whether a failure of this kind is retried when nothing else is known.
    ///
    /// `MalformedResult` depends on `retry_on_error` and is decided by dispatch.
    pub fn recoverable_by_default(self) -> bool {
        matches!(
            self,
            ErrorKind::WorkerUnavailable | ErrorKind::Timeout | ErrorKind::StoreWriteConflict
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::WorkerUnavailable => "worker_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MalformedResult => "malformed_result",
            ErrorKind::ComparisonAmbiguous => "comparison_ambiguous",
            ErrorKind::StoreWriteConflict => "store_write_conflict",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::SessionCancelled => "session_cancelled",
            ErrorKind::WorkerReported => "worker_reported",
            ErrorKind::DependencyBlocked => "dependency_blocked",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform failure shape for one task attempt.
///
/// Workers return it directly; dispatch produces it for unavailable workers,
/// timeouts and malformed results so the queue's retry policy sees one shape.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub recoverable: bool,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: ErrorKind, recoverable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            recoverable,
            message: message.into(),
        }
    }

    /// Failure with the kind's default recoverability.
    pub fn of(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, kind.recoverable_by_default(), message)
    }

    /// Worker-reported failure worth retrying.
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WorkerReported, true, message)
    }

    /// Worker-reported failure that must not be retried.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WorkerReported, false, message)
    }
}

/// Top-level error for anything that prevents a session from running at all.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("no data sources selected")]
    NoDataSources,

    #[error("unknown data source '{0}'")]
    UnknownDataSource(String),
}
