// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::Instant;

use super::{Observation, Phase, ValidationDetail};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Validation,
    Modification,
    Report,
}

impl TaskKind {
    /// The session phase a task of this kind belongs to.
    pub fn phase(self) -> Phase {
        match self {
            TaskKind::Validation => Phase::Validation,
            TaskKind::Modification => Phase::Modification,
            TaskKind::Report => Phase::Finalization,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Validation => "validation",
            TaskKind::Modification => "modification",
            TaskKind::Report => "report",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Blocked
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a worker hands back for a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub items_processed: usize,
    #[serde(default)]
    pub items_updated: usize,
    #[serde(default)]
    pub items_failed: usize,
    /// Comparisons the worker already classified itself
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ValidationDetail>,
    /// Raw current/fetched record pairs for the comparator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<Observation>,
    /// Set when the work was intentionally not performed (market closed)
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
}

impl TaskResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: true,
            report: Some(serde_json::json!({ "skip_reason": reason.into() })),
            ..Default::default()
        }
    }

    pub fn with_observations(mut self, observations: Vec<Observation>) -> Self {
        self.items_processed += observations.len();
        self.observations = observations;
        self
    }

    pub fn with_details(mut self, details: Vec<ValidationDetail>) -> Self {
        self.items_processed += details.len();
        self.details = details;
        self
    }

    pub fn with_items_updated(mut self, count: usize) -> Self {
        self.items_updated = count;
        self
    }
}

/// A schedulable unit of work owned by one worker agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub agent: String,
    pub kind: TaskKind,
    pub data_source: String,
    /// Physical store the task writes to; modification tasks sharing it never overlap
    pub store_key: String,
    pub status: TaskStatus,
    pub priority: i32,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    /// Details a modification task is expected to apply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ValidationDetail>,
    /// Worker options copied from the data source configuration
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
    #[serde(skip)]
    pub(crate) eligible_at: Option<Instant>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        agent: impl Into<String>,
        kind: TaskKind,
        data_source: impl Into<String>,
    ) -> Self {
        let data_source = data_source.into();
        Self {
            id: id.into(),
            agent: agent.into(),
            kind,
            store_key: data_source.clone(),
            data_source,
            status: TaskStatus::Pending,
            priority: 0,
            dependencies: Vec::new(),
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            items: Vec::new(),
            options: BTreeMap::new(),
            eligible_at: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_store_key(mut self, store_key: impl Into<String>) -> Self {
        self.store_key = store_key.into();
        self
    }

    pub fn with_items(mut self, items: Vec<ValidationDetail>) -> Self {
        self.items = items;
        self
    }

    pub fn with_options(mut self, options: BTreeMap<String, serde_json::Value>) -> Self {
        self.options = options;
        self
    }

    pub fn phase(&self) -> Phase {
        self.kind.phase()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Earliest instant the task may be dispatched again after a retry backoff.
    pub fn eligible_at(&self) -> Option<Instant> {
        self.eligible_at
    }
}
