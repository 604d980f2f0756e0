// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{
    CorrectionRequest, ErrorRecord, ModificationRecord, Task, TaskKind, TaskStatus,
    ValidationDetail,
};

/// The single human-facing outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Partial,
    Failed,
}

impl OverallStatus {
    /// Derive the status from the validation and modification tasks of a session.
    ///
    /// `Failed` when a phase that seeded work completed none of it, `Partial`
    /// when anything failed or was blocked, `Success` otherwise.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut seeded = [0usize; 2];
        let mut completed = [0usize; 2];
        let mut unsuccessful = 0usize;

        for task in tasks {
            let slot = match task.kind {
                TaskKind::Validation => 0,
                TaskKind::Modification => 1,
                TaskKind::Report => continue,
            };
            seeded[slot] += 1;
            match task.status {
                TaskStatus::Completed => completed[slot] += 1,
                TaskStatus::Failed | TaskStatus::Blocked => unsuccessful += 1,
                TaskStatus::Pending | TaskStatus::InProgress => unsuccessful += 1,
            }
        }

        if (0..2).any(|i| seeded[i] > 0 && completed[i] == 0) {
            OverallStatus::Failed
        } else if unsuccessful > 0 {
            OverallStatus::Partial
        } else {
            OverallStatus::Success
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Success => "success",
            OverallStatus::Partial => "partial",
            OverallStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub status: OverallStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub dry_run: bool,
    pub cancelled: bool,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub blocked_tasks: usize,
    pub retries: u32,
    pub instruments_checked: usize,
    pub discrepancies: usize,
    pub updates: usize,
    pub manual_reviews: usize,
    pub modifications_applied: usize,
    pub errors: usize,
}

/// Per data source slice of the session, one per validation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceReport {
    pub data_source: String,
    pub agent: String,
    pub status: TaskStatus,
    pub skipped: bool,
    pub retry_count: u32,
    pub items_processed: usize,
    pub items_updated: usize,
    pub items_failed: usize,
    pub details: Vec<ValidationDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything handed to the report aggregator at finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub date: NaiveDate,
    pub execution_summary: ExecutionSummary,
    pub data_source_reports: Vec<DataSourceReport>,
    pub modifications: Vec<ModificationRecord>,
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub deferred_corrections: Vec<CorrectionRequest>,
}

impl SessionSummary {
    /// A summary of a session that did nothing.
    pub fn empty(session_id: Uuid, date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            date,
            execution_summary: ExecutionSummary {
                status: OverallStatus::Success,
                started_at: now,
                finished_at: now,
                elapsed_ms: 0,
                dry_run: false,
                cancelled: false,
                total_tasks: 0,
                completed_tasks: 0,
                failed_tasks: 0,
                blocked_tasks: 0,
                retries: 0,
                instruments_checked: 0,
                discrepancies: 0,
                updates: 0,
                manual_reviews: 0,
                modifications_applied: 0,
                errors: 0,
            },
            data_source_reports: Vec::new(),
            modifications: Vec::new(),
            errors: Vec::new(),
            deferred_corrections: Vec::new(),
        }
    }

    pub fn status(&self) -> OverallStatus {
        self.execution_summary.status
    }
}
