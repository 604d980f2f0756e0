// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Finalization: accounting for every update item and building the summary.

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};

use crate::errors::ErrorKind;
use crate::models::{
    Action, DataSourceReport, ErrorRecord, ExecutionSummary, ModificationRecord, OverallStatus,
    Session, SessionSummary, Task, TaskKind, TaskStatus,
};

/// Account for every update item carried by a modification task.
///
/// A completed task yields one modification record per item; any other end
/// state yields one item-scoped error record per item, carrying the kind of
/// the task-level failure (or `dependency_blocked`).
pub(crate) fn reconcile(
    tasks: &[Task],
    task_errors: &[ErrorRecord],
) -> (Vec<ModificationRecord>, Vec<ErrorRecord>) {
    let failure_kinds: HashMap<&str, ErrorKind> = task_errors
        .iter()
        .filter(|e| !e.is_item_scoped())
        .map(|e| (e.task_id.as_str(), e.kind))
        .collect();

    let mut modifications = Vec::new();
    let mut errors = Vec::new();

    for task in tasks.iter().filter(|t| t.kind == TaskKind::Modification) {
        if task.status == TaskStatus::Completed {
            let timestamp = task.completed_at.unwrap_or_else(Utc::now);
            modifications.extend(task.items.iter().map(|item| ModificationRecord {
                timestamp,
                task_id: task.id.clone(),
                store: task.store_key.clone(),
                instrument_id: item.instrument_id.clone(),
                name: item.name.clone(),
                field: item.field.clone(),
                old_value: item.current_value.clone(),
                new_value: item.fetched_value.clone(),
                agent: task.agent.clone(),
            }));
            continue;
        }

        let kind = match task.status {
            TaskStatus::Blocked => ErrorKind::DependencyBlocked,
            TaskStatus::Failed => failure_kinds
                .get(task.id.as_str())
                .copied()
                .unwrap_or(ErrorKind::WorkerReported),
            _ => ErrorKind::SessionCancelled,
        };
        let reason = task.error.as_deref().unwrap_or("task did not complete");
        let now = Utc::now();
        errors.extend(task.items.iter().map(|item| ErrorRecord {
            timestamp: now,
            agent: task.agent.clone(),
            task_id: task.id.clone(),
            kind,
            message: format!(
                "update {}.{} not applied: {}",
                item.instrument_id, item.field, reason
            ),
            recoverable: false,
            retry_count: task.retry_count,
            instrument_id: Some(item.instrument_id.clone()),
            field: Some(item.field.clone()),
        }));
    }

    (modifications, errors)
}

/// Build the summary from a session whose tasks, records and details are final.
///
/// Task counts cover validation and modification work; the report hand-off
/// cannot count itself.
pub(crate) fn build(session: &Session, dry_run: bool, cancelled: bool) -> SessionSummary {
    let finished_at = Utc::now();
    let work: Vec<&Task> = session
        .tasks()
        .iter()
        .filter(|t| t.kind != TaskKind::Report)
        .collect();
    let count = |status: TaskStatus| work.iter().filter(|t| t.status == status).count();

    let details = session.details().values().flatten();
    let instruments_checked = session
        .details()
        .iter()
        .flat_map(|(source, details)| details.iter().map(move |d| (source, &d.instrument_id)))
        .collect::<BTreeSet<_>>()
        .len();
    let (mut discrepancies, mut updates, mut manual_reviews) = (0, 0, 0);
    for detail in details {
        if detail.discrepancy {
            discrepancies += 1;
        }
        match detail.action {
            Action::Update => updates += 1,
            Action::ManualReview => manual_reviews += 1,
            Action::Skip => {}
        }
    }

    let execution_summary = ExecutionSummary {
        status: OverallStatus::from_tasks(work.iter().copied()),
        started_at: session.started_at(),
        finished_at,
        elapsed_ms: (finished_at - session.started_at()).num_milliseconds().max(0) as u64,
        dry_run,
        cancelled,
        total_tasks: work.len(),
        completed_tasks: count(TaskStatus::Completed),
        failed_tasks: count(TaskStatus::Failed),
        blocked_tasks: count(TaskStatus::Blocked),
        retries: work.iter().map(|t| t.retry_count).sum(),
        instruments_checked,
        discrepancies,
        updates,
        manual_reviews,
        modifications_applied: session.modifications().len(),
        errors: session.errors().len(),
    };

    SessionSummary {
        session_id: session.id(),
        date: session.date(),
        execution_summary,
        data_source_reports: data_source_reports(session, &work),
        modifications: session.modifications().to_vec(),
        errors: session.errors().to_vec(),
        deferred_corrections: session.deferred_corrections().to_vec(),
    }
}

/// One report per validation task, with the outcome of that source's modifications.
fn data_source_reports(session: &Session, work: &[&Task]) -> Vec<DataSourceReport> {
    work.iter()
        .filter(|t| t.kind == TaskKind::Validation)
        .map(|validation| {
            let source = validation.data_source.as_str();
            let modifications = work
                .iter()
                .filter(|t| t.kind == TaskKind::Modification && t.data_source == source);
            let (mut items_updated, mut items_failed) = (0, 0);
            for task in modifications {
                match task.status {
                    TaskStatus::Completed => {
                        items_updated += task.result.as_ref().map_or(0, |r| r.items_updated)
                    }
                    _ => items_failed += task.items.len(),
                }
            }
            let result = validation.result.as_ref();
            DataSourceReport {
                data_source: source.to_string(),
                agent: validation.agent.clone(),
                status: validation.status,
                skipped: result.is_some_and(|r| r.skipped),
                retry_count: validation.retry_count,
                items_processed: result.map_or(0, |r| r.items_processed),
                items_updated,
                items_failed,
                details: session.details().get(source).cloned().unwrap_or_default(),
                report: result.and_then(|r| r.report.clone()),
                error: match validation.status {
                    TaskStatus::Completed => None,
                    _ => validation.error.clone(),
                },
            }
        })
        .collect()
}
