// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Task construction for each phase.

use crate::config::DataSourceConfig;
use crate::models::{Task, TaskKind, ValidationDetail};

pub(crate) const REPORT_TASK_ID: &str = "report";
pub(crate) const REPORT_AGENT: &str = "report-aggregator";

pub(crate) fn validation_task_id(data_source: &str) -> String {
    format!("validation:{}", data_source)
}

pub(crate) fn validation_task(ds: &DataSourceConfig) -> Task {
    Task::new(validation_task_id(&ds.id), ds.agent.as_str(), TaskKind::Validation, ds.id.as_str())
        .with_priority(ds.priority)
        .with_store_key(ds.store_key())
        .with_options(ds.options.clone())
}

/// One modification task per batch of update items, numbered from 1.
///
/// No batch size means a single task carrying every update.
pub(crate) fn modification_tasks(
    ds: &DataSourceConfig,
    updates: Vec<ValidationDetail>,
    batch_size: Option<usize>,
) -> Vec<Task> {
    if updates.is_empty() {
        return Vec::new();
    }
    let size = batch_size.filter(|size| *size > 0).unwrap_or(updates.len());
    updates
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| {
            modifier_task(ds, format!("modification:{}:{}", ds.id, i + 1), chunk.to_vec())
        })
        .collect()
}

pub(crate) fn correction_task(ds: &DataSourceConfig, sequence: usize, detail: ValidationDetail) -> Task {
    modifier_task(ds, format!("correction:{}:{}", ds.id, sequence), vec![detail])
}

pub(crate) fn report_task() -> Task {
    Task::new(REPORT_TASK_ID, REPORT_AGENT, TaskKind::Report, "session")
}

fn modifier_task(ds: &DataSourceConfig, id: String, items: Vec<ValidationDetail>) -> Task {
    Task::new(id, ds.modifier.as_str(), TaskKind::Modification, ds.id.as_str())
        .with_priority(ds.priority)
        .with_store_key(ds.store_key())
        .with_items(items)
        .with_options(ds.options.clone())
}
