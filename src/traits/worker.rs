// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::TaskFailure;
use crate::models::{Task, TaskKind, TaskResult, ValidationDetail};

/// Everything a worker gets to see about the task it is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub session_id: Uuid,
    pub date: NaiveDate,
    pub task_id: String,
    pub kind: TaskKind,
    pub data_source: String,
    pub store_key: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub items: Vec<ValidationDetail>,
    pub options: BTreeMap<String, serde_json::Value>,
}

impl TaskPayload {
    pub fn for_task(task: &Task, session_id: Uuid, date: NaiveDate) -> Self {
        Self {
            session_id,
            date,
            task_id: task.id.clone(),
            kind: task.kind,
            data_source: task.data_source.clone(),
            store_key: task.store_key.clone(),
            attempt: task.retry_count + 1,
            items: task.items.clone(),
            options: task.options.clone(),
        }
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }
}

/// A named worker agent: a validator fetching reference data or a modifier
/// applying updates to a store.
#[async_trait]
pub trait WorkerCapability: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, payload: TaskPayload) -> Result<TaskResult, TaskFailure>;
}
