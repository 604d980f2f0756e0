// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded-time invocation of worker capabilities.
//!
//! Dispatch is the only place a worker is awaited. Whatever goes wrong there
//! (no worker registered, a timeout, a panic, a result that does not make
//! sense) comes back as a [`TaskFailure`] so the task queue applies one retry
//! policy to all of it.

use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::WorkerRegistry;
use crate::errors::{ErrorKind, TaskFailure};
use crate::models::{Task, TaskKind, TaskResult};
use crate::observability::events::{EventBus, PipelineEvent};
use crate::observability::messages::engine::{TaskDispatched, WorkerTimedOut};
use crate::observability::messages::StructuredLog;
use crate::traits::TaskPayload;

/// Session identity handed to every worker invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct WorkerDispatch {
    registry: WorkerRegistry,
    timeout: Duration,
    retry_on_error: bool,
    events: EventBus,
}

impl WorkerDispatch {
    pub fn new(registry: WorkerRegistry, timeout: Duration, retry_on_error: bool, events: EventBus) -> Self {
        Self {
            registry,
            timeout,
            retry_on_error,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run one attempt of `task` on its agent.
    pub async fn dispatch(&self, task: &Task, ctx: SessionContext) -> Result<TaskResult, TaskFailure> {
        let attempt = task.retry_count + 1;
        TaskDispatched {
            task_id: &task.id,
            agent: &task.agent,
            attempt,
        }
        .log();
        self.events.publish(PipelineEvent::TaskStarted {
            task_id: task.id.clone(),
            agent: task.agent.clone(),
            attempt,
        });

        let started = Instant::now();
        let outcome = self.invoke(task, ctx).await;

        match &outcome {
            Ok(result) => {
                self.events.publish(PipelineEvent::TaskCompleted {
                    task_id: task.id.clone(),
                    agent: task.agent.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    items_processed: result.items_processed,
                });
            }
            Err(failure) => {
                self.events.publish(PipelineEvent::TaskFailed {
                    task_id: task.id.clone(),
                    agent: task.agent.clone(),
                    kind: failure.kind,
                    recoverable: failure.recoverable,
                    message: failure.message.clone(),
                });
            }
        }
        outcome
    }

    async fn invoke(&self, task: &Task, ctx: SessionContext) -> Result<TaskResult, TaskFailure> {
        let worker = self.registry.get(&task.agent).cloned().ok_or_else(|| {
            TaskFailure::of(
                ErrorKind::WorkerUnavailable,
                format!("no worker registered for agent '{}'", task.agent),
            )
        })?;

        let payload = TaskPayload::for_task(task, ctx.session_id, ctx.date);
        let mut handle = AbortOnDrop(tokio::spawn(async move { worker.invoke(payload).await }));

        let joined = match tokio::time::timeout(self.timeout, &mut handle.0).await {
            Ok(joined) => joined,
            Err(_) => {
                WorkerTimedOut {
                    task_id: &task.id,
                    agent: &task.agent,
                    timeout: self.timeout,
                }
                .log();
                return Err(TaskFailure::of(
                    ErrorKind::Timeout,
                    format!("no result from '{}' within {:?}", task.agent, self.timeout),
                ));
            }
        };

        let reported = match joined {
            Ok(reported) => reported,
            Err(e) if e.is_panic() => {
                return Err(self.malformed(format!("worker '{}' panicked", task.agent)));
            }
            Err(e) => {
                return Err(TaskFailure::of(
                    ErrorKind::WorkerUnavailable,
                    format!("worker '{}' did not finish: {}", task.agent, e),
                ));
            }
        };

        match reported {
            Ok(result) => self.check(task, result),
            Err(failure) if failure.kind == ErrorKind::MalformedResult => {
                Err(self.malformed(failure.message))
            }
            Err(failure) => Err(failure),
        }
    }

    /// Reject results the orchestrator could not account for.
    fn check(&self, task: &Task, result: TaskResult) -> Result<TaskResult, TaskFailure> {
        if !result.success {
            return Err(self.malformed(format!(
                "worker '{}' returned an unsuccessful result without a failure",
                task.agent
            )));
        }

        match task.kind {
            TaskKind::Validation => {
                if let Some(o) = result
                    .observations
                    .iter()
                    .find(|o| o.current.instrument_id != o.fetched.instrument_id)
                {
                    return Err(self.malformed(format!(
                        "observation pairs '{}' with '{}'",
                        o.current.instrument_id, o.fetched.instrument_id
                    )));
                }
            }
            TaskKind::Modification => {
                if result.items_failed > 0 {
                    return Err(self.malformed(format!(
                        "partial modification result ({} of {} items failed)",
                        result.items_failed,
                        task.items.len()
                    )));
                }
                if result.items_updated > task.items.len() {
                    return Err(self.malformed(format!(
                        "reported {} updates for {} items",
                        result.items_updated,
                        task.items.len()
                    )));
                }
            }
            TaskKind::Report => {}
        }
        Ok(result)
    }

    fn malformed(&self, message: String) -> TaskFailure {
        TaskFailure::new(ErrorKind::MalformedResult, self.retry_on_error, message)
    }
}

/// Aborts the spawned worker when dispatch is dropped or times out.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
