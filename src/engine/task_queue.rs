// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Dependency-aware task queue with priorities, retry and backoff.
//!
//! The queue is the single source of truth for task state. It uses the same
//! dependency counting scheme as a DAG work queue: each task tracks how many of
//! its dependencies have not completed yet, and a task only enters the ready
//! set when that count reaches zero. Failures propagate eagerly: when a task
//! fails or is blocked, every transitive dependent is blocked in the same call
//! so nothing downstream is ever dispatched.
//!
//! # State transitions
//!
//! ```text
//! pending --mark_started--> in_progress --mark_completed--> completed
//!    ^                           |
//!    +------ retry (backoff) ----+--mark_failed--> failed
//! pending --dependency failed--> blocked
//! ```
//!
//! Every enqueued task ends in exactly one terminal state; tasks are never
//! removed.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::priority_work_queue::{PrioritizedTask, PriorityWorkQueue};
use super::RetryPolicy;
use crate::errors::{ErrorKind, QueueError, TaskFailure};
use crate::models::{ErrorRecord, Phase, Task, TaskId, TaskResult, TaskStatus};

/// Handle shared between the phase runner and in-flight dispatches.
///
/// The lock is held only for state transitions, never across a worker await.
pub type SharedTaskQueue = Arc<Mutex<TaskQueue>>;

/// What `mark_failed` did with a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// Back to pending; eligible again after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// Terminal. `blocked` lists every transitive dependent that was blocked.
    Failed {
        record: ErrorRecord,
        blocked: Vec<TaskId>,
    },
}

#[derive(Debug)]
pub struct TaskQueue {
    policy: RetryPolicy,
    tasks: HashMap<TaskId, Task>,
    /// Enqueue order, used for snapshots and as the final scheduling tie-break
    order: Vec<TaskId>,
    sequence: HashMap<TaskId, u64>,
    dependents: HashMap<TaskId, Vec<TaskId>>,
    waiting_on: HashMap<TaskId, usize>,
    ready: PriorityWorkQueue,
    errors: Vec<ErrorRecord>,
    in_progress: usize,
}

impl TaskQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            tasks: HashMap::new(),
            order: Vec::new(),
            sequence: HashMap::new(),
            dependents: HashMap::new(),
            waiting_on: HashMap::new(),
            ready: PriorityWorkQueue::new(),
            errors: Vec::new(),
            in_progress: 0,
        }
    }

    pub fn into_shared(self) -> SharedTaskQueue {
        Arc::new(Mutex::new(self))
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Add a task in `pending` state.
    ///
    /// Dependencies must already be queued. A task whose dependency already
    /// failed or was blocked is accepted but starts out `blocked`.
    pub fn enqueue(&mut self, mut task: Task) -> Result<(), QueueError> {
        if self.tasks.contains_key(&task.id) {
            return Err(QueueError::DuplicateTask(task.id));
        }
        for dependency in &task.dependencies {
            if !self.tasks.contains_key(dependency) {
                return Err(QueueError::UnknownDependency {
                    task_id: task.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let id = task.id.clone();
        let seq = self.order.len() as u64;
        task.status = TaskStatus::Pending;
        task.eligible_at = None;

        let mut waiting = 0;
        let mut dead_dependency = None;
        for dependency in &task.dependencies {
            let status = self.tasks[dependency].status;
            match status {
                TaskStatus::Completed => {}
                TaskStatus::Failed | TaskStatus::Blocked => {
                    dead_dependency.get_or_insert_with(|| dependency.clone());
                }
                TaskStatus::Pending | TaskStatus::InProgress => waiting += 1,
            }
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .push(id.clone());
        }

        if let Some(dependency) = dead_dependency {
            block(&mut task, &dependency);
        } else if waiting == 0 {
            self.ready
                .push(PrioritizedTask::new(id.clone(), task.priority, task.created_at, seq));
        }

        self.waiting_on.insert(id.clone(), waiting);
        self.sequence.insert(id.clone(), seq);
        self.order.push(id.clone());
        self.tasks.insert(id, task);
        Ok(())
    }

    /// Enqueue behind the most recent task of the same kind writing the same
    /// store, so the two never run at the same time.
    pub fn enqueue_serialized(&mut self, mut task: Task) -> Result<(), QueueError> {
        let predecessor = self
            .order
            .iter()
            .rev()
            .filter_map(|id| self.tasks.get(id))
            .find(|t| t.kind == task.kind && t.store_key == task.store_key)
            .map(|t| t.id.clone());
        if let Some(predecessor) = predecessor {
            if !task.dependencies.contains(&predecessor) {
                task.dependencies.push(predecessor);
            }
        }
        self.enqueue(task)
    }

    /// Up to `max_concurrent - in_progress` runnable tasks in scheduling order.
    ///
    /// Does not change any state; the caller commits with `mark_started`.
    pub fn next_runnable(&self, max_concurrent: usize) -> Vec<Task> {
        self.next_runnable_at(max_concurrent, Instant::now())
    }

    pub fn next_runnable_at(&self, max_concurrent: usize, now: Instant) -> Vec<Task> {
        let capacity = max_concurrent.saturating_sub(self.in_progress);
        if capacity == 0 {
            return Vec::new();
        }
        self.ready
            .iter()
            .filter_map(|entry| self.tasks.get(&entry.task_id))
            .filter(|task| task.eligible_at.map_or(true, |at| at <= now))
            .take(capacity)
            .cloned()
            .collect()
    }

    pub fn mark_started(&mut self, task_id: &str) -> Result<(), QueueError> {
        self.mark_started_at(task_id, Instant::now())
    }

    /// Start a task as of `now`. Rejected while dependencies are outstanding
    /// or its retry backoff has not elapsed.
    pub fn mark_started_at(&mut self, task_id: &str, now: Instant) -> Result<(), QueueError> {
        let waiting = self.waiting_on.get(task_id).copied().unwrap_or(0);
        let task = self.transition(task_id, TaskStatus::Pending, TaskStatus::InProgress)?;
        let backing_off = task.eligible_at.map_or(false, |at| at > now);
        if waiting > 0 || backing_off {
            return Err(QueueError::InvalidTransition {
                task_id: task_id.to_string(),
                from: TaskStatus::Pending,
                to: TaskStatus::InProgress,
            });
        }
        task.status = TaskStatus::InProgress;
        task.started_at = Some(Utc::now());
        task.eligible_at = None;
        self.ready.remove(task_id);
        self.in_progress += 1;
        Ok(())
    }

    /// Complete an in-progress task and return the dependents it made ready.
    pub fn mark_completed(
        &mut self,
        task_id: &str,
        result: TaskResult,
    ) -> Result<Vec<TaskId>, QueueError> {
        let task = self.transition(task_id, TaskStatus::InProgress, TaskStatus::Completed)?;
        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.result = Some(result);
        self.in_progress = self.in_progress.saturating_sub(1);

        let mut promoted = Vec::new();
        let dependents = self.dependents.get(task_id).cloned().unwrap_or_default();
        for dependent in dependents {
            let Some(count) = self.waiting_on.get_mut(&dependent) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count > 0 {
                continue;
            }
            if let Some(task) = self.tasks.get(&dependent) {
                if task.status == TaskStatus::Pending {
                    let seq = self.sequence.get(&dependent).copied().unwrap_or_default();
                    self.ready.push(PrioritizedTask::new(
                        dependent.clone(),
                        task.priority,
                        task.created_at,
                        seq,
                    ));
                    promoted.push(dependent);
                }
            }
        }
        Ok(promoted)
    }

    /// Apply the retry policy to a failed attempt.
    pub fn mark_failed(
        &mut self,
        task_id: &str,
        failure: TaskFailure,
    ) -> Result<FailureOutcome, QueueError> {
        let policy = self.policy.clone();
        let seq = self.sequence.get(task_id).copied().unwrap_or_default();
        let task = self.transition(task_id, TaskStatus::InProgress, TaskStatus::Failed)?;

        if failure.recoverable && policy.allows_retry(task.retry_count) {
            let delay = policy.delay_for(task.retry_count);
            task.retry_count += 1;
            task.status = TaskStatus::Pending;
            task.error = Some(failure.message);
            task.eligible_at = Some(Instant::now() + delay);
            let attempt = task.retry_count;
            let entry = PrioritizedTask::new(task.id.clone(), task.priority, task.created_at, seq);
            self.in_progress = self.in_progress.saturating_sub(1);
            self.ready.push(entry);
            return Ok(FailureOutcome::Retrying { attempt, delay });
        }

        let (kind, message) = if failure.recoverable {
            (
                ErrorKind::RetriesExhausted,
                format!(
                    "{} (gave up after {} retries)",
                    failure.message, task.retry_count
                ),
            )
        } else {
            (failure.kind, failure.message.clone())
        };
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        task.error = Some(failure.message);
        let record = ErrorRecord {
            timestamp: Utc::now(),
            agent: task.agent.clone(),
            task_id: task.id.clone(),
            kind,
            message,
            recoverable: failure.recoverable,
            retry_count: task.retry_count,
            instrument_id: None,
            field: None,
        };
        self.in_progress = self.in_progress.saturating_sub(1);
        self.errors.push(record.clone());
        let blocked = self.block_dependents(task_id);
        Ok(FailureOutcome::Failed { record, blocked })
    }

    /// Fail every pending or in-progress task without retries.
    pub fn cancel_all(&mut self, reason: &str) -> Vec<ErrorRecord> {
        let mut records = Vec::new();
        for id in &self.order {
            let Some(task) = self.tasks.get_mut(id) else {
                continue;
            };
            if task.is_terminal() {
                continue;
            }
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.error = Some(reason.to_string());
            task.eligible_at = None;
            records.push(ErrorRecord {
                timestamp: Utc::now(),
                agent: task.agent.clone(),
                task_id: task.id.clone(),
                kind: ErrorKind::SessionCancelled,
                message: reason.to_string(),
                recoverable: false,
                retry_count: task.retry_count,
                instrument_id: None,
                field: None,
            });
        }
        self.ready = PriorityWorkQueue::new();
        self.in_progress = 0;
        self.errors.extend(records.iter().cloned());
        records
    }

    /// Block the pending tasks of `phase` that can never become runnable.
    ///
    /// Only meaningful when nothing is in flight and nothing is ready.
    pub fn block_stalled(&mut self, phase: Phase) -> Vec<TaskId> {
        let stalled: Vec<TaskId> = self
            .order
            .iter()
            .filter(|id| {
                self.tasks.get(*id).is_some_and(|t| {
                    t.phase() == phase && t.status == TaskStatus::Pending && !self.ready.contains(id)
                })
            })
            .cloned()
            .collect();
        let mut blocked = Vec::new();
        for id in stalled {
            let Some(task) = self.tasks.get(&id) else {
                continue;
            };
            if task.status != TaskStatus::Pending {
                continue;
            }
            let dependency = task
                .dependencies
                .iter()
                .find(|d| {
                    self.tasks
                        .get(*d)
                        .map_or(true, |dep| dep.status != TaskStatus::Completed)
                })
                .cloned()
                .unwrap_or_default();
            if let Some(task) = self.tasks.get_mut(&id) {
                block(task, &dependency);
            }
            blocked.push(id.clone());
            blocked.extend(self.block_dependents(&id));
        }
        blocked
    }

    /// Non-terminal tasks belonging to `phase`.
    pub fn outstanding(&self, phase: Phase) -> usize {
        self.tasks
            .values()
            .filter(|t| t.phase() == phase && !t.is_terminal())
            .count()
    }

    pub fn is_settled(&self, phase: Phase) -> bool {
        self.outstanding(phase) == 0
    }

    /// Earliest backoff expiry still in the future, if any ready task is waiting on one.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.next_wakeup_at(Instant::now())
    }

    /// Backoffs that already elapsed are excluded: those tasks only wait for
    /// capacity, which frees up when an in-flight task finishes.
    pub fn next_wakeup_at(&self, now: Instant) -> Option<Instant> {
        self.ready
            .iter()
            .filter_map(|entry| self.tasks.get(&entry.task_id))
            .filter_map(|task| task.eligible_at)
            .filter(|at| *at > now)
            .min()
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Every task in enqueue order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .collect()
    }

    /// Task-level error records, in the order they were produced.
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn transition(
        &mut self,
        task_id: &str,
        expected: TaskStatus,
        to: TaskStatus,
    ) -> Result<&mut Task, QueueError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| QueueError::UnknownTask(task_id.to_string()))?;
        if task.status != expected {
            return Err(QueueError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to,
            });
        }
        Ok(task)
    }

    fn block_dependents(&mut self, root: &str) -> Vec<TaskId> {
        let mut blocked = Vec::new();
        let mut frontier: VecDeque<TaskId> = VecDeque::from([root.to_string()]);
        while let Some(current) = frontier.pop_front() {
            let Some(dependents) = self.dependents.get(&current).cloned() else {
                continue;
            };
            for dependent in dependents {
                let Some(task) = self.tasks.get_mut(&dependent) else {
                    continue;
                };
                if task.status != TaskStatus::Pending {
                    continue;
                }
                block(task, &current);
                self.ready.remove(&dependent);
                blocked.push(dependent.clone());
                frontier.push_back(dependent);
            }
        }
        blocked
    }
}

fn block(task: &mut Task, dependency: &str) {
    task.status = TaskStatus::Blocked;
    task.completed_at = Some(Utc::now());
    task.eligible_at = None;
    task.error = Some(format!("blocked: dependency '{}' did not complete", dependency));
}
