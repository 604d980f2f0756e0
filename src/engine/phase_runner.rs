// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded worker pool that drives one session phase to completion.
//!
//! The runner repeatedly asks the shared [`TaskQueue`] for runnable work,
//! marks it started and spawns a dispatch for it on a `JoinSet`, never holding
//! more than `max_concurrent` tasks in flight. The queue lock is only held
//! while scheduling or recording an outcome, never across a worker await.
//!
//! # Execution Flow
//!
//! 1. **Schedule**: start every runnable task up to the concurrency bound
//! 2. **Wait**: for a dispatch to finish, a backoff to elapse, a late task to
//!    arrive through the intake, or cancellation
//! 3. **Record**: feed the outcome back to the queue, which applies the retry
//!    policy and blocks dependents of terminal failures
//! 4. **Barrier**: stop once every task of the phase is terminal
//!
//! On cancellation every in-flight dispatch is aborted and the queue fails all
//! outstanding tasks with `session_cancelled`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::dispatch::{SessionContext, WorkerDispatch};
use super::task_queue::{FailureOutcome, SharedTaskQueue};
use crate::errors::{ErrorKind, TaskFailure};
use crate::models::{ErrorRecord, Phase, Task, TaskId, TaskResult, TaskStatus};
use crate::observability::events::PipelineEvent;
use crate::observability::messages::engine::{
    LateResultIgnored, PhaseCancelled, PhaseRunCompleted, PhaseRunStarted, StalledTasksBlocked,
    TaskFailedTerminal, TaskRetryScheduled,
};
use crate::observability::messages::StructuredLog;

const CANCEL_REASON: &str = "session cancelled before the task finished";

/// Source of tasks added while a phase is already running.
#[async_trait]
pub trait TaskIntake: Send {
    /// Wait for the next task; `None` once nothing more will arrive.
    async fn next_task(&mut self) -> Option<Task>;
}

/// Intake for phases that never grow once seeded.
pub struct NoIntake;

#[async_trait]
impl TaskIntake for NoIntake {
    async fn next_task(&mut self) -> Option<Task> {
        None
    }
}

/// What happened while a phase ran.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub blocked: Vec<TaskId>,
    pub retries: u32,
    /// Error records produced during this run
    pub errors: Vec<ErrorRecord>,
    pub cancelled: bool,
    /// Scheduling passes taken before the phase settled
    pub passes: usize,
}

impl PhaseReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            completed: Vec::new(),
            failed: Vec::new(),
            blocked: Vec::new(),
            retries: 0,
            errors: Vec::new(),
            cancelled: false,
            passes: 0,
        }
    }
}

type Outcome = (TaskId, Result<TaskResult, TaskFailure>);

pub struct PhaseRunner {
    queue: SharedTaskQueue,
    dispatch: Arc<WorkerDispatch>,
    max_concurrent: usize,
    ctx: SessionContext,
    cancel: CancellationToken,
}

impl PhaseRunner {
    pub fn new(
        queue: SharedTaskQueue,
        dispatch: Arc<WorkerDispatch>,
        max_concurrent: usize,
        ctx: SessionContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            dispatch,
            max_concurrent: max_concurrent.max(1),
            ctx,
            cancel,
        }
    }

    /// Run until every task of `phase` is terminal or the session is cancelled.
    pub async fn run(&self, phase: Phase, intake: &mut dyn TaskIntake) -> PhaseReport {
        let started = StdInstant::now();
        let mut report = PhaseReport::new(phase);
        let mut in_flight: JoinSet<Outcome> = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, TaskId> = HashMap::new();
        let mut intake_open = true;

        {
            let queue = self.queue.lock().await;
            PhaseRunStarted {
                phase: phase.as_str(),
                task_count: queue.outstanding(phase),
                max_concurrent: self.max_concurrent,
            }
            .log();
        }

        loop {
            if self.cancel.is_cancelled() {
                self.cancel_phase(phase, &mut in_flight, &mut report).await;
                break;
            }

            report.passes += 1;
            let (to_start, settled, wakeup) = self.schedule(phase).await;
            for task in to_start {
                let dispatch = Arc::clone(&self.dispatch);
                let ctx = self.ctx;
                let task_id = task.id.clone();
                let handle = in_flight.spawn(async move {
                    let outcome = dispatch.dispatch(&task, ctx).await;
                    (task.id, outcome)
                });
                running.insert(handle.id(), task_id);
            }

            if in_flight.is_empty() {
                if settled {
                    break;
                }
                if wakeup.is_none() {
                    if self.unstick(phase, &mut report).await {
                        continue;
                    }
                    break;
                }
            }

            let sleep_target = wakeup.unwrap_or_else(Instant::now);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.cancel_phase(phase, &mut in_flight, &mut report).await;
                    break;
                }
                Some(joined) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    match joined {
                        Ok((id, (task_id, outcome))) => {
                            running.remove(&id);
                            self.record(task_id, outcome, &mut report).await;
                        }
                        Err(e) => {
                            if let Some(task_id) = running.remove(&e.id()) {
                                let failure = TaskFailure::new(
                                    ErrorKind::MalformedResult,
                                    false,
                                    format!("dispatch ended abnormally: {}", e),
                                );
                                self.record(task_id, Err(failure), &mut report).await;
                            }
                        }
                    }
                }
                _ = tokio::time::sleep_until(sleep_target), if wakeup.is_some() => {}
                next = intake.next_task(), if intake_open => {
                    match next {
                        Some(task) => self.admit(task).await,
                        None => intake_open = false,
                    }
                }
            }
        }

        PhaseRunCompleted {
            phase: phase.as_str(),
            completed: report.completed.len(),
            failed: report.failed.len(),
            blocked: report.blocked.len(),
            passes: report.passes,
            elapsed: started.elapsed(),
        }
        .log();
        report
    }

    /// Mark every currently runnable task started.
    async fn schedule(&self, phase: Phase) -> (Vec<Task>, bool, Option<Instant>) {
        let mut queue = self.queue.lock().await;
        let now = Instant::now();
        let mut started = Vec::new();
        for task in queue.next_runnable_at(self.max_concurrent, now) {
            match queue.mark_started_at(&task.id, now) {
                Ok(()) => started.push(task),
                Err(e) => tracing::warn!(task_id = %task.id, error = %e, "could not start task"),
            }
        }
        (started, queue.is_settled(phase), queue.next_wakeup_at(now))
    }

    async fn record(
        &self,
        task_id: TaskId,
        outcome: Result<TaskResult, TaskFailure>,
        report: &mut PhaseReport,
    ) {
        let mut queue = self.queue.lock().await;
        match outcome {
            Ok(result) => match queue.mark_completed(&task_id, result) {
                Ok(_) => report.completed.push(task_id),
                Err(e) => LateResultIgnored {
                    task_id: &task_id,
                    error: &e,
                }
                .log(),
            },
            Err(failure) => {
                let reason = failure.to_string();
                match queue.mark_failed(&task_id, failure) {
                    Ok(FailureOutcome::Retrying { attempt, delay }) => {
                        report.retries += 1;
                        TaskRetryScheduled {
                            task_id: &task_id,
                            attempt,
                            delay,
                            reason: &reason,
                        }
                        .log();
                    }
                    Ok(FailureOutcome::Failed { record, blocked }) => {
                        TaskFailedTerminal {
                            task_id: &task_id,
                            kind: record.kind.as_str(),
                            message: &record.message,
                            blocked_dependents: blocked.len(),
                        }
                        .log();
                        report.failed.push(task_id);
                        report.blocked.extend(blocked);
                        report.errors.push(record);
                    }
                    Err(e) => LateResultIgnored {
                        task_id: &task_id,
                        error: &e,
                    }
                    .log(),
                }
            }
        }
    }

    async fn admit(&self, task: Task) {
        let created = PipelineEvent::TaskCreated {
            task_id: task.id.clone(),
            agent: task.agent.clone(),
            kind: task.kind,
        };
        let task_id = task.id.clone();
        let mut queue = self.queue.lock().await;
        match queue.enqueue_serialized(task) {
            Ok(()) => {
                self.dispatch.events().publish(created);
                if queue.get(&task_id).map(|t| t.status) == Some(TaskStatus::Blocked) {
                    tracing::warn!(task_id = %task_id, "late task blocked by a failed predecessor");
                }
            }
            Err(e) => tracing::warn!(task_id = %task_id, error = %e, "late task rejected"),
        }
    }

    /// Nothing in flight, nothing ready and no backoff pending: whatever is
    /// left in this phase can never run. Returns false if nothing could be blocked.
    async fn unstick(&self, phase: Phase, report: &mut PhaseReport) -> bool {
        let mut queue = self.queue.lock().await;
        let blocked = queue.block_stalled(phase);
        StalledTasksBlocked {
            phase: phase.as_str(),
            task_ids: &blocked,
        }
        .log();
        let progressed = !blocked.is_empty();
        report.blocked.extend(blocked);
        progressed
    }

    async fn cancel_phase(
        &self,
        phase: Phase,
        in_flight: &mut JoinSet<Outcome>,
        report: &mut PhaseReport,
    ) {
        let aborted = in_flight.len();
        in_flight.abort_all();
        while in_flight.join_next().await.is_some() {}

        let records = self.queue.lock().await.cancel_all(CANCEL_REASON);
        PhaseCancelled {
            phase: phase.as_str(),
            reason: CANCEL_REASON,
            in_flight: aborted,
            cancelled_tasks: records.len(),
        }
        .log();
        report.failed.extend(records.iter().map(|r| r.task_id.clone()));
        report.errors.extend(records);
        report.cancelled = true;
    }
}
