// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the task queue, worker dispatch and phase runner.
//!
//! This module contains message types for logging events related to:
//! * Phase runs (start, completion, stalls, cancellation)
//! * Task dispatch, retries and terminal failures
//! * Worker timeouts and late results

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A phase runner started draining the queue.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PhaseRunStarted<'a> {
    pub phase: &'a str,
    pub task_count: usize,
    pub max_concurrent: usize,
}

impl Display for PhaseRunStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Running {} phase: {} tasks, max_concurrent={}",
            self.phase, self.task_count, self.max_concurrent
        )
    }
}

impl StructuredLog for PhaseRunStarted<'_> {
    fn log(&self) {
        tracing::info!(
            phase = self.phase,
            task_count = self.task_count,
            max_concurrent = self.max_concurrent,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "phase_run",
            span_name = name,
            phase = self.phase,
            task_count = self.task_count,
            max_concurrent = self.max_concurrent,
        )
    }
}

/// Every task of a phase reached a terminal state.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PhaseRunCompleted<'a> {
    pub phase: &'a str,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub passes: usize,
    pub elapsed: Duration,
}

impl Display for PhaseRunCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} phase settled in {:?} after {} passes: {} completed, {} failed, {} blocked",
            self.phase, self.elapsed, self.passes, self.completed, self.failed, self.blocked
        )
    }
}

impl StructuredLog for PhaseRunCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            phase = self.phase,
            completed = self.completed,
            failed = self.failed,
            blocked = self.blocked,
            passes = self.passes,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "phase_run_completed",
            span_name = name,
            phase = self.phase,
            completed = self.completed,
            failed = self.failed,
            blocked = self.blocked,
        )
    }
}

/// A task was handed to its worker.
///
/// # Log Level
/// `debug!` - Per-task detail
pub struct TaskDispatched<'a> {
    pub task_id: &'a str,
    pub agent: &'a str,
    pub attempt: u32,
}

impl Display for TaskDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching task '{}' to '{}' (attempt {})",
            self.task_id, self.agent, self.attempt
        )
    }
}

impl StructuredLog for TaskDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            task_id = self.task_id,
            agent = self.agent,
            attempt = self.attempt,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "task",
            span_name = name,
            task_id = self.task_id,
            agent = self.agent,
            attempt = self.attempt,
        )
    }
}

/// A recoverable failure was scheduled for another attempt.
///
/// # Log Level
/// `warn!` - Degraded but recovering
pub struct TaskRetryScheduled<'a> {
    pub task_id: &'a str,
    pub attempt: u32,
    pub delay: Duration,
    pub reason: &'a str,
}

impl Display for TaskRetryScheduled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' failed ({}), retry {} in {:?}",
            self.task_id, self.reason, self.attempt, self.delay
        )
    }
}

impl StructuredLog for TaskRetryScheduled<'_> {
    fn log(&self) {
        tracing::warn!(
            task_id = self.task_id,
            attempt = self.attempt,
            delay_ms = self.delay.as_millis() as u64,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "task_retry",
            span_name = name,
            task_id = self.task_id,
            attempt = self.attempt,
        )
    }
}

/// A task failed for good.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct TaskFailedTerminal<'a> {
    pub task_id: &'a str,
    pub kind: &'a str,
    pub message: &'a str,
    pub blocked_dependents: usize,
}

impl Display for TaskFailedTerminal<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Task '{}' failed: {}: {}", self.task_id, self.kind, self.message)?;
        if self.blocked_dependents > 0 {
            write!(f, " ({} dependents blocked)", self.blocked_dependents)?;
        }
        Ok(())
    }
}

impl StructuredLog for TaskFailedTerminal<'_> {
    fn log(&self) {
        tracing::error!(
            task_id = self.task_id,
            kind = self.kind,
            blocked_dependents = self.blocked_dependents,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "task_failed",
            span_name = name,
            task_id = self.task_id,
            kind = self.kind,
        )
    }
}

/// A worker did not answer within the task timeout.
///
/// # Log Level
/// `warn!` - Degraded operation
pub struct WorkerTimedOut<'a> {
    pub task_id: &'a str,
    pub agent: &'a str,
    pub timeout: Duration,
}

impl Display for WorkerTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Worker '{}' timed out after {:?} on task '{}'",
            self.agent, self.timeout, self.task_id
        )
    }
}

impl StructuredLog for WorkerTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            task_id = self.task_id,
            agent = self.agent,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "worker_timeout",
            span_name = name,
            task_id = self.task_id,
            agent = self.agent,
        )
    }
}

/// Pending tasks could never become runnable and were blocked.
///
/// # Log Level
/// `warn!` - Unexpected but handled
pub struct StalledTasksBlocked<'a> {
    pub phase: &'a str,
    pub task_ids: &'a [String],
}

impl Display for StalledTasksBlocked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} phase stalled, blocking {} tasks: {}",
            self.phase,
            self.task_ids.len(),
            self.task_ids.join(", ")
        )
    }
}

impl StructuredLog for StalledTasksBlocked<'_> {
    fn log(&self) {
        tracing::warn!(phase = self.phase, count = self.task_ids.len(), "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("phase_stalled", span_name = name, phase = self.phase)
    }
}

/// The session was cancelled while a phase was running.
///
/// # Log Level
/// `warn!` - Operator or timeout driven stop
pub struct PhaseCancelled<'a> {
    pub phase: &'a str,
    pub reason: &'a str,
    pub in_flight: usize,
    pub cancelled_tasks: usize,
}

impl Display for PhaseCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} phase cancelled ({}): {} workers aborted, {} tasks failed",
            self.phase, self.reason, self.in_flight, self.cancelled_tasks
        )
    }
}

impl StructuredLog for PhaseCancelled<'_> {
    fn log(&self) {
        tracing::warn!(
            phase = self.phase,
            reason = self.reason,
            in_flight = self.in_flight,
            cancelled_tasks = self.cancelled_tasks,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("phase_cancelled", span_name = name, phase = self.phase)
    }
}

/// A worker result arrived for a task that was no longer in progress.
///
/// # Log Level
/// `debug!` - Expected after cancellation
pub struct LateResultIgnored<'a> {
    pub task_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for LateResultIgnored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Ignoring result for task '{}': {}", self.task_id, self.error)
    }
}

impl StructuredLog for LateResultIgnored<'_> {
    fn log(&self) {
        tracing::debug!(task_id = self.task_id, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("late_result", span_name = name, task_id = self.task_id)
    }
}
