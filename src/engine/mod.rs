// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scheduling core: the dependency-aware task queue, worker dispatch and the
//! phase runner that ties them together under a concurrency bound.

pub mod dispatch;
pub mod phase_runner;
pub mod priority_work_queue;
pub mod retry;
pub mod task_queue;

pub use dispatch::{SessionContext, WorkerDispatch};
pub use phase_runner::{NoIntake, PhaseReport, PhaseRunner, TaskIntake};
pub use retry::RetryPolicy;
pub use task_queue::{FailureOutcome, SharedTaskQueue, TaskQueue};
