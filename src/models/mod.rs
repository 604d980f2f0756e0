// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Data model shared by the queue, dispatch, comparator and orchestrator.

mod records;
mod session;
mod summary;
mod task;

pub use records::{
    Action, CorrectionRequest, DiscrepancyCategory, ErrorRecord, FieldValue, ModificationRecord,
    Observation, Record, ValidationDetail,
};
pub use session::{AgentState, AgentStatus, Phase, Session};
pub use summary::{DataSourceReport, ExecutionSummary, OverallStatus, SessionSummary};
pub use task::{Task, TaskId, TaskKind, TaskResult, TaskStatus};
