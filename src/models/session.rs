// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::{
    CorrectionRequest, ErrorRecord, ModificationRecord, SessionSummary, Task, TaskStatus,
    ValidationDetail,
};
use crate::engine::TaskQueue;
use crate::errors::SessionError;

/// Ordered session stages. Declaration order is the only legal progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    Validation,
    Modification,
    Finalization,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Initialization => Some(Phase::Validation),
            Phase::Validation => Some(Phase::Modification),
            Phase::Modification => Some(Phase::Finalization),
            Phase::Finalization => None,
        }
    }

    /// Late corrections are only taken while work is still being scheduled.
    pub fn accepts_corrections(self) -> bool {
        matches!(self, Phase::Validation | Phase::Modification)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initialization => "initialization",
            Phase::Validation => "validation",
            Phase::Modification => "modification",
            Phase::Finalization => "finalization",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Completed,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent: String,
    pub state: AgentState,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub tasks_blocked: usize,
    pub retries: u32,
    pub last_error: Option<String>,
}

impl AgentStatus {
    fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            state: AgentState::Idle,
            tasks_completed: 0,
            tasks_failed: 0,
            tasks_blocked: 0,
            retries: 0,
            last_error: None,
        }
    }

    fn absorb(&mut self, task: &Task) {
        match task.status {
            TaskStatus::Completed => self.tasks_completed += 1,
            TaskStatus::Failed => self.tasks_failed += 1,
            TaskStatus::Blocked => self.tasks_blocked += 1,
            TaskStatus::Pending | TaskStatus::InProgress => return,
        }
        self.retries += task.retry_count;
        if task.error.is_some() && task.status != TaskStatus::Completed {
            self.last_error = task.error.clone();
        }
        let unsuccessful = self.tasks_failed + self.tasks_blocked;
        self.state = match (self.tasks_completed, unsuccessful) {
            (0, 0) => AgentState::Idle,
            (_, 0) => AgentState::Completed,
            (0, _) => AgentState::Failed,
            _ => AgentState::Degraded,
        };
    }
}

/// One run of the pipeline for a business date.
///
/// Mutated only by the orchestrator; sealed once the summary is emitted.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    date: NaiveDate,
    phase: Phase,
    started_at: DateTime<Utc>,
    tasks: Vec<Task>,
    agents: BTreeMap<String, AgentStatus>,
    details: BTreeMap<String, Vec<ValidationDetail>>,
    modifications: Vec<ModificationRecord>,
    errors: Vec<ErrorRecord>,
    deferred_corrections: Vec<CorrectionRequest>,
    summary: Option<SessionSummary>,
}

impl Session {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            phase: Phase::Initialization,
            started_at: Utc::now(),
            tasks: Vec::new(),
            agents: BTreeMap::new(),
            details: BTreeMap::new(),
            modifications: Vec::new(),
            errors: Vec::new(),
            deferred_corrections: Vec::new(),
            summary: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn agents(&self) -> &BTreeMap<String, AgentStatus> {
        &self.agents
    }

    pub fn details(&self) -> &BTreeMap<String, Vec<ValidationDetail>> {
        &self.details
    }

    pub fn modifications(&self) -> &[ModificationRecord] {
        &self.modifications
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn deferred_corrections(&self) -> &[CorrectionRequest] {
        &self.deferred_corrections
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn is_sealed(&self) -> bool {
        self.summary.is_some()
    }

    /// Move to `target`, which must be the next phase, once the current phase has settled.
    pub fn advance_to(&mut self, target: Phase, queue: &TaskQueue) -> Result<Phase, SessionError> {
        self.ensure_open()?;
        if target <= self.phase {
            return Err(SessionError::Regression {
                from: self.phase,
                to: target,
            });
        }
        if self.phase.next() != Some(target) {
            return Err(SessionError::Skipped {
                from: self.phase,
                to: target,
            });
        }
        let outstanding = queue.outstanding(self.phase);
        if outstanding > 0 {
            return Err(SessionError::NotSettled {
                phase: self.phase,
                outstanding,
            });
        }
        self.phase = target;
        Ok(target)
    }

    pub(crate) fn register_agent(&mut self, agent: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.agents
            .entry(agent.to_string())
            .or_insert_with(|| AgentStatus::new(agent));
        Ok(())
    }

    pub(crate) fn record_details(
        &mut self,
        data_source: &str,
        details: Vec<ValidationDetail>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.details
            .entry(data_source.to_string())
            .or_default()
            .extend(details);
        Ok(())
    }

    pub(crate) fn record_modifications(
        &mut self,
        records: Vec<ModificationRecord>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.modifications.extend(records);
        Ok(())
    }

    pub(crate) fn record_errors(&mut self, records: Vec<ErrorRecord>) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.errors.extend(records);
        Ok(())
    }

    pub(crate) fn defer_correction(
        &mut self,
        request: CorrectionRequest,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.deferred_corrections.push(request);
        Ok(())
    }

    /// Replace the task audit trail with the queue's view and refresh agent status.
    pub(crate) fn sync_tasks(&mut self, queue: &TaskQueue) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.tasks = queue.snapshot();
        for status in self.agents.values_mut() {
            *status = AgentStatus::new(&status.agent);
        }
        for task in &self.tasks {
            self.agents
                .entry(task.agent.clone())
                .or_insert_with(|| AgentStatus::new(&task.agent))
                .absorb(task);
        }
        Ok(())
    }

    pub(crate) fn seal(&mut self, summary: SessionSummary) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.phase != Phase::Finalization {
            return Err(SessionError::Skipped {
                from: self.phase,
                to: Phase::Finalization,
            });
        }
        self.summary = Some(summary);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_sealed() {
            Err(SessionError::Sealed(self.id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RetryPolicy;
    use crate::models::{TaskKind, TaskResult};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn empty_queue() -> TaskQueue {
        TaskQueue::new(RetryPolicy::default())
    }

    #[test]
    fn test_phases_advance_in_order() {
        let queue = empty_queue();
        let mut session = Session::new(date());
        assert_eq!(session.phase(), Phase::Initialization);
        session.advance_to(Phase::Validation, &queue).unwrap();
        session.advance_to(Phase::Modification, &queue).unwrap();
        session.advance_to(Phase::Finalization, &queue).unwrap();
        assert_eq!(session.phase(), Phase::Finalization);
        assert_eq!(Phase::Finalization.next(), None);
    }

    #[test]
    fn test_phase_cannot_skip_or_regress() {
        let queue = empty_queue();
        let mut session = Session::new(date());
        assert!(matches!(
            session.advance_to(Phase::Modification, &queue),
            Err(SessionError::Skipped { .. })
        ));
        session.advance_to(Phase::Validation, &queue).unwrap();
        assert!(matches!(
            session.advance_to(Phase::Initialization, &queue),
            Err(SessionError::Regression { .. })
        ));
        assert!(matches!(
            session.advance_to(Phase::Validation, &queue),
            Err(SessionError::Regression { .. })
        ));
    }

    #[test]
    fn test_phase_waits_for_outstanding_tasks() {
        let mut queue = empty_queue();
        let mut session = Session::new(date());
        session.advance_to(Phase::Validation, &queue).unwrap();

        queue
            .enqueue(Task::new("v1", "validator", TaskKind::Validation, "src"))
            .unwrap();
        assert_eq!(
            session.advance_to(Phase::Modification, &queue),
            Err(SessionError::NotSettled {
                phase: Phase::Validation,
                outstanding: 1
            })
        );

        queue.mark_started("v1").unwrap();
        queue.mark_completed("v1", TaskResult::succeeded()).unwrap();
        session.advance_to(Phase::Modification, &queue).unwrap();
    }

    #[test]
    fn test_sealed_session_rejects_mutation() {
        let queue = empty_queue();
        let mut session = Session::new(date());
        session.advance_to(Phase::Validation, &queue).unwrap();
        session.advance_to(Phase::Modification, &queue).unwrap();
        session.advance_to(Phase::Finalization, &queue).unwrap();
        session.seal(SessionSummary::empty(session.id(), session.date())).unwrap();

        assert!(session.is_sealed());
        assert_eq!(
            session.record_errors(vec![]),
            Err(SessionError::Sealed(session.id()))
        );
        assert!(session.sync_tasks(&queue).is_err());
    }

    #[test]
    fn test_agent_status_reflects_task_outcomes() {
        let mut queue = empty_queue();
        let mut session = Session::new(date());
        session.register_agent("validator").unwrap();
        queue
            .enqueue(Task::new("ok", "validator", TaskKind::Validation, "a"))
            .unwrap();
        queue
            .enqueue(Task::new("bad", "validator", TaskKind::Validation, "b"))
            .unwrap();
        queue.mark_started("ok").unwrap();
        queue.mark_completed("ok", TaskResult::succeeded()).unwrap();
        queue.mark_started("bad").unwrap();
        queue
            .mark_failed("bad", crate::errors::TaskFailure::fatal("feed rejected request"))
            .unwrap();

        session.sync_tasks(&queue).unwrap();
        let status = &session.agents()["validator"];
        assert_eq!(status.tasks_completed, 1);
        assert_eq!(status.tasks_failed, 1);
        assert_eq!(status.state, AgentState::Degraded);
        assert_eq!(status.last_error.as_deref(), Some("feed rejected request"));
    }
}
