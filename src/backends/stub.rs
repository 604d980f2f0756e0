// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process workers for dry wiring, demos and tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::TaskFailure;
use crate::models::{Observation, TaskKind, TaskResult};
use crate::traits::{TaskPayload, WorkerCapability};

/// The result a well-behaved worker returns without doing anything.
///
/// Modification tasks report every item as applied.
fn nominal_result(payload: &TaskPayload) -> TaskResult {
    match payload.kind {
        TaskKind::Modification => TaskResult {
            success: true,
            items_processed: payload.items.len(),
            items_updated: payload.items.len(),
            ..TaskResult::default()
        },
        TaskKind::Validation | TaskKind::Report => TaskResult::succeeded(),
    }
}

/// Succeeds immediately, optionally returning canned observations per data source.
pub struct StubWorker {
    name: String,
    observations: HashMap<String, Vec<Observation>>,
}

impl StubWorker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            observations: HashMap::new(),
        }
    }

    pub fn with_observations(mut self, data_source: &str, observations: Vec<Observation>) -> Self {
        self.observations.insert(data_source.to_string(), observations);
        self
    }
}

#[async_trait]
impl WorkerCapability for StubWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, payload: TaskPayload) -> Result<TaskResult, TaskFailure> {
        match self.observations.get(&payload.data_source) {
            Some(observations) if payload.kind == TaskKind::Validation => {
                Ok(TaskResult::succeeded().with_observations(observations.clone()))
            }
            _ => Ok(nominal_result(&payload)),
        }
    }
}

/// Always fails with the same failure.
pub struct FailingWorker {
    name: String,
    failure: TaskFailure,
}

impl FailingWorker {
    pub fn new(name: &str, failure: TaskFailure) -> Self {
        Self {
            name: name.to_string(),
            failure,
        }
    }
}

#[async_trait]
impl WorkerCapability for FailingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _payload: TaskPayload) -> Result<TaskResult, TaskFailure> {
        Err(self.failure.clone())
    }
}

/// Sleeps before answering; used to exercise timeouts and cancellation.
pub struct SlowWorker {
    name: String,
    delay: Duration,
}

impl SlowWorker {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl WorkerCapability for SlowWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, payload: TaskPayload) -> Result<TaskResult, TaskFailure> {
        tokio::time::sleep(self.delay).await;
        Ok(nominal_result(&payload))
    }
}

enum Step {
    Ok(TaskResult),
    Fail(TaskFailure),
    Panic(String),
}

/// Plays back a fixed sequence of answers, then behaves like [`StubWorker`].
///
/// Every payload it receives is recorded for later inspection.
pub struct ScriptedWorker {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<TaskPayload>>,
}

impl ScriptedWorker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then_ok(self, result: TaskResult) -> Self {
        self.push(Step::Ok(result))
    }

    pub fn then_fail(self, failure: TaskFailure) -> Self {
        self.push(Step::Fail(failure))
    }

    pub fn then_panic(self, message: &str) -> Self {
        self.push(Step::Panic(message.to_string()))
    }

    /// Payloads received so far, in call order.
    pub fn calls(&self) -> Vec<TaskPayload> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
        self
    }
}

#[async_trait]
impl WorkerCapability for ScriptedWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, payload: TaskPayload) -> Result<TaskResult, TaskFailure> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(payload.clone());
        }
        let step = self.steps.lock().ok().and_then(|mut steps| steps.pop_front());
        match step {
            Some(Step::Ok(result)) => Ok(result),
            Some(Step::Fail(failure)) => Err(failure),
            Some(Step::Panic(message)) => panic!("{}", message),
            None => Ok(nominal_result(&payload)),
        }
    }
}

#[derive(Default)]
struct ProbeState {
    current: usize,
    max: usize,
    per_store: HashMap<String, (usize, usize)>,
}

/// Holds each invocation open for a while and records peak concurrency,
/// overall and per store key.
pub struct ConcurrencyProbe {
    name: String,
    hold: Duration,
    state: Mutex<ProbeState>,
}

impl ConcurrencyProbe {
    pub fn new(name: &str, hold: Duration) -> Self {
        Self {
            name: name.to_string(),
            hold,
            state: Mutex::new(ProbeState::default()),
        }
    }

    pub fn max_observed(&self) -> usize {
        self.state.lock().map(|s| s.max).unwrap_or_default()
    }

    pub fn max_observed_for(&self, store_key: &str) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.per_store.get(store_key).map(|(_, max)| *max))
            .unwrap_or_default()
    }

    fn enter(&self, store_key: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.current += 1;
            state.max = state.max.max(state.current);
            let entry = state.per_store.entry(store_key.to_string()).or_default();
            entry.0 += 1;
            entry.1 = entry.1.max(entry.0);
        }
    }

    fn leave(&self, store_key: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.current = state.current.saturating_sub(1);
            if let Some(entry) = state.per_store.get_mut(store_key) {
                entry.0 = entry.0.saturating_sub(1);
            }
        }
    }
}

#[async_trait]
impl WorkerCapability for ConcurrencyProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, payload: TaskPayload) -> Result<TaskResult, TaskFailure> {
        self.enter(&payload.store_key);
        tokio::time::sleep(self.hold).await;
        self.leave(&payload.store_key);
        Ok(nominal_result(&payload))
    }
}
