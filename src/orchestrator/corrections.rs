// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;

use super::seeding;
use crate::config::DataSourceConfig;
use crate::engine::TaskIntake;
use crate::models::{CorrectionRequest, Task, ValidationDetail};
use crate::observability::messages::session::{CorrectionAccepted, CorrectionDeferred};
use crate::observability::messages::StructuredLog;

pub(crate) const DEFERRED_DRY_RUN: &str = "dry run applies no modifications";
pub(crate) const DEFERRED_NOT_IN_SESSION: &str = "data source is not part of this session";
pub(crate) const DEFERRED_FINALIZING: &str = "session already finalizing";

/// Submits corrections to a running session.
///
/// Corrections sent while the session validates are held until modification
/// starts; once the session finalizes its intake is closed and `submit`
/// hands the request back.
#[derive(Debug, Clone)]
pub struct CorrectionHandle {
    sender: mpsc::UnboundedSender<CorrectionRequest>,
}

impl CorrectionHandle {
    pub(crate) fn new(sender: mpsc::UnboundedSender<CorrectionRequest>) -> Self {
        Self { sender }
    }

    pub fn submit(&self, request: CorrectionRequest) -> Result<(), CorrectionRequest> {
        self.sender.send(request).map_err(|e| e.0)
    }
}

/// What became of the corrections seen during the modification phase.
#[derive(Debug, Default)]
pub(crate) struct Triage {
    /// (data source, update item) for every accepted correction
    pub accepted: Vec<(String, ValidationDetail)>,
    pub deferred: Vec<CorrectionRequest>,
}

/// Turns correction requests into modification tasks for the running phase.
pub(crate) struct CorrectionIntake<'a> {
    receiver: &'a mut mpsc::UnboundedReceiver<CorrectionRequest>,
    sources: &'a HashMap<String, DataSourceConfig>,
    dry_run: bool,
    sequence: usize,
    triage: Triage,
}

impl<'a> CorrectionIntake<'a> {
    pub(crate) fn new(
        receiver: &'a mut mpsc::UnboundedReceiver<CorrectionRequest>,
        sources: &'a HashMap<String, DataSourceConfig>,
        dry_run: bool,
    ) -> Self {
        Self {
            receiver,
            sources,
            dry_run,
            sequence: 0,
            triage: Triage::default(),
        }
    }

    /// Tasks for every correction that arrived before the phase started.
    pub(crate) fn drain_buffered(&mut self) -> Vec<Task> {
        let mut tasks = Vec::new();
        while let Ok(request) = self.receiver.try_recv() {
            tasks.extend(self.accept(request));
        }
        tasks
    }

    pub(crate) fn finish(self) -> Triage {
        self.triage
    }

    fn accept(&mut self, request: CorrectionRequest) -> Option<Task> {
        let sources = self.sources;
        let ds = match sources.get(&request.data_source) {
            Some(_) if self.dry_run => {
                self.defer(request, DEFERRED_DRY_RUN);
                return None;
            }
            Some(ds) => ds,
            None => {
                self.defer(request, DEFERRED_NOT_IN_SESSION);
                return None;
            }
        };

        self.sequence += 1;
        let detail = request.to_detail();
        let task = seeding::correction_task(ds, self.sequence, detail.clone());
        CorrectionAccepted {
            data_source: &request.data_source,
            instrument_id: &request.instrument_id,
            field: &request.field,
            requested_by: &request.requested_by,
        }
        .log();
        self.triage.accepted.push((request.data_source, detail));
        Some(task)
    }

    fn defer(&mut self, request: CorrectionRequest, reason: &str) {
        log_deferral(&request, reason);
        self.triage.deferred.push(request);
    }
}

#[async_trait]
impl TaskIntake for CorrectionIntake<'_> {
    async fn next_task(&mut self) -> Option<Task> {
        loop {
            let request = self.receiver.recv().await?;
            if let Some(task) = self.accept(request) {
                return Some(task);
            }
        }
    }
}

pub(crate) fn log_deferral(request: &CorrectionRequest, reason: &str) {
    CorrectionDeferred {
        data_source: &request.data_source,
        instrument_id: &request.instrument_id,
        field: &request.field,
        reason,
    }
    .log();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendType;
    use crate::models::FieldValue;
    use std::collections::BTreeMap;

    fn sources() -> HashMap<String, DataSourceConfig> {
        let ds = DataSourceConfig {
            id: "korean-etf".into(),
            agent: "korean-etf-validator".into(),
            modifier: "korean-etf-modifier".into(),
            store: None,
            market: None,
            priority: 0,
            backend: BackendType::Stub,
            options: BTreeMap::new(),
        };
        HashMap::from([(ds.id.clone(), ds)])
    }

    fn correction(data_source: &str) -> CorrectionRequest {
        CorrectionRequest {
            data_source: data_source.into(),
            instrument_id: "069500".into(),
            name: "KODEX 200".into(),
            field: "price".into(),
            current_value: Some(FieldValue::Number(1000.0)),
            new_value: FieldValue::Number(1010.0),
            requested_by: "ops".into(),
        }
    }

    #[tokio::test]
    async fn test_buffered_corrections_become_tasks() {
        let sources = sources();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = CorrectionHandle::new(tx);
        handle.submit(correction("korean-etf")).unwrap();
        handle.submit(correction("nowhere")).unwrap();
        handle.submit(correction("korean-etf")).unwrap();

        let mut intake = CorrectionIntake::new(&mut rx, &sources, false);
        let tasks = intake.drain_buffered();
        let triage = intake.finish();

        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["correction:korean-etf:1", "correction:korean-etf:2"]);
        assert_eq!(tasks[0].agent, "korean-etf-modifier");
        assert_eq!(triage.accepted.len(), 2);
        assert_eq!(triage.deferred, vec![correction("nowhere")]);
    }

    #[tokio::test]
    async fn test_dry_run_defers_everything() {
        let sources = sources();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(correction("korean-etf")).unwrap();
        drop(tx);

        let mut intake = CorrectionIntake::new(&mut rx, &sources, true);
        assert!(intake.next_task().await.is_none());
        let triage = intake.finish();
        assert!(triage.accepted.is_empty());
        assert_eq!(triage.deferred.len(), 1);
    }

    #[test]
    fn test_closed_handle_returns_request() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = CorrectionHandle::new(tx);
        assert_eq!(handle.submit(correction("korean-etf")), Err(correction("korean-etf")));
    }
}
