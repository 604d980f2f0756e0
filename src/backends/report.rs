// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::SessionSummary;
use crate::traits::ReportAggregator;

/// Writes each summary as pretty JSON to `<dir>/refcheck-<date>-<session id>.json`.
#[derive(Debug, Clone)]
pub struct JsonReportAggregator {
    dir: PathBuf,
}

impl JsonReportAggregator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, summary: &SessionSummary) -> PathBuf {
        self.dir
            .join(format!("refcheck-{}-{}.json", summary.date, summary.session_id))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ReportAggregator for JsonReportAggregator {
    async fn submit(&self, summary: &SessionSummary) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating report directory {}", self.dir.display()))?;
        let path = self.path_for(summary);
        let body = serde_json::to_vec_pretty(summary)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing report {}", path.display()))?;
        Ok(())
    }
}

/// Keeps submitted summaries in memory. Can be told to reject submissions.
#[derive(Debug, Default)]
pub struct InMemoryReportAggregator {
    summaries: Mutex<Vec<SessionSummary>>,
    reject: bool,
}

impl InMemoryReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            summaries: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.summaries.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReportAggregator for InMemoryReportAggregator {
    async fn submit(&self, summary: &SessionSummary) -> anyhow::Result<()> {
        if self.reject {
            anyhow::bail!("report sink rejected session {}", summary.session_id);
        }
        self.summaries
            .lock()
            .map_err(|_| anyhow::anyhow!("report sink lock poisoned"))?
            .push(summary.clone());
        Ok(())
    }
}
