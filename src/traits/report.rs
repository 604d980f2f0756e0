// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::models::SessionSummary;

/// Persists or forwards the finalized summary of a session.
#[async_trait]
pub trait ReportAggregator: Send + Sync {
    async fn submit(&self, summary: &SessionSummary) -> anyhow::Result<()>;
}
