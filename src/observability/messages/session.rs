// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the session lifecycle.
//!
//! This module contains message types for logging events related to:
//! * Session start and phase transitions
//! * Market-closed skips and modification seeding
//! * Mid-session corrections
//! * Session timeouts
//! * Finalization and the report hand-off

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A session was created for a business date.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SessionStarted<'a> {
    pub session_id: &'a str,
    pub date: &'a str,
    pub data_sources: usize,
    pub dry_run: bool,
}

impl Display for SessionStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} started for {} with {} data sources{}",
            self.session_id,
            self.date,
            self.data_sources,
            if self.dry_run { " (dry run)" } else { "" }
        )
    }
}

impl StructuredLog for SessionStarted<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = self.session_id,
            date = self.date,
            data_sources = self.data_sources,
            dry_run = self.dry_run,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "session",
            span_name = name,
            session_id = self.session_id,
            date = self.date,
        )
    }
}

/// The session moved to its next phase.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PhaseAdvanced<'a> {
    pub session_id: &'a str,
    pub from: &'a str,
    pub to: &'a str,
}

impl Display for PhaseAdvanced<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Session {}: {} -> {}", self.session_id, self.from, self.to)
    }
}

impl StructuredLog for PhaseAdvanced<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = self.session_id,
            from = self.from,
            to = self.to,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("phase", span_name = name, phase = self.to)
    }
}

/// A validation task was completed without dispatch because its market is closed.
///
/// # Log Level
/// `info!` - Expected skip
pub struct MarketClosedSkip<'a> {
    pub data_source: &'a str,
    pub market: &'a str,
    pub date: &'a str,
}

impl Display for MarketClosedSkip<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Skipping '{}': market {} closed on {}",
            self.data_source, self.market, self.date
        )
    }
}

impl StructuredLog for MarketClosedSkip<'_> {
    fn log(&self) {
        tracing::info!(
            data_source = self.data_source,
            market = self.market,
            date = self.date,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("market_closed", span_name = name, data_source = self.data_source)
    }
}

/// Modification tasks were seeded for one data source.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ModificationsSeeded<'a> {
    pub data_source: &'a str,
    pub store: &'a str,
    pub tasks: usize,
    pub items: usize,
}

impl Display for ModificationsSeeded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Seeded {} modification tasks for '{}' ({} updates to {})",
            self.tasks, self.data_source, self.items, self.store
        )
    }
}

impl StructuredLog for ModificationsSeeded<'_> {
    fn log(&self) {
        tracing::info!(
            data_source = self.data_source,
            store = self.store,
            tasks = self.tasks,
            items = self.items,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("seed_modifications", span_name = name, data_source = self.data_source)
    }
}

/// A correction arrived while the session could still apply it.
///
/// # Log Level
/// `info!` - Operator action
pub struct CorrectionAccepted<'a> {
    pub data_source: &'a str,
    pub instrument_id: &'a str,
    pub field: &'a str,
    pub requested_by: &'a str,
}

impl Display for CorrectionAccepted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Accepted correction for {}/{}.{} from {}",
            self.data_source, self.instrument_id, self.field, self.requested_by
        )
    }
}

impl StructuredLog for CorrectionAccepted<'_> {
    fn log(&self) {
        tracing::info!(
            data_source = self.data_source,
            instrument_id = self.instrument_id,
            field = self.field,
            requested_by = self.requested_by,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("correction", span_name = name, instrument_id = self.instrument_id)
    }
}

/// A correction was deferred to the next session.
///
/// # Log Level
/// `warn!` - Operator action not applied
pub struct CorrectionDeferred<'a> {
    pub data_source: &'a str,
    pub instrument_id: &'a str,
    pub field: &'a str,
    pub reason: &'a str,
}

impl Display for CorrectionDeferred<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Deferred correction for {}/{}.{}: {}",
            self.data_source, self.instrument_id, self.field, self.reason
        )
    }
}

impl StructuredLog for CorrectionDeferred<'_> {
    fn log(&self) {
        tracing::warn!(
            data_source = self.data_source,
            instrument_id = self.instrument_id,
            field = self.field,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("correction_deferred", span_name = name, instrument_id = self.instrument_id)
    }
}

/// The session summary was produced and the session sealed.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SessionFinalized<'a> {
    pub session_id: &'a str,
    pub status: &'a str,
    pub tasks: usize,
    pub modifications: usize,
    pub errors: usize,
    pub elapsed: Duration,
}

impl Display for SessionFinalized<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} finished {} in {:?}: {} tasks, {} modifications, {} errors",
            self.session_id, self.status, self.elapsed, self.tasks, self.modifications, self.errors
        )
    }
}

impl StructuredLog for SessionFinalized<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = self.session_id,
            status = self.status,
            tasks = self.tasks,
            modifications = self.modifications,
            errors = self.errors,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("finalization", span_name = name, session_id = self.session_id)
    }
}

/// The report aggregator rejected the summary.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ReportSubmissionFailed<'a> {
    pub session_id: &'a str,
    pub error: &'a str,
}

impl Display for ReportSubmissionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Report for session {} was not delivered: {}", self.session_id, self.error)
    }
}

impl StructuredLog for ReportSubmissionFailed<'_> {
    fn log(&self) {
        tracing::error!(session_id = self.session_id, error = self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("report", span_name = name, session_id = self.session_id)
    }
}

/// The session ran past its time limit and is being cancelled.
///
/// # Log Level
/// `warn!` - Degraded run
pub struct SessionTimedOut<'a> {
    pub session_id: &'a str,
    pub limit: Duration,
}

impl Display for SessionTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} exceeded its {:?} limit; cancelling outstanding tasks",
            self.session_id, self.limit
        )
    }
}

impl StructuredLog for SessionTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            session_id = self.session_id,
            limit_ms = self.limit.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("session_timeout", span_name = name, session_id = self.session_id)
    }
}
