// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Session orchestration for a daily validation run.
//!
//! A [`SessionOrchestrator`] drives exactly one session through its phases:
//!
//! 1. **Initialization**: allocate the session, register every agent
//! 2. **Validation**: one task per selected data source; the comparator
//!    classifies whatever the validators observed
//! 3. **Modification**: one task (or one per batch) per data source with
//!    `update` items, chained per store; accepted corrections join here
//! 4. **Finalization**: account for every update item, build the summary,
//!    hand it to the report aggregator, seal the session
//!
//! Each phase ends only when every task in it is terminal. Cancellation
//! (explicit, or the configured session timeout) fails outstanding work and
//! the session still finalizes.
//!
//! # Example
//! ```rust,no_run
//! use refcheck::backends::report::JsonReportAggregator;
//! use refcheck::config::load_and_validate_config;
//! use refcheck::orchestrator::{RunOptions, SessionOrchestrator, SourceSelection};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_and_validate_config("configs/daily.yaml")?;
//! let reporter = Arc::new(JsonReportAggregator::new("reports"));
//! let orchestrator = SessionOrchestrator::from_config(config, reporter)?;
//!
//! let date = chrono::NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
//! let session = orchestrator
//!     .run(RunOptions::new(date).with_sources(SourceSelection::All))
//!     .await?;
//! println!("{}", session.summary().unwrap().status());
//! # Ok(())
//! # }
//! ```

mod corrections;
mod seeding;
mod summary;

#[cfg(test)]
mod integration_tests;

pub use corrections::CorrectionHandle;

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::comparator::compare_observations;
use crate::config::{Config, DataSourceConfig, WorkerRegistry};
use crate::engine::{
    FailureOutcome, NoIntake, PhaseRunner, SessionContext, SharedTaskQueue, TaskQueue,
    WorkerDispatch,
};
use crate::errors::{PipelineError, TaskFailure};
use crate::models::{
    Action, CorrectionRequest, Phase, Session, SessionSummary, Task, TaskResult, TaskStatus,
};
use crate::observability::events::{EventBus, PipelineEvent};
use crate::observability::messages::session::{
    MarketClosedSkip, ModificationsSeeded, PhaseAdvanced, ReportSubmissionFailed,
    SessionFinalized, SessionStarted, SessionTimedOut,
};
use crate::observability::messages::validation::ManualReviewRequired;
use crate::observability::messages::StructuredLog;
use crate::traits::{MarketCalendar, ReportAggregator, WeekdayCalendar};

use corrections::{CorrectionIntake, DEFERRED_FINALIZING};

/// Which configured data sources a session covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceSelection {
    #[default]
    All,
    Only(Vec<String>),
}

impl SourceSelection {
    /// Command line form: no names, or the word `all`, selects everything.
    pub fn from_args(args: &[String]) -> Self {
        if args.is_empty() || args.iter().any(|a| a.eq_ignore_ascii_case("all")) {
            SourceSelection::All
        } else {
            SourceSelection::Only(args.to_vec())
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub date: NaiveDate,
    pub sources: SourceSelection,
    /// Validate and report, but seed no modification tasks
    pub dry_run: bool,
}

impl RunOptions {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            sources: SourceSelection::All,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_sources(mut self, sources: SourceSelection) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Runs one session. Consumed by [`SessionOrchestrator::run`].
pub struct SessionOrchestrator {
    config: Config,
    registry: WorkerRegistry,
    calendar: Arc<dyn MarketCalendar>,
    reporter: Arc<dyn ReportAggregator>,
    events: EventBus,
    cancel: CancellationToken,
    corrections_tx: mpsc::UnboundedSender<CorrectionRequest>,
    corrections_rx: Option<mpsc::UnboundedReceiver<CorrectionRequest>>,
}

impl SessionOrchestrator {
    pub fn new(
        config: Config,
        registry: WorkerRegistry,
        calendar: Arc<dyn MarketCalendar>,
        reporter: Arc<dyn ReportAggregator>,
    ) -> Self {
        let (corrections_tx, corrections_rx) = mpsc::unbounded_channel();
        Self {
            config,
            registry,
            calendar,
            reporter,
            events: EventBus::default(),
            cancel: CancellationToken::new(),
            corrections_tx,
            corrections_rx: Some(corrections_rx),
        }
    }

    /// Workers from the configured backends, weekday calendar with the configured holidays.
    pub fn from_config(
        config: Config,
        reporter: Arc<dyn ReportAggregator>,
    ) -> Result<Self, PipelineError> {
        let registry = WorkerRegistry::from_config(&config)?;
        let calendar = Arc::new(WeekdayCalendar::new(config.holidays.iter().copied()));
        Ok(Self::new(config, registry, calendar, reporter))
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Cancelling the token fails all outstanding work; the session still finalizes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn corrections(&self) -> CorrectionHandle {
        CorrectionHandle::new(self.corrections_tx.clone())
    }

    pub async fn run(mut self, options: RunOptions) -> Result<Session, PipelineError> {
        let sources = self.select_sources(&options.sources)?;
        let settings = &self.config.settings;
        let clock = StdInstant::now();

        let mut session = Session::new(options.date);
        let session_id = session.id().to_string();
        let ctx = SessionContext {
            session_id: session.id(),
            date: options.date,
        };
        let queue = TaskQueue::new(settings.retry_policy()).into_shared();
        let dispatch = WorkerDispatch::new(
            self.registry.clone(),
            settings.task_timeout(),
            settings.retry_on_error(),
            self.events.clone(),
        );
        let runner = PhaseRunner::new(
            queue.clone(),
            Arc::new(dispatch),
            settings.max_concurrent(),
            ctx,
            self.cancel.clone(),
        );
        let watchdog = settings
            .session_timeout()
            .map(|limit| self.spawn_watchdog(session_id.clone(), limit));
        let mut receiver = match self.corrections_rx.take() {
            Some(receiver) => receiver,
            None => mpsc::unbounded_channel().1,
        };

        for ds in &sources {
            session.register_agent(&ds.agent)?;
            if !options.dry_run {
                session.register_agent(&ds.modifier)?;
            }
        }
        SessionStarted {
            session_id: &session_id,
            date: &options.date.to_string(),
            data_sources: sources.len(),
            dry_run: options.dry_run,
        }
        .log();
        self.events.publish(PipelineEvent::SessionStarted {
            session_id: session.id(),
            data_sources: sources.len(),
        });

        self.advance(&mut session, Phase::Validation, &queue).await?;
        self.seed_validation(&sources, options.date, &queue).await?;
        runner.run(Phase::Validation, &mut NoIntake).await;
        self.collect_details(&mut session, &sources, &queue).await?;

        self.advance(&mut session, Phase::Modification, &queue).await?;
        let index: HashMap<String, DataSourceConfig> = sources
            .iter()
            .map(|ds| (ds.id.clone(), ds.clone()))
            .collect();
        let mut intake = CorrectionIntake::new(&mut receiver, &index, options.dry_run);
        if !options.dry_run {
            self.seed_modifications(&session, &sources, &queue).await?;
        }
        let buffered = intake.drain_buffered();
        self.enqueue_serialized(&queue, buffered).await?;
        runner.run(Phase::Modification, &mut intake).await;
        let triage = intake.finish();
        for (data_source, detail) in triage.accepted {
            session.record_details(&data_source, vec![detail])?;
        }
        for request in triage.deferred {
            session.defer_correction(request)?;
        }

        self.advance(&mut session, Phase::Finalization, &queue).await?;
        receiver.close();
        while let Ok(request) = receiver.try_recv() {
            corrections::log_deferral(&request, DEFERRED_FINALIZING);
            session.defer_correction(request)?;
        }
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        self.finalize(&mut session, &queue, options.dry_run, clock).await?;
        Ok(session)
    }

    fn select_sources(
        &self,
        selection: &SourceSelection,
    ) -> Result<Vec<DataSourceConfig>, PipelineError> {
        let selected = match selection {
            SourceSelection::All => self.config.data_sources.clone(),
            SourceSelection::Only(ids) => {
                let mut seen = HashSet::new();
                ids.iter()
                    .filter(|id| seen.insert(id.as_str()))
                    .map(|id| {
                        self.config
                            .data_source(id)
                            .cloned()
                            .ok_or_else(|| PipelineError::UnknownDataSource(id.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        if selected.is_empty() {
            return Err(PipelineError::NoDataSources);
        }
        Ok(selected)
    }

    fn spawn_watchdog(&self, session_id: String, limit: Duration) -> JoinHandle<()> {
        let token = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    SessionTimedOut {
                        session_id: &session_id,
                        limit,
                    }
                    .log();
                    token.cancel();
                }
            }
        })
    }

    async fn advance(
        &self,
        session: &mut Session,
        target: Phase,
        queue: &SharedTaskQueue,
    ) -> Result<(), PipelineError> {
        let from = session.phase();
        {
            let queue = queue.lock().await;
            session.advance_to(target, &queue)?;
        }
        PhaseAdvanced {
            session_id: &session.id().to_string(),
            from: from.as_str(),
            to: target.as_str(),
        }
        .log();
        self.events.publish(PipelineEvent::PhaseChanged {
            session_id: session.id(),
            from,
            to: target,
        });
        Ok(())
    }

    /// One task per source. Closed markets complete as skipped without dispatch.
    async fn seed_validation(
        &self,
        sources: &[DataSourceConfig],
        date: NaiveDate,
        queue: &SharedTaskQueue,
    ) -> Result<(), PipelineError> {
        let skip_closed = self.config.settings.skip_if_market_closed();
        let mut queue = queue.lock().await;
        for ds in sources {
            let task = seeding::validation_task(ds);
            let task_id = task.id.clone();
            self.publish_created(&task);
            queue.enqueue(task)?;

            if skip_closed && !self.calendar.is_open(ds.market(), date) {
                MarketClosedSkip {
                    data_source: &ds.id,
                    market: ds.market(),
                    date: &date.to_string(),
                }
                .log();
                queue.mark_started(&task_id)?;
                queue.mark_completed(
                    &task_id,
                    TaskResult::skipped(format!("market {} closed on {}", ds.market(), date)),
                )?;
            }
        }
        Ok(())
    }

    /// Run observations through the comparator and file the details per source.
    async fn collect_details(
        &self,
        session: &mut Session,
        sources: &[DataSourceConfig],
        queue: &SharedTaskQueue,
    ) -> Result<(), PipelineError> {
        let tolerance = self.config.settings.tolerance();
        let queue = queue.lock().await;
        for ds in sources {
            let Some(task) = queue.get(&seeding::validation_task_id(&ds.id)) else {
                continue;
            };
            let Some(result) = task.result.as_ref().filter(|_| task.status == TaskStatus::Completed)
            else {
                continue;
            };
            let mut details = result.details.clone();
            details.extend(compare_observations(&result.observations, &tolerance));
            for detail in details.iter().filter(|d| d.action == Action::ManualReview) {
                ManualReviewRequired {
                    data_source: &ds.id,
                    instrument_id: &detail.instrument_id,
                    field: &detail.field,
                    category: detail.category.map_or("other", |c| c.as_str()),
                }
                .log();
            }
            session.record_details(&ds.id, details)?;
        }
        Ok(())
    }

    async fn seed_modifications(
        &self,
        session: &Session,
        sources: &[DataSourceConfig],
        queue: &SharedTaskQueue,
    ) -> Result<(), PipelineError> {
        let batch_size = self.config.settings.modification_batch_size();
        for ds in sources {
            let updates: Vec<_> = session
                .details()
                .get(&ds.id)
                .map(|details| details.iter().filter(|d| d.needs_update()).cloned().collect())
                .unwrap_or_default();
            let item_count = updates.len();
            let tasks = seeding::modification_tasks(ds, updates, batch_size);
            if tasks.is_empty() {
                continue;
            }
            ModificationsSeeded {
                data_source: &ds.id,
                store: ds.store_key(),
                tasks: tasks.len(),
                items: item_count,
            }
            .log();
            self.enqueue_serialized(queue, tasks).await?;
        }
        Ok(())
    }

    async fn enqueue_serialized(
        &self,
        queue: &SharedTaskQueue,
        tasks: Vec<Task>,
    ) -> Result<(), PipelineError> {
        let mut queue = queue.lock().await;
        for task in tasks {
            self.publish_created(&task);
            queue.enqueue_serialized(task)?;
        }
        Ok(())
    }

    async fn finalize(
        &self,
        session: &mut Session,
        queue: &SharedTaskQueue,
        dry_run: bool,
        clock: StdInstant,
    ) -> Result<(), PipelineError> {
        let (task_errors, snapshot) = {
            let queue = queue.lock().await;
            (queue.errors().to_vec(), queue.snapshot())
        };
        let (modifications, item_errors) = summary::reconcile(&snapshot, &task_errors);
        session.record_errors(task_errors)?;
        session.record_errors(item_errors)?;
        session.record_modifications(modifications)?;
        session.sync_tasks(&*queue.lock().await)?;

        let summary = summary::build(session, dry_run, self.cancel.is_cancelled());
        self.hand_off(session, &summary, queue).await?;
        session.sync_tasks(&*queue.lock().await)?;

        SessionFinalized {
            session_id: &session.id().to_string(),
            status: &summary.status().to_string(),
            tasks: summary.execution_summary.total_tasks,
            modifications: summary.modifications.len(),
            errors: summary.errors.len(),
            elapsed: clock.elapsed(),
        }
        .log();
        self.events.publish(PipelineEvent::SessionFinished {
            session_id: session.id(),
            status: summary.status(),
        });
        session.seal(summary)?;
        Ok(())
    }

    /// Submit the summary as the session's report task. A rejected report is
    /// recorded on the session; the summary itself stays as built.
    async fn hand_off(
        &self,
        session: &mut Session,
        summary: &SessionSummary,
        queue: &SharedTaskQueue,
    ) -> Result<(), PipelineError> {
        let task = seeding::report_task();
        let task_id = task.id.clone();
        self.publish_created(&task);
        {
            let mut queue = queue.lock().await;
            queue.enqueue(task)?;
            queue.mark_started(&task_id)?;
        }

        let outcome = self.reporter.submit(summary).await;
        let mut queue = queue.lock().await;
        match outcome {
            Ok(()) => {
                queue.mark_completed(&task_id, TaskResult::succeeded())?;
            }
            Err(e) => {
                let message = format!("{:#}", e);
                ReportSubmissionFailed {
                    session_id: &session.id().to_string(),
                    error: &message,
                }
                .log();
                if let FailureOutcome::Failed { record, .. } =
                    queue.mark_failed(&task_id, TaskFailure::fatal(message))?
                {
                    session.record_errors(vec![record])?;
                }
            }
        }
        Ok(())
    }

    fn publish_created(&self, task: &Task) {
        self.events.publish(PipelineEvent::TaskCreated {
            task_id: task.id.clone(),
            agent: task.agent.clone(),
            kind: task.kind,
        });
    }
}
