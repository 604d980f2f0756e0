// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::backends::json_store::FEED_PATH_OPTION;
use crate::backends::report::{InMemoryReportAggregator, JsonReportAggregator};
use crate::backends::stub::{ConcurrencyProbe, FailingWorker, ScriptedWorker, SlowWorker, StubWorker};
use crate::config::{BackendType, Config, DataSourceConfig, Settings, WorkerRegistry};
use crate::errors::{ErrorKind, PipelineError, TaskFailure};
use crate::models::{
    CorrectionRequest, DiscrepancyCategory, FieldValue, Observation, OverallStatus, Phase, Record,
    Session, TaskKind, TaskResult, TaskStatus,
};
use crate::observability::events::{EventBus, PipelineEvent};
use crate::orchestrator::{RunOptions, SessionOrchestrator, SourceSelection};
use crate::traits::{AlwaysOpen, MarketCalendar, WeekdayCalendar, WorkerCapability};

/// End-to-end sessions driven by in-process workers
#[cfg(test)]
mod tests {
    use super::*;

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn fast_settings() -> Settings {
        Settings {
            max_retries: Some(3),
            max_concurrent: Some(4),
            task_timeout_seconds: Some(5),
            retry_base_delay_ms: Some(1),
            retry_max_delay_ms: Some(5),
            ..Default::default()
        }
    }

    fn source(id: &str) -> DataSourceConfig {
        DataSourceConfig {
            id: id.to_string(),
            agent: format!("{}-validator", id),
            modifier: format!("{}-modifier", id),
            store: None,
            market: Some("KRX".to_string()),
            priority: 0,
            backend: BackendType::Stub,
            options: BTreeMap::new(),
        }
    }

    fn config(settings: Settings, sources: Vec<DataSourceConfig>) -> Config {
        Config {
            settings,
            holidays: Vec::new(),
            data_sources: sources,
        }
    }

    fn price(instrument_id: &str, current: f64, fetched: f64) -> Observation {
        Observation {
            current: Record::new(instrument_id, instrument_id).with_field("price", current),
            fetched: Record::new(instrument_id, instrument_id).with_field("price", fetched),
        }
    }

    fn orchestrator(
        config: Config,
        workers: Vec<(&str, Arc<dyn WorkerCapability>)>,
        calendar: Arc<dyn MarketCalendar>,
        reporter: Arc<InMemoryReportAggregator>,
    ) -> SessionOrchestrator {
        let mut registry = WorkerRegistry::new();
        for (agent, worker) in workers {
            registry.register(agent, worker);
        }
        SessionOrchestrator::new(config, registry, calendar, reporter)
    }

    fn correction(data_source: &str, instrument_id: &str) -> CorrectionRequest {
        CorrectionRequest {
            data_source: data_source.to_string(),
            instrument_id: instrument_id.to_string(),
            name: instrument_id.to_string(),
            field: "nav".to_string(),
            current_value: Some(FieldValue::Number(10000.0)),
            new_value: FieldValue::Number(10012.0),
            requested_by: "ops-desk".to_string(),
        }
    }

    /// Every update item ends up as exactly one modification or one item-scoped error.
    fn assert_updates_accounted_for(session: &Session) {
        for details in session.details().values() {
            for detail in details.iter().filter(|d| d.needs_update()) {
                let applied = session
                    .modifications()
                    .iter()
                    .filter(|m| m.instrument_id == detail.instrument_id && m.field == detail.field)
                    .count();
                let failed = session
                    .errors()
                    .iter()
                    .filter(|e| {
                        e.instrument_id.as_deref() == Some(detail.instrument_id.as_str())
                            && e.field.as_deref() == Some(detail.field.as_str())
                    })
                    .count();
                assert_eq!(
                    applied + failed,
                    1,
                    "{}.{} accounted for {} times",
                    detail.instrument_id,
                    detail.field,
                    applied + failed
                );
            }
        }
    }

    #[tokio::test]
    async fn test_session_classifies_updates_and_reports() {
        let validator = StubWorker::new("korean-etf-validator").with_observations(
            "korean-etf",
            vec![
                price("069500", 1000.0, 1000.5),
                price("102110", 1000.0, 1050.0),
                price("229200", 1000.0, 3000.0),
            ],
        );
        let reporter = Arc::new(InMemoryReportAggregator::new());
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf")]),
            vec![
                ("korean-etf-validator", Arc::new(validator)),
                ("korean-etf-modifier", Arc::new(StubWorker::new("korean-etf-modifier"))),
            ],
            Arc::new(AlwaysOpen),
            reporter.clone(),
        );

        let session = orchestrator.run(RunOptions::new(friday())).await.unwrap();

        assert_eq!(session.phase(), Phase::Finalization);
        assert!(session.is_sealed());
        let summary = session.summary().unwrap();
        assert_eq!(summary.status(), OverallStatus::Success);
        assert_eq!(summary.execution_summary.instruments_checked, 3);
        assert_eq!(summary.execution_summary.discrepancies, 2);
        assert_eq!(summary.execution_summary.updates, 1);
        assert_eq!(summary.execution_summary.manual_reviews, 1);
        assert_eq!(summary.modifications.len(), 1);
        assert_eq!(summary.modifications[0].instrument_id, "102110");
        assert_eq!(summary.modifications[0].new_value, Some(FieldValue::Number(1050.0)));
        assert!(summary.errors.is_empty());
        assert_updates_accounted_for(&session);

        assert_eq!(reporter.summaries(), vec![summary.clone()]);
        let report_task = session.tasks().iter().find(|t| t.kind == TaskKind::Report).unwrap();
        assert_eq!(report_task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_validation_timeouts_retry_then_complete() {
        let validator = ScriptedWorker::new("korean-etf-validator")
            .then_fail(TaskFailure::of(ErrorKind::Timeout, "feed slow"))
            .then_fail(TaskFailure::of(ErrorKind::Timeout, "feed slow"))
            .then_ok(TaskResult::succeeded().with_observations(vec![price("069500", 1000.0, 1000.0)]));
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf")]),
            vec![("korean-etf-validator", Arc::new(validator))],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        );

        let session = orchestrator.run(RunOptions::new(friday())).await.unwrap();

        let task = session
            .tasks()
            .iter()
            .find(|t| t.id == "validation:korean-etf")
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.retry_count, 2);
        let summary = session.summary().unwrap();
        assert_eq!(summary.status(), OverallStatus::Success);
        assert_eq!(summary.execution_summary.retries, 2);
        assert_eq!(summary.data_source_reports[0].retry_count, 2);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_all_validations_failing_fails_the_session() {
        let reporter = Arc::new(InMemoryReportAggregator::new());
        let unavailable = TaskFailure::of(ErrorKind::WorkerUnavailable, "feed unreachable");
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf"), source("us-equity")]),
            vec![
                ("korean-etf-validator", Arc::new(FailingWorker::new("korean-etf-validator", unavailable.clone()))),
                ("us-equity-validator", Arc::new(FailingWorker::new("us-equity-validator", unavailable))),
            ],
            Arc::new(AlwaysOpen),
            reporter.clone(),
        );

        let session = orchestrator.run(RunOptions::new(friday())).await.unwrap();

        let summary = session.summary().unwrap();
        assert_eq!(summary.status(), OverallStatus::Failed);
        assert!(!session.tasks().iter().any(|t| t.kind == TaskKind::Modification));
        assert_eq!(summary.errors.len(), 2);
        assert!(summary.errors.iter().all(|e| e.kind == ErrorKind::RetriesExhausted));
        assert!(summary.errors.iter().all(|e| e.retry_count == 3));

        let delivered = reporter.summaries();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].errors, summary.errors);
    }

    #[tokio::test]
    async fn test_shared_store_modifications_never_overlap() {
        let probe = Arc::new(ConcurrencyProbe::new("shared-modifier", Duration::from_millis(10)));
        let mut sources = vec![source("korean-etf"), source("korean-bond")];
        for ds in &mut sources {
            ds.modifier = "shared-modifier".to_string();
            ds.store = Some("shared.json".to_string());
        }
        let settings = Settings {
            modification_batch_size: Some(1),
            ..fast_settings()
        };
        let etf = StubWorker::new("korean-etf-validator").with_observations(
            "korean-etf",
            vec![price("069500", 1000.0, 1050.0), price("102110", 1000.0, 1020.0)],
        );
        let bond = StubWorker::new("korean-bond-validator").with_observations(
            "korean-bond",
            vec![price("KR101", 100.0, 101.0), price("KR102", 100.0, 99.0)],
        );
        let orchestrator = orchestrator(
            config(settings, sources),
            vec![
                ("korean-etf-validator", Arc::new(etf)),
                ("korean-bond-validator", Arc::new(bond)),
                ("shared-modifier", probe.clone()),
            ],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        );

        let session = orchestrator.run(RunOptions::new(friday())).await.unwrap();

        assert_eq!(session.modifications().len(), 4);
        assert_eq!(probe.max_observed_for("shared.json"), 1);
        assert_updates_accounted_for(&session);
    }

    #[tokio::test]
    async fn test_failed_modification_blocks_its_store_chain() {
        let settings = Settings {
            modification_batch_size: Some(1),
            ..fast_settings()
        };
        let etf = StubWorker::new("korean-etf-validator").with_observations(
            "korean-etf",
            vec![
                price("069500", 1000.0, 1050.0),
                price("102110", 1000.0, 1050.0),
                price("229200", 1000.0, 1050.0),
            ],
        );
        let equity = StubWorker::new("us-equity-validator")
            .with_observations("us-equity", vec![price("AAPL", 200.0, 210.0)]);
        let broken = ScriptedWorker::new("korean-etf-modifier").then_fail(TaskFailure::fatal("store is read-only"));
        let orchestrator = orchestrator(
            config(settings, vec![source("korean-etf"), source("us-equity")]),
            vec![
                ("korean-etf-validator", Arc::new(etf)),
                ("us-equity-validator", Arc::new(equity)),
                ("korean-etf-modifier", Arc::new(broken)),
                ("us-equity-modifier", Arc::new(StubWorker::new("us-equity-modifier"))),
            ],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        );

        let session = orchestrator.run(RunOptions::new(friday())).await.unwrap();

        let summary = session.summary().unwrap();
        assert_eq!(summary.status(), OverallStatus::Partial);
        assert_eq!(summary.execution_summary.failed_tasks, 1);
        assert_eq!(summary.execution_summary.blocked_tasks, 2);
        assert_eq!(summary.modifications.len(), 1);
        assert_eq!(summary.modifications[0].instrument_id, "AAPL");

        let mut item_errors: Vec<(&str, ErrorKind)> = summary
            .errors
            .iter()
            .filter(|e| e.is_item_scoped())
            .map(|e| (e.instrument_id.as_deref().unwrap(), e.kind))
            .collect();
        item_errors.sort_by(|a, b| a.0.cmp(b.0));
        assert_eq!(
            item_errors,
            vec![
                ("069500", ErrorKind::WorkerReported),
                ("102110", ErrorKind::DependencyBlocked),
                ("229200", ErrorKind::DependencyBlocked),
            ]
        );
        assert_updates_accounted_for(&session);

        let etf_report = summary
            .data_source_reports
            .iter()
            .find(|r| r.data_source == "korean-etf")
            .unwrap();
        assert_eq!(etf_report.items_updated, 0);
        assert_eq!(etf_report.items_failed, 3);
    }

    #[tokio::test]
    async fn test_closed_market_skips_validation_without_dispatch() {
        let saturday = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let validator = Arc::new(ScriptedWorker::new("korean-etf-validator"));
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf")]),
            vec![("korean-etf-validator", validator.clone())],
            Arc::new(WeekdayCalendar::new(Vec::new())),
            Arc::new(InMemoryReportAggregator::new()),
        );

        let session = orchestrator.run(RunOptions::new(saturday)).await.unwrap();

        assert!(validator.calls().is_empty());
        let summary = session.summary().unwrap();
        assert_eq!(summary.status(), OverallStatus::Success);
        assert!(summary.data_source_reports[0].skipped);
        assert_eq!(summary.data_source_reports[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_closed_market_is_validated_when_skipping_is_disabled() {
        let saturday = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let validator = Arc::new(ScriptedWorker::new("korean-etf-validator"));
        let settings = Settings {
            skip_if_market_closed: Some(false),
            ..fast_settings()
        };
        let orchestrator = orchestrator(
            config(settings, vec![source("korean-etf")]),
            vec![("korean-etf-validator", validator.clone())],
            Arc::new(WeekdayCalendar::new(Vec::new())),
            Arc::new(InMemoryReportAggregator::new()),
        );

        let session = orchestrator.run(RunOptions::new(saturday)).await.unwrap();

        assert_eq!(validator.calls().len(), 1);
        assert!(!session.summary().unwrap().data_source_reports[0].skipped);
    }

    #[tokio::test]
    async fn test_dry_run_validates_but_modifies_nothing() {
        let validator = StubWorker::new("korean-etf-validator")
            .with_observations("korean-etf", vec![price("102110", 1000.0, 1050.0)]);
        let modifier = Arc::new(ScriptedWorker::new("korean-etf-modifier"));
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf")]),
            vec![
                ("korean-etf-validator", Arc::new(validator)),
                ("korean-etf-modifier", modifier.clone()),
            ],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        );
        orchestrator
            .corrections()
            .submit(correction("korean-etf", "069500"))
            .unwrap();

        let session = orchestrator
            .run(RunOptions::new(friday()).dry_run(true))
            .await
            .unwrap();

        assert!(modifier.calls().is_empty());
        let summary = session.summary().unwrap();
        assert!(summary.execution_summary.dry_run);
        assert_eq!(summary.execution_summary.updates, 1);
        assert!(summary.modifications.is_empty());
        assert_eq!(summary.deferred_corrections.len(), 1);
        assert_eq!(summary.status(), OverallStatus::Success);
    }

    #[tokio::test]
    async fn test_correction_sent_before_modification_is_applied() {
        let validator = StubWorker::new("korean-etf-validator")
            .with_observations("korean-etf", vec![price("069500", 1000.0, 1000.0)]);
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf"), source("us-equity")]),
            vec![
                ("korean-etf-validator", Arc::new(validator)),
                ("us-equity-validator", Arc::new(StubWorker::new("us-equity-validator"))),
                ("korean-etf-modifier", Arc::new(StubWorker::new("korean-etf-modifier"))),
            ],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        );
        let corrections = orchestrator.corrections();
        corrections.submit(correction("korean-etf", "069500")).unwrap();
        corrections.submit(correction("jp-reit", "8951")).unwrap();

        let session = orchestrator
            .run(RunOptions::new(friday()).with_sources(SourceSelection::Only(vec!["korean-etf".into()])))
            .await
            .unwrap();

        let summary = session.summary().unwrap();
        assert_eq!(summary.modifications.len(), 1);
        assert_eq!(summary.modifications[0].task_id, "correction:korean-etf:1");
        assert_eq!(summary.modifications[0].field, "nav");
        assert!(session.details()["korean-etf"]
            .iter()
            .any(|d| d.category == Some(DiscrepancyCategory::ManualCorrection)));
        assert_eq!(summary.deferred_corrections, vec![correction("jp-reit", "8951")]);
        assert_updates_accounted_for(&session);

        assert_eq!(
            corrections.submit(correction("korean-etf", "102110")),
            Err(correction("korean-etf", "102110"))
        );
    }

    #[tokio::test]
    async fn test_cancellation_fails_outstanding_work_and_still_reports() {
        let reporter = Arc::new(InMemoryReportAggregator::new());
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf"), source("us-equity")]),
            vec![
                ("korean-etf-validator", Arc::new(SlowWorker::new("korean-etf-validator", Duration::from_secs(30)))),
                ("us-equity-validator", Arc::new(SlowWorker::new("us-equity-validator", Duration::from_secs(30)))),
            ],
            Arc::new(AlwaysOpen),
            reporter.clone(),
        );
        let token = orchestrator.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        });

        let session = orchestrator.run(RunOptions::new(friday())).await.unwrap();

        let summary = session.summary().unwrap();
        assert!(summary.execution_summary.cancelled);
        assert_eq!(summary.status(), OverallStatus::Failed);
        assert_eq!(summary.errors.len(), 2);
        assert!(summary.errors.iter().all(|e| e.kind == ErrorKind::SessionCancelled));
        assert_eq!(reporter.summaries().len(), 1);
    }

    #[tokio::test]
    async fn test_session_timeout_cancels_the_run() {
        let settings = Settings {
            session_timeout_seconds: Some(1),
            task_timeout_seconds: Some(60),
            ..fast_settings()
        };
        let orchestrator = orchestrator(
            config(settings, vec![source("korean-etf")]),
            vec![("korean-etf-validator", Arc::new(SlowWorker::new("korean-etf-validator", Duration::from_secs(60))))],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        );

        let session = tokio::time::timeout(Duration::from_secs(10), orchestrator.run(RunOptions::new(friday())))
            .await
            .expect("session should stop at its own limit")
            .unwrap();

        let summary = session.summary().unwrap();
        assert!(summary.execution_summary.cancelled);
        assert_eq!(summary.errors[0].kind, ErrorKind::SessionCancelled);
    }

    #[tokio::test]
    async fn test_rejected_report_is_recorded_without_changing_the_summary() {
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf")]),
            vec![("korean-etf-validator", Arc::new(StubWorker::new("korean-etf-validator")))],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::rejecting()),
        );

        let session = orchestrator.run(RunOptions::new(friday())).await.unwrap();

        let summary = session.summary().unwrap();
        assert_eq!(summary.status(), OverallStatus::Success);
        assert!(summary.errors.is_empty());
        let report_errors: Vec<_> = session.errors().iter().filter(|e| e.task_id == "report").collect();
        assert_eq!(report_errors.len(), 1);
        let report_task = session.tasks().iter().find(|t| t.kind == TaskKind::Report).unwrap();
        assert_eq!(report_task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_events_bracket_the_session() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf")]),
            vec![("korean-etf-validator", Arc::new(StubWorker::new("korean-etf-validator")))],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        )
        .with_events(bus);

        orchestrator.run(RunOptions::new(friday())).await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert!(matches!(received.first(), Some(PipelineEvent::SessionStarted { data_sources: 1, .. })));
        assert!(matches!(
            received.last(),
            Some(PipelineEvent::SessionFinished {
                status: OverallStatus::Success,
                ..
            })
        ));
        let phases = received
            .iter()
            .filter(|e| matches!(e, PipelineEvent::PhaseChanged { .. }))
            .count();
        assert_eq!(phases, 3);
        assert!(received
            .iter()
            .any(|e| matches!(e, PipelineEvent::TaskCompleted { task_id, .. } if task_id == "validation:korean-etf")));
    }

    #[tokio::test]
    async fn test_unknown_or_empty_selection_is_rejected() {
        let orchestrator = orchestrator(
            config(fast_settings(), vec![source("korean-etf")]),
            vec![],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        );
        let result = orchestrator
            .run(RunOptions::new(friday()).with_sources(SourceSelection::Only(vec!["nope".into()])))
            .await;
        assert!(matches!(result, Err(PipelineError::UnknownDataSource(id)) if id == "nope"));

        let empty = self::orchestrator(
            config(fast_settings(), vec![]),
            vec![],
            Arc::new(AlwaysOpen),
            Arc::new(InMemoryReportAggregator::new()),
        );
        assert!(matches!(
            empty.run(RunOptions::new(friday())).await,
            Err(PipelineError::NoDataSources)
        ));
    }

    #[tokio::test]
    async fn test_json_store_session_writes_updates_back() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("korean_etf.json");
        let feed = dir.path().join("korean_etf_feed.json");
        std::fs::copy("data/korean_etf.json", &store).unwrap();
        std::fs::copy("feeds/korean_etf.json", &feed).unwrap();

        let mut ds = source("korean-etf");
        ds.backend = BackendType::JsonStore;
        ds.store = Some(store.display().to_string());
        ds.options
            .insert(FEED_PATH_OPTION.to_string(), serde_json::json!(feed.display().to_string()));
        let reporter = Arc::new(JsonReportAggregator::new(dir.path().join("reports")));
        let orchestrator =
            SessionOrchestrator::from_config(config(fast_settings(), vec![ds]), reporter.clone()).unwrap();

        let session = orchestrator.run(RunOptions::new(friday())).await.unwrap();

        let summary = session.summary().unwrap();
        assert_eq!(summary.status(), OverallStatus::Success);
        assert_eq!(summary.execution_summary.updates, 2);
        assert_eq!(summary.execution_summary.manual_reviews, 1);
        assert_eq!(summary.modifications.len(), 2);
        assert_updates_accounted_for(&session);

        let written: Vec<Record> = serde_json::from_slice(&std::fs::read(&store).unwrap()).unwrap();
        let field = |id: &str, name: &str| {
            written
                .iter()
                .find(|r| r.instrument_id == id)
                .and_then(|r| r.get(name).cloned())
        };
        assert_eq!(field("069500", "price"), Some(FieldValue::Number(35300.0)));
        assert_eq!(field("102110", "volume"), Some(FieldValue::Number(1990117.0)));
        assert_eq!(field("229200", "price"), Some(FieldValue::Number(11845.0)));
        assert!(reporter.path_for(summary).exists());
    }

    #[test]
    fn test_source_selection_from_args() {
        let cases = vec![
            (vec![], SourceSelection::All),
            (vec!["all"], SourceSelection::All),
            (vec!["korean-etf", "ALL"], SourceSelection::All),
            (
                vec!["korean-etf", "us-equity"],
                SourceSelection::Only(vec!["korean-etf".into(), "us-equity".into()]),
            ),
        ];
        for (args, expected) in cases {
            let args: Vec<String> = args.into_iter().map(String::from).collect();
            assert_eq!(SourceSelection::from_args(&args), expected, "{:?}", args);
        }
    }
}
