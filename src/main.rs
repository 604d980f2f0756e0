// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refcheck::backends::report::JsonReportAggregator;
use refcheck::config::load_and_validate_config;
use refcheck::errors::ConfigError;
use refcheck::models::OverallStatus;
use refcheck::observability::events::spawn_event_logger;
use refcheck::observability::messages::validation::{ConfigLoaded, ConfigProblem};
use refcheck::observability::messages::StructuredLog;
use refcheck::orchestrator::{RunOptions, SessionOrchestrator, SourceSelection};

/// Validate stored instrument data against reference feeds for one business date.
#[derive(Parser, Debug)]
#[command(name = "refcheck", version, about)]
struct Cli {
    /// Configuration file (.yaml, .yml or .toml)
    #[arg(short, long)]
    config: PathBuf,

    /// Business date to check; defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Validate and report without modifying any store
    #[arg(long)]
    dry_run: bool,

    /// Directory the session report is written to
    #[arg(long, default_value = "reports")]
    report_dir: PathBuf,

    /// Data sources to check, or `all`
    sources: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refcheck=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match load_and_validate_config(&cli.config) {
        Ok(config) => config,
        Err(ConfigError::Invalid(problems)) => {
            for problem in &problems {
                ConfigProblem { problem }.log();
            }
            anyhow::bail!("{} has {} problem(s)", cli.config.display(), problems.len());
        }
        Err(e) => return Err(e).with_context(|| format!("loading {}", cli.config.display())),
    };
    ConfigLoaded {
        path: &cli.config.display().to_string(),
        data_sources: config.data_sources.len(),
    }
    .log();

    let reporter = Arc::new(JsonReportAggregator::new(&cli.report_dir));
    let orchestrator = SessionOrchestrator::from_config(config, reporter.clone())?;
    let event_logger = spawn_event_logger(orchestrator.events());

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling session");
            cancel.cancel();
        }
    });

    let options = RunOptions::new(cli.date.unwrap_or_else(|| Local::now().date_naive()))
        .with_sources(SourceSelection::from_args(&cli.sources))
        .dry_run(cli.dry_run);
    let session = orchestrator.run(options).await?;
    event_logger.abort();

    let Some(summary) = session.summary() else {
        anyhow::bail!("session {} ended without a summary", session.id());
    };
    let totals = &summary.execution_summary;
    println!(
        "{} {}: {} ({} tasks, {} updates applied, {} manual reviews, {} errors)",
        summary.date,
        summary.session_id,
        summary.status(),
        totals.total_tasks,
        totals.modifications_applied,
        totals.manual_reviews,
        totals.errors
    );
    println!("report: {}", reporter.path_for(summary).display());

    Ok(match summary.status() {
        OverallStatus::Success => ExitCode::SUCCESS,
        OverallStatus::Partial => ExitCode::from(1),
        OverallStatus::Failed => ExitCode::from(2),
    })
}
