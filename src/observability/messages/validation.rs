// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for configuration loading and data validation.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Configuration file parsed and validated.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use refcheck::observability::messages::validation::ConfigLoaded;
///
/// let msg = ConfigLoaded {
///     path: "configs/daily.yaml",
///     data_sources: 3,
/// };
///
/// assert_eq!(msg.to_string(), "Loaded configs/daily.yaml: 3 data sources");
/// ```
pub struct ConfigLoaded<'a> {
    pub path: &'a str,
    pub data_sources: usize,
}

impl Display for ConfigLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Loaded {}: {} data sources", self.path, self.data_sources)
    }
}

impl StructuredLog for ConfigLoaded<'_> {
    fn log(&self) {
        tracing::info!(path = self.path, data_sources = self.data_sources, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("config", span_name = name, path = self.path)
    }
}

/// One structural problem found while validating configuration.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ConfigProblem<'a> {
    pub problem: &'a dyn Display,
}

impl Display for ConfigProblem<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Invalid configuration: {}", self.problem)
    }
}

impl StructuredLog for ConfigProblem<'_> {
    fn log(&self) {
        tracing::error!("{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("config_problem", span_name = name)
    }
}

/// A comparison produced an item that needs a human.
///
/// # Log Level
/// `warn!` - Data quality signal
pub struct ManualReviewRequired<'a> {
    pub data_source: &'a str,
    pub instrument_id: &'a str,
    pub field: &'a str,
    pub category: &'a str,
}

impl Display for ManualReviewRequired<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Manual review needed for {}/{}.{} ({})",
            self.data_source, self.instrument_id, self.field, self.category
        )
    }
}

impl StructuredLog for ManualReviewRequired<'_> {
    fn log(&self) {
        tracing::warn!(
            data_source = self.data_source,
            instrument_id = self.instrument_id,
            field = self.field,
            category = self.category,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("manual_review", span_name = name, instrument_id = self.instrument_id)
    }
}

/// Reference feed carried instruments the store does not hold.
///
/// # Log Level
/// `warn!` - Data quality signal
///
/// # Example
/// ```
/// use refcheck::observability::messages::validation::UnmatchedFeedRecords;
///
/// let ids = vec!["360750".to_string()];
/// let msg = UnmatchedFeedRecords {
///     data_source: "korean-etf",
///     feed: "feeds/korean_etf.json",
///     instrument_ids: &ids,
/// };
///
/// assert_eq!(
///     msg.to_string(),
///     "korean-etf: 1 instrument(s) in feeds/korean_etf.json are not in the store: 360750"
/// );
/// ```
pub struct UnmatchedFeedRecords<'a> {
    pub data_source: &'a str,
    pub feed: &'a str,
    pub instrument_ids: &'a [String],
}

impl Display for UnmatchedFeedRecords<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}: {} instrument(s) in {} are not in the store: {}",
            self.data_source,
            self.instrument_ids.len(),
            self.feed,
            self.instrument_ids.join(", ")
        )
    }
}

impl StructuredLog for UnmatchedFeedRecords<'_> {
    fn log(&self) {
        tracing::warn!(
            data_source = self.data_source,
            feed = self.feed,
            unmatched = self.instrument_ids.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("unmatched_feed_records", span_name = name, data_source = self.data_source)
    }
}
