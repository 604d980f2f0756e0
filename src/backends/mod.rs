// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Worker and report backends.
//!
//! # Workers
//!
//! Each data source names a validator agent and a modifier agent; its `type`
//! picks the backend that provides them:
//!
//! - **json_store**: [`json_store::JsonStoreValidator`] compares a JSON store
//!   file against a JSON reference feed, [`json_store::JsonStoreModifier`]
//!   writes accepted updates back to the store.
//! - **stub**: [`stub::StubWorker`] succeeds without touching anything. Handy
//!   for wiring checks and dry configuration runs.
//!
//! `stub` also carries the scripted, failing, slow and concurrency-probing
//! workers the engine and orchestrator tests drive sessions with.
//!
//! # Reports
//!
//! [`report::JsonReportAggregator`] writes one JSON file per session;
//! [`report::InMemoryReportAggregator`] keeps summaries for inspection.
//!
//! ```text
//! Config → WorkerRegistry → WorkerDispatch → Worker
//!                                Session → ReportAggregator
//! ```

pub mod json_store;
pub mod report;
pub mod stub;
