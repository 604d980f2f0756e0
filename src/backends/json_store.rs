// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Workers backed by JSON files on disk.
//!
//! A store file and a reference feed file are both JSON arrays of
//! [`Record`]s. The validator pairs them up by instrument id; the modifier
//! rewrites the store file with every update of a task applied at once.
//!
//! Options (from the data source's `options` table):
//! - `store_path`: the store file, defaulting to the task's store key
//! - `feed_path`: the reference feed, validator only

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{ErrorKind, TaskFailure};
use crate::models::{FieldValue, Observation, Record, TaskResult};
use crate::observability::messages::validation::UnmatchedFeedRecords;
use crate::observability::messages::StructuredLog;
use crate::traits::{TaskPayload, WorkerCapability};

pub const STORE_PATH_OPTION: &str = "store_path";
pub const FEED_PATH_OPTION: &str = "feed_path";

fn store_path(payload: &TaskPayload) -> PathBuf {
    PathBuf::from(payload.option_str(STORE_PATH_OPTION).unwrap_or(&payload.store_key))
}

fn required_path(payload: &TaskPayload, key: &str) -> Result<PathBuf, TaskFailure> {
    payload
        .option_str(key)
        .map(PathBuf::from)
        .ok_or_else(|| TaskFailure::fatal(format!("data source '{}' has no '{}' option", payload.data_source, key)))
}

async fn read_records(path: &Path) -> Result<Vec<Record>, TaskFailure> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        TaskFailure::of(
            ErrorKind::WorkerUnavailable,
            format!("cannot read '{}': {}", path.display(), e),
        )
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TaskFailure::fatal(format!("'{}' is not a JSON record list: {}", path.display(), e)))
}

async fn write_records(path: &Path, records: &[Record]) -> Result<(), TaskFailure> {
    let bytes = serde_json::to_vec_pretty(records)
        .map_err(|e| TaskFailure::fatal(format!("cannot encode store: {}", e)))?;
    let staging = path.with_extension("json.tmp");
    let write_conflict =
        |e: std::io::Error| TaskFailure::of(ErrorKind::StoreWriteConflict, format!("cannot write '{}': {}", path.display(), e));
    tokio::fs::write(&staging, bytes).await.map_err(write_conflict)?;
    tokio::fs::rename(&staging, path).await.map_err(write_conflict)
}

/// Reads the stored records and the reference feed, returning one
/// observation per stored instrument.
///
/// Instruments absent from the feed come back with an empty fetched record,
/// which the comparator reports for manual review. Feed instruments the store
/// does not hold are logged and listed under `unmatched_feed_instruments` in
/// the result's report.
pub struct JsonStoreValidator {
    name: String,
}

impl JsonStoreValidator {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[async_trait]
impl WorkerCapability for JsonStoreValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, payload: TaskPayload) -> Result<TaskResult, TaskFailure> {
        let stored = read_records(&store_path(&payload)).await?;
        let feed_path = required_path(&payload, FEED_PATH_OPTION)?;
        let feed = read_records(&feed_path).await?;

        let mut fetched: HashMap<String, Record> = feed
            .into_iter()
            .map(|record| (record.instrument_id.clone(), record))
            .collect();

        let observations = stored
            .into_iter()
            .map(|current| {
                let fetched = fetched
                    .remove(&current.instrument_id)
                    .unwrap_or_else(|| Record::new(current.instrument_id.clone(), current.name.clone()));
                Observation { current, fetched }
            })
            .collect();

        let mut result = TaskResult::succeeded().with_observations(observations);
        if !fetched.is_empty() {
            let mut unmatched: Vec<String> = fetched.into_keys().collect();
            unmatched.sort();
            UnmatchedFeedRecords {
                data_source: &payload.data_source,
                feed: &feed_path.display().to_string(),
                instrument_ids: &unmatched,
            }
            .log();
            result.report = Some(serde_json::json!({ "unmatched_feed_instruments": unmatched }));
        }
        Ok(result)
    }
}

/// Applies a task's update items to the store file in a single write.
///
/// Either every item lands or the task fails and the file is untouched.
/// An item whose field already holds the new value counts as applied, so a
/// retried task is harmless.
pub struct JsonStoreModifier {
    name: String,
}

impl JsonStoreModifier {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[async_trait]
impl WorkerCapability for JsonStoreModifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, payload: TaskPayload) -> Result<TaskResult, TaskFailure> {
        let path = store_path(&payload);
        let mut records = read_records(&path).await?;

        for item in &payload.items {
            let new_value = item.fetched_value.clone().ok_or_else(|| {
                TaskFailure::fatal(format!(
                    "update for {}.{} carries no new value",
                    item.instrument_id, item.field
                ))
            })?;
            let record = records
                .iter_mut()
                .find(|r| r.instrument_id == item.instrument_id)
                .ok_or_else(|| {
                    TaskFailure::new(
                        ErrorKind::StoreWriteConflict,
                        false,
                        format!("instrument '{}' is not in the store", item.instrument_id),
                    )
                })?;

            let stored = record.get(&item.field).cloned();
            if !accepts_write(stored.as_ref(), item.current_value.as_ref(), &new_value) {
                return Err(TaskFailure::of(
                    ErrorKind::StoreWriteConflict,
                    format!(
                        "{}.{} changed underneath the session (stored {}, expected {})",
                        item.instrument_id,
                        item.field,
                        display(stored.as_ref()),
                        display(item.current_value.as_ref()),
                    ),
                ));
            }
            record.fields.insert(item.field.clone(), Some(new_value));
        }

        write_records(&path, &records).await?;

        let count = payload.items.len();
        Ok(TaskResult {
            success: true,
            items_processed: count,
            items_updated: count,
            ..TaskResult::default()
        })
    }
}

/// A write is accepted when the stored value is still the one that was
/// compared, already is the value being written, or the item states no
/// expectation at all.
fn accepts_write(stored: Option<&FieldValue>, expected: Option<&FieldValue>, new_value: &FieldValue) -> bool {
    match (stored, expected) {
        (_, None) => true,
        (Some(s), _) if same_value(s, new_value) => true,
        (Some(s), Some(e)) => same_value(s, e),
        (None, Some(_)) => false,
    }
}

fn same_value(a: &FieldValue, b: &FieldValue) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_string().trim() == b.to_string().trim(),
    }
}

fn display(value: Option<&FieldValue>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "nothing".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, DiscrepancyCategory, Task, TaskKind, ValidationDetail};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn write_json(dir: &TempDir, name: &str, records: &[Record]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, serde_json::to_vec(records).unwrap()).unwrap();
        path
    }

    fn payload(kind: TaskKind, options: &[(&str, &Path)], items: Vec<ValidationDetail>) -> TaskPayload {
        let options: BTreeMap<String, serde_json::Value> = options
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v.to_string_lossy())))
            .collect();
        let task = Task::new("t1", "agent", kind, "korean-etf")
            .with_items(items)
            .with_options(options);
        TaskPayload::for_task(&task, Uuid::new_v4(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
    }

    fn update(instrument_id: &str, field: &str, current: f64, new: f64) -> ValidationDetail {
        ValidationDetail {
            instrument_id: instrument_id.to_string(),
            name: String::new(),
            field: field.to_string(),
            current_value: Some(current.into()),
            fetched_value: Some(new.into()),
            discrepancy: true,
            category: Some(DiscrepancyCategory::PriceDeviation),
            percent_diff: None,
            action: Action::Update,
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_validator_pairs_records_by_instrument() {
        let dir = TempDir::new().unwrap();
        let store = write_json(
            &dir,
            "store.json",
            &[
                Record::new("069500", "KODEX 200").with_field("price", 1000.0),
                Record::new("102110", "TIGER 200").with_field("price", 500.0),
            ],
        );
        let feed = write_json(&dir, "feed.json", &[Record::new("069500", "KODEX 200").with_field("price", 1050.0)]);

        let result = JsonStoreValidator::new("validator")
            .invoke(payload(
                TaskKind::Validation,
                &[(STORE_PATH_OPTION, &store), (FEED_PATH_OPTION, &feed)],
                vec![],
            ))
            .await
            .unwrap();

        assert_eq!(result.observations.len(), 2);
        assert_eq!(result.observations[0].fetched.get("price"), Some(&FieldValue::Number(1050.0)));
        assert!(result.observations[1].fetched.fields.is_empty());
        assert_eq!(result.report, None);
    }

    #[tokio::test]
    async fn test_validator_reports_feed_instruments_missing_from_store() {
        let dir = TempDir::new().unwrap();
        let store = write_json(&dir, "store.json", &[Record::new("069500", "KODEX 200").with_field("price", 1000.0)]);
        let feed = write_json(
            &dir,
            "feed.json",
            &[
                Record::new("360750", "TIGER S&P500").with_field("price", 19000.0),
                Record::new("069500", "KODEX 200").with_field("price", 1000.0),
                Record::new("133690", "TIGER NASDAQ100").with_field("price", 120000.0),
            ],
        );

        let result = JsonStoreValidator::new("validator")
            .invoke(payload(
                TaskKind::Validation,
                &[(STORE_PATH_OPTION, &store), (FEED_PATH_OPTION, &feed)],
                vec![],
            ))
            .await
            .unwrap();

        assert_eq!(result.observations.len(), 1);
        assert_eq!(
            result.report,
            Some(serde_json::json!({ "unmatched_feed_instruments": ["133690", "360750"] }))
        );
    }

    #[tokio::test]
    async fn test_validator_without_feed_option_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = write_json(&dir, "store.json", &[]);

        let failure = JsonStoreValidator::new("validator")
            .invoke(payload(TaskKind::Validation, &[(STORE_PATH_OPTION, &store)], vec![]))
            .await
            .unwrap_err();
        assert!(!failure.recoverable);
    }

    #[tokio::test]
    async fn test_unreadable_feed_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let store = write_json(&dir, "store.json", &[]);
        let missing = dir.path().join("nope.json");

        let failure = JsonStoreValidator::new("validator")
            .invoke(payload(
                TaskKind::Validation,
                &[(STORE_PATH_OPTION, &store), (FEED_PATH_OPTION, &missing)],
                vec![],
            ))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::WorkerUnavailable);
        assert!(failure.recoverable);
    }

    #[tokio::test]
    async fn test_modifier_applies_all_items_in_one_write() {
        let dir = TempDir::new().unwrap();
        let store = write_json(
            &dir,
            "store.json",
            &[Record::new("069500", "KODEX 200")
                .with_field("price", 1000.0)
                .with_field("volume", 10.0)],
        );

        let result = JsonStoreModifier::new("modifier")
            .invoke(payload(
                TaskKind::Modification,
                &[(STORE_PATH_OPTION, &store)],
                vec![update("069500", "price", 1000.0, 1005.0), update("069500", "volume", 10.0, 12.0)],
            ))
            .await
            .unwrap();
        assert_eq!(result.items_updated, 2);

        let written: Vec<Record> = serde_json::from_slice(&std::fs::read(&store).unwrap()).unwrap();
        assert_eq!(written[0].get("price"), Some(&FieldValue::Number(1005.0)));
        assert_eq!(written[0].get("volume"), Some(&FieldValue::Number(12.0)));
    }

    #[tokio::test]
    async fn test_modifier_leaves_store_untouched_on_unknown_instrument() {
        let dir = TempDir::new().unwrap();
        let store = write_json(&dir, "store.json", &[Record::new("069500", "KODEX 200").with_field("price", 1000.0)]);

        let failure = JsonStoreModifier::new("modifier")
            .invoke(payload(
                TaskKind::Modification,
                &[(STORE_PATH_OPTION, &store)],
                vec![update("069500", "price", 1000.0, 1005.0), update("999999", "price", 1.0, 2.0)],
            ))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::StoreWriteConflict);
        assert!(!failure.recoverable);

        let written: Vec<Record> = serde_json::from_slice(&std::fs::read(&store).unwrap()).unwrap();
        assert_eq!(written[0].get("price"), Some(&FieldValue::Number(1000.0)));
    }

    #[test]
    fn test_accepts_write() {
        let cases = vec![
            (Some(1000.0), Some(1000.0), 1005.0, true, "stored matches expected"),
            (Some(1005.0), Some(1000.0), 1005.0, true, "already applied"),
            (Some(990.0), Some(1000.0), 1005.0, false, "changed underneath"),
            (None, Some(1000.0), 1005.0, false, "field vanished"),
            (Some(990.0), None, 1005.0, true, "no expectation"),
        ];
        for (stored, expected, new, accepted, label) in cases {
            let stored = stored.map(FieldValue::Number);
            let expected = expected.map(FieldValue::Number);
            assert_eq!(
                accepts_write(stored.as_ref(), expected.as_ref(), &FieldValue::Number(new)),
                accepted,
                "{}",
                label
            );
        }
    }
}
