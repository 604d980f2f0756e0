// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ErrorKind;

/// A single field value as stored or fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value; numeric-looking text (e.g. "1,234.5") counts.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// One instrument's fields, either as stored or as fetched.
///
/// A field that is absent or `null` is treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub instrument_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Option<FieldValue>>,
}

impl Record {
    pub fn new(instrument_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), Some(value.into()));
        self
    }

    pub fn with_missing(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), None);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).and_then(|v| v.as_ref())
    }
}

/// A current/fetched pair returned by a validation worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub current: Record,
    pub fetched: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Update,
    Skip,
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyCategory {
    PriceDeviation,
    VolumeDeviation,
    /// Deviation beyond the sanity ceiling, most likely a bad fetch
    ImplausibleJump,
    /// Stored value is zero so no percent difference exists
    ZeroBaseline,
    MissingFetched,
    /// Non-numeric values that differ
    ValueMismatch,
    /// Correction submitted during the session rather than found by comparison
    ManualCorrection,
    Other,
}

impl DiscrepancyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscrepancyCategory::PriceDeviation => "price_deviation",
            DiscrepancyCategory::VolumeDeviation => "volume_deviation",
            DiscrepancyCategory::ImplausibleJump => "implausible_jump",
            DiscrepancyCategory::ZeroBaseline => "zero_baseline",
            DiscrepancyCategory::MissingFetched => "missing_fetched",
            DiscrepancyCategory::ValueMismatch => "value_mismatch",
            DiscrepancyCategory::ManualCorrection => "manual_correction",
            DiscrepancyCategory::Other => "other",
        }
    }
}

/// Outcome of comparing one (instrument, field) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetail {
    pub instrument_id: String,
    pub name: String,
    pub field: String,
    pub current_value: Option<FieldValue>,
    pub fetched_value: Option<FieldValue>,
    pub discrepancy: bool,
    pub category: Option<DiscrepancyCategory>,
    pub percent_diff: Option<f64>,
    pub action: Action,
    #[serde(default)]
    pub notes: String,
}

impl ValidationDetail {
    pub fn needs_update(&self) -> bool {
        self.discrepancy && self.action == Action::Update
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.instrument_id, &self.field)
    }
}

/// One field actually changed by a modification task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub store: String,
    pub instrument_id: String,
    pub name: String,
    pub field: String,
    pub old_value: Option<FieldValue>,
    pub new_value: Option<FieldValue>,
    pub agent: String,
}

/// Audit entry for a task failure.
///
/// Task-level records leave `instrument_id`/`field` empty; item-level records
/// account for one update item that was never applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub task_id: String,
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorRecord {
    pub fn is_item_scoped(&self) -> bool {
        self.instrument_id.is_some()
    }
}

/// A correction requested while a session is already running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub data_source: String,
    pub instrument_id: String,
    #[serde(default)]
    pub name: String,
    pub field: String,
    pub current_value: Option<FieldValue>,
    pub new_value: FieldValue,
    pub requested_by: String,
}

impl CorrectionRequest {
    /// The correction expressed as an update item for a modification task.
    pub fn to_detail(&self) -> ValidationDetail {
        let percent_diff = match (
            self.current_value.as_ref().and_then(FieldValue::as_number),
            self.new_value.as_number(),
        ) {
            (Some(current), Some(new)) if current != 0.0 => Some((new - current) / current * 100.0),
            _ => None,
        };
        ValidationDetail {
            instrument_id: self.instrument_id.clone(),
            name: self.name.clone(),
            field: self.field.clone(),
            current_value: self.current_value.clone(),
            fetched_value: Some(self.new_value.clone()),
            discrepancy: true,
            category: Some(DiscrepancyCategory::ManualCorrection),
            percent_diff,
            action: Action::Update,
            notes: format!("correction requested by {}", self.requested_by),
        }
    }
}
