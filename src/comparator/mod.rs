// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Field-level comparison of stored records against fetched reference data.
//!
//! The comparator is a total, pure function layer: it never mutates its
//! inputs, performs no I/O and can be called from any number of tasks at once.
//! Every (instrument, field) pair produces exactly one [`ValidationDetail`]
//! carrying the recommended [`Action`].
//!
//! # Decision policy
//!
//! For numeric fields the signed percent difference
//! `(fetched - current) / current * 100` is compared against the field's
//! threshold (exclusive: a difference exactly at the threshold is not a
//! discrepancy). The first matching rule wins:
//!
//! 1. current value missing: `manual_review`
//! 2. fetched value missing: `manual_review`
//! 3. current is zero and fetched is not: `manual_review` (no percent difference exists)
//! 4. not discrepant: `skip`
//! 5. discrepant within the sanity ceiling: `update`
//! 6. discrepant beyond the sanity ceiling: `manual_review`
//!
//! Applying every `update` and comparing again yields only `skip`s.
//!
//! # Examples
//!
//! ```rust
//! use refcheck::comparator::{compare, ToleranceConfig};
//! use refcheck::models::{Action, Record};
//!
//! let current = Record::new("069500", "KODEX 200").with_field("price", 1000.0);
//! let fetched = Record::new("069500", "KODEX 200").with_field("price", 1050.0);
//!
//! let details = compare(&current, &fetched, &ToleranceConfig::default());
//! assert_eq!(details.len(), 1);
//! assert_eq!(details[0].action, Action::Update);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::consts::{
    DEFAULT_PRICE_THRESHOLD, DEFAULT_SANITY_CEILING, DEFAULT_VOLUME_THRESHOLD,
};
use crate::models::{
    Action, DiscrepancyCategory, FieldValue, Observation, Record, ValidationDetail,
};

/// Which threshold a field is judged by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Price,
    Volume,
}

impl FieldKind {
    /// Guess the kind from the field name.
    pub fn infer(field: &str) -> Self {
        let lower = field.to_ascii_lowercase();
        if ["volume", "turnover", "shares", "amount"]
            .iter()
            .any(|marker| lower.contains(marker))
        {
            FieldKind::Volume
        } else {
            FieldKind::Price
        }
    }
}

/// Percent thresholds used to classify differences.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceConfig {
    pub price_threshold: f64,
    pub volume_threshold: f64,
    /// Differences beyond this are treated as bad data rather than corrections
    pub sanity_ceiling: f64,
    /// Explicit kinds, overriding name inference
    pub field_kinds: BTreeMap<String, FieldKind>,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            price_threshold: DEFAULT_PRICE_THRESHOLD,
            volume_threshold: DEFAULT_VOLUME_THRESHOLD,
            sanity_ceiling: DEFAULT_SANITY_CEILING,
            field_kinds: BTreeMap::new(),
        }
    }
}

impl ToleranceConfig {
    pub fn kind_of(&self, field: &str) -> FieldKind {
        self.field_kinds
            .get(field)
            .copied()
            .unwrap_or_else(|| FieldKind::infer(field))
    }

    pub fn threshold_for(&self, field: &str) -> f64 {
        match self.kind_of(field) {
            FieldKind::Price => self.price_threshold,
            FieldKind::Volume => self.volume_threshold,
        }
    }
}

/// Compare every field present in either record.
pub fn compare(current: &Record, fetched: &Record, config: &ToleranceConfig) -> Vec<ValidationDetail> {
    let fields: BTreeSet<&String> = current.fields.keys().chain(fetched.fields.keys()).collect();
    fields
        .into_iter()
        .map(|field| compare_field(current, fetched, field, config))
        .collect()
}

/// Compare a batch of worker observations.
pub fn compare_observations(
    observations: &[Observation],
    config: &ToleranceConfig,
) -> Vec<ValidationDetail> {
    observations
        .iter()
        .flat_map(|o| compare(&o.current, &o.fetched, config))
        .collect()
}

/// Compare one field of one instrument.
pub fn compare_field(
    current: &Record,
    fetched: &Record,
    field: &str,
    config: &ToleranceConfig,
) -> ValidationDetail {
    let current_value = current.get(field);
    let fetched_value = fetched.get(field);
    let name = if current.name.is_empty() {
        fetched.name.clone()
    } else {
        current.name.clone()
    };

    let mut detail = ValidationDetail {
        instrument_id: current.instrument_id.clone(),
        name,
        field: field.to_string(),
        current_value: current_value.cloned(),
        fetched_value: fetched_value.cloned(),
        discrepancy: false,
        category: None,
        percent_diff: None,
        action: Action::Skip,
        notes: String::new(),
    };

    let (current_value, fetched_value) = match (current_value, fetched_value) {
        (None, None) => {
            detail.notes = "no value on either side".to_string();
            return detail;
        }
        (None, Some(_)) => {
            return review(detail, DiscrepancyCategory::Other, "current value missing".to_string());
        }
        (Some(_), None) => {
            return review(
                detail,
                DiscrepancyCategory::MissingFetched,
                "reference feed returned no value".to_string(),
            );
        }
        (Some(c), Some(f)) => (c, f),
    };

    match (current_value.as_number(), fetched_value.as_number()) {
        (Some(c), Some(f)) => classify_numeric(detail, c, f, config),
        _ => classify_text(detail, current_value, fetched_value),
    }
}

const PERCENT_SCALE: f64 = 1e9;

fn classify_numeric(
    mut detail: ValidationDetail,
    current: f64,
    fetched: f64,
    config: &ToleranceConfig,
) -> ValidationDetail {
    if !current.is_finite() || !fetched.is_finite() {
        return review(detail, DiscrepancyCategory::Other, "non-finite value".to_string());
    }
    if current == 0.0 {
        if fetched == 0.0 {
            detail.percent_diff = Some(0.0);
            return detail;
        }
        return review(
            detail,
            DiscrepancyCategory::ZeroBaseline,
            format!("stored value is zero, fetched {}", fetched),
        );
    }

    let percent = round_percent((fetched - current) / current * 100.0);
    let threshold = config.threshold_for(&detail.field);
    detail.percent_diff = Some(percent);

    if percent.abs() <= threshold {
        return detail;
    }

    detail.discrepancy = true;
    if percent.abs() <= config.sanity_ceiling {
        detail.action = Action::Update;
        detail.category = Some(match config.kind_of(&detail.field) {
            FieldKind::Price => DiscrepancyCategory::PriceDeviation,
            FieldKind::Volume => DiscrepancyCategory::VolumeDeviation,
        });
        detail.notes = format!("{:+.4}% exceeds {}% threshold", percent, threshold);
        detail
    } else {
        let notes = format!(
            "{:+.4}% exceeds sanity ceiling of {}%",
            percent, config.sanity_ceiling
        );
        review(detail, DiscrepancyCategory::ImplausibleJump, notes)
    }
}

/// Snaps a percent difference to nine decimal places so values that are
/// exactly on a threshold in decimal compare equal to it.
fn round_percent(percent: f64) -> f64 {
    (percent * PERCENT_SCALE).round() / PERCENT_SCALE
}

fn classify_text(detail: ValidationDetail, current: &FieldValue, fetched: &FieldValue) -> ValidationDetail {
    if current.to_string().trim() == fetched.to_string().trim() {
        return detail;
    }
    let notes = format!("'{}' differs from '{}'", current, fetched);
    review(detail, DiscrepancyCategory::ValueMismatch, notes)
}

fn review(mut detail: ValidationDetail, category: DiscrepancyCategory, notes: String) -> ValidationDetail {
    detail.discrepancy = true;
    detail.category = Some(category);
    detail.action = Action::ManualReview;
    detail.notes = notes;
    detail
}
