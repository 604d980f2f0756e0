// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structural validation of a loaded [`Config`].
//!
//! Validation collects every problem instead of stopping at the first one, so
//! an operator fixing a config file sees the whole list at once:
//!
//! 1. **Data sources**: at least one, unique ids, non-empty agent names
//! 2. **Tolerances**: finite and non-negative, sanity ceiling above both thresholds
//! 3. **Concurrency**: `max_concurrent` of at least one
//!
//! # Examples
//!
//! ```rust
//! use refcheck::config::{validate_config, Config};
//! use refcheck::errors::ValidationError;
//!
//! let errors = validate_config(&Config::default()).unwrap_err();
//! assert_eq!(errors, vec![ValidationError::NoDataSources]);
//! ```

use std::collections::HashSet;

use crate::config::Config;
use crate::errors::ValidationError;

pub fn validate_config(cfg: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if cfg.data_sources.is_empty() {
        errors.push(ValidationError::NoDataSources);
    }

    let mut seen = HashSet::new();
    for ds in &cfg.data_sources {
        if !seen.insert(ds.id.as_str()) {
            errors.push(ValidationError::DuplicateDataSource {
                data_source: ds.id.clone(),
            });
        }
        if ds.agent.trim().is_empty() {
            errors.push(ValidationError::MissingAgent {
                data_source: ds.id.clone(),
                role: "agent",
            });
        }
        if ds.modifier.trim().is_empty() {
            errors.push(ValidationError::MissingAgent {
                data_source: ds.id.clone(),
                role: "modifier",
            });
        }
    }

    let settings = &cfg.settings;
    let thresholds = [
        ("price_threshold", settings.price_threshold()),
        ("volume_threshold", settings.volume_threshold()),
        ("sanity_ceiling", settings.sanity_ceiling()),
    ];
    for (name, value) in thresholds {
        if !value.is_finite() || value < 0.0 {
            errors.push(ValidationError::InvalidThreshold { name, value });
        }
    }

    let ceiling = settings.sanity_ceiling();
    if ceiling.is_finite() {
        for threshold in [settings.price_threshold(), settings.volume_threshold()] {
            if threshold.is_finite() && threshold > ceiling {
                errors.push(ValidationError::CeilingBelowThreshold { ceiling, threshold });
            }
        }
    }

    if settings.max_concurrent() == 0 {
        errors.push(ValidationError::ZeroConcurrency);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
