// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Structural problems found while validating a pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The configuration declares no data sources at all
    NoDataSources,
    /// Two data sources share the same id
    DuplicateDataSource {
        /// The duplicated data source id
        data_source: String,
    },
    /// A data source has an empty validation agent or modifier name
    MissingAgent {
        /// The data source with the missing agent
        data_source: String,
        /// Which role is missing ("agent" or "modifier")
        role: &'static str,
    },
    /// A tolerance setting is negative or not a finite number
    InvalidThreshold {
        /// Setting name as written in the config file
        name: &'static str,
        /// The offending value
        value: f64,
    },
    /// The sanity ceiling is lower than a field threshold, so nothing could ever be updated
    CeilingBelowThreshold {
        /// Configured sanity ceiling
        ceiling: f64,
        /// The field threshold that exceeds it
        threshold: f64,
    },
    /// `max_concurrent` was set to zero
    ZeroConcurrency,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoDataSources => {
                write!(f, "No data sources configured")
            }
            ValidationError::DuplicateDataSource { data_source } => {
                write!(f, "Duplicate data source ID: '{}'", data_source)
            }
            ValidationError::MissingAgent { data_source, role } => {
                write!(f, "Data source '{}' has an empty {} name", data_source, role)
            }
            ValidationError::InvalidThreshold { name, value } => {
                write!(
                    f,
                    "Setting '{}' must be a non-negative number, got {}",
                    name, value
                )
            }
            ValidationError::CeilingBelowThreshold { ceiling, threshold } => {
                write!(
                    f,
                    "Sanity ceiling {}% is below field threshold {}%",
                    ceiling, threshold
                )
            }
            ValidationError::ZeroConcurrency => {
                write!(f, "Setting 'max_concurrent' must be at least 1")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration validation failed:\n{}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
