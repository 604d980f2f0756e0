// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for worker registry creation from configuration.

use crate::config::BackendType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to create a worker from configuration
    #[error("Failed to create {backend:?} worker '{agent}' for data source '{data_source}': {reason}")]
    WorkerCreationFailed {
        data_source: String,
        agent: String,
        backend: BackendType,
        reason: String,
    },
}
