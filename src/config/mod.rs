// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod validation;
mod worker_registry;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, BackendType, Config, DataSourceConfig, Settings,
};
pub use validation::validate_config;
pub use worker_registry::WorkerRegistry;
