// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod pipeline;
mod queue;
mod registry;
mod session;

pub use config::{ConfigError, ValidationError};
pub use pipeline::{ErrorKind, PipelineError, TaskFailure};
pub use queue::QueueError;
pub use registry::RegistryError;
pub use session::SessionError;
