// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit it at the right level with its fields attached.
//!
//! * `engine` - task queue, dispatch and phase runner
//! * `session` - session lifecycle, corrections and report hand-off
//! * `validation` - configuration loading and validation

use tracing::Span;

pub mod engine;
pub mod session;
pub mod validation;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emit the message at its level with its fields attached.
    fn log(&self);

    /// A span carrying the same fields, for work done on behalf of the message.
    fn span(&self, name: &str) -> Span;
}
