// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and progress events.
//!
//! Log messages follow a struct-based pattern with a `Display` implementation
//! so the wording lives in one place and every call site logs the same fields:
//!
//! * `messages::engine` - queue, dispatch and phase runner events
//! * `messages::session` - session lifecycle, corrections and reporting
//! * `messages::validation` - configuration loading and validation
//!
//! `events` carries the in-process progress bus (`task_started`,
//! `task_completed`, `task_failed`, ...) that observers can subscribe to.
//!
//! # Usage
//!
//! ```rust
//! use refcheck::observability::messages::engine::TaskRetryScheduled;
//! use refcheck::observability::messages::StructuredLog;
//! use std::time::Duration;
//!
//! let msg = TaskRetryScheduled {
//!     task_id: "validation:korean-etf",
//!     attempt: 2,
//!     delay: Duration::from_millis(500),
//!     reason: "timeout: no answer within 30s",
//! };
//!
//! msg.log();
//! ```

pub mod events;
pub mod messages;
