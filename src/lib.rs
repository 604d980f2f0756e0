// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;       // worker and report backends
pub mod comparator;     // field-level discrepancy policy
pub mod config;         // config + worker registry
pub mod engine;         // task queue, dispatch, phase runner
pub mod errors;         // error handling
pub mod models;         // session, task and record types
pub mod observability;
pub mod orchestrator;   // session state machine
pub mod traits;         // worker, report and calendar seams
