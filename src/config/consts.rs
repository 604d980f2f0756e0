// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Default percent difference tolerated on price-like fields
pub const DEFAULT_PRICE_THRESHOLD: f64 = 0.1;
/// Default percent difference tolerated on volume-like fields
pub const DEFAULT_VOLUME_THRESHOLD: f64 = 5.0;
/// Percent difference beyond which a change is sent to manual review instead of applied
pub const DEFAULT_SANITY_CEILING: f64 = 50.0;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const DEFAULT_TASK_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Market name used when a data source does not declare one
pub const DEFAULT_MARKET: &str = "default";
