// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::comparator::{FieldKind, ToleranceConfig};
use crate::config::consts::{
    DEFAULT_MARKET, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_RETRIES, DEFAULT_PRICE_THRESHOLD,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_SANITY_CEILING,
    DEFAULT_TASK_TIMEOUT_SECONDS, DEFAULT_VOLUME_THRESHOLD,
};
use crate::engine::RetryPolicy;
use crate::errors::ConfigError;

/// Main configuration for a daily validation run.
///
/// Read once at session start and immutable for the session's lifetime.
///
/// # Example
/// ```yaml
/// settings:
///   price_threshold: 0.1
///   volume_threshold: 5.0
///   skip_if_market_closed: true
///   max_concurrent: 4
/// holidays: [2025-01-01]
/// data_sources:
///   - id: korean-etf
///     agent: korean-etf-validator
///     modifier: korean-etf-modifier
///     store: data/korean_etf.json
///     market: KRX
///     priority: 10
///     options:
///       feed_path: feeds/korean_etf.json
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,
}

impl Config {
    pub fn data_source(&self, id: &str) -> Option<&DataSourceConfig> {
        self.data_sources.iter().find(|ds| ds.id == id)
    }
}

/// Pipeline-wide settings. Every field is optional and falls back to `consts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    pub price_threshold: Option<f64>,
    pub volume_threshold: Option<f64>,
    pub sanity_ceiling: Option<f64>,
    pub skip_if_market_closed: Option<bool>,
    pub retry_on_error: Option<bool>,
    pub max_retries: Option<u32>,
    pub max_concurrent: Option<usize>,
    pub task_timeout_seconds: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub session_timeout_seconds: Option<u64>,
    pub modification_batch_size: Option<usize>,
    #[serde(default)]
    pub field_kinds: BTreeMap<String, FieldKind>,
}

impl Settings {
    pub fn price_threshold(&self) -> f64 {
        self.price_threshold.unwrap_or(DEFAULT_PRICE_THRESHOLD)
    }

    pub fn volume_threshold(&self) -> f64 {
        self.volume_threshold.unwrap_or(DEFAULT_VOLUME_THRESHOLD)
    }

    pub fn sanity_ceiling(&self) -> f64 {
        self.sanity_ceiling.unwrap_or(DEFAULT_SANITY_CEILING)
    }

    pub fn skip_if_market_closed(&self) -> bool {
        self.skip_if_market_closed.unwrap_or(true)
    }

    /// Whether malformed worker results are worth retrying.
    pub fn retry_on_error(&self) -> bool {
        self.retry_on_error.unwrap_or(true)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds.unwrap_or(DEFAULT_TASK_TIMEOUT_SECONDS))
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_seconds.map(Duration::from_secs)
    }

    /// `None` means one modification task per data source.
    pub fn modification_batch_size(&self) -> Option<usize> {
        self.modification_batch_size.filter(|size| *size > 0)
    }

    pub fn tolerance(&self) -> ToleranceConfig {
        ToleranceConfig {
            price_threshold: self.price_threshold(),
            volume_threshold: self.volume_threshold(),
            sanity_ceiling: self.sanity_ceiling(),
            field_kinds: self.field_kinds.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.max_retries())
            .with_base_delay(Duration::from_millis(
                self.retry_base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            ))
            .with_max_delay(Duration::from_millis(
                self.retry_max_delay_ms.unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS),
            ))
    }
}

/// One catalog of instruments and the agents responsible for it.
///
/// # Example
/// ```yaml
/// id: us-equity
/// agent: us-equity-validator
/// modifier: us-equity-modifier
/// type: json_store
/// store: data/us_equity.json
/// market: NYSE
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    pub id: String,
    /// Validation worker name
    pub agent: String,
    /// Modification worker name
    pub modifier: String,
    /// Physical store written by the modifier; defaults to the data source id
    pub store: Option<String>,
    pub market: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(rename = "type", default)]
    pub backend: BackendType,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl DataSourceConfig {
    pub fn store_key(&self) -> &str {
        self.store.as_deref().unwrap_or(&self.id)
    }

    pub fn market(&self) -> &str {
        self.market.as_deref().unwrap_or(DEFAULT_MARKET)
    }
}

/// How the workers of a data source are implemented.
///
/// # Variants
/// * `JsonStore` - Local JSON instrument store checked against a JSON feed
/// * `Stub` - Workers that report success without touching anything
#[derive(Debug, Deserialize, PartialEq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    #[default]
    JsonStore,
    Stub,
}

/// Load a config from a YAML or TOML file, chosen by extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(cfg)
}

/// Load a config and run structural validation, reporting every problem found.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_config(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BASIC: &str = r#"
settings:
  price_threshold: 0.2
  max_concurrent: 2
  field_kinds:
    nav: price
    turnover: volume
holidays: [2025-01-01]
data_sources:
  - id: korean-etf
    agent: korean-etf-validator
    modifier: korean-etf-modifier
    store: data/korean_etf.json
    market: KRX
    priority: 10
    options:
      feed_path: feeds/korean_etf.json
  - id: us-equity
    agent: us-equity-validator
    modifier: us-equity-modifier
    type: stub
"#;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_basic_config() {
        let cfg: Config = serde_yaml::from_str(BASIC).unwrap();
        assert_eq!(cfg.data_sources.len(), 2);
        assert_eq!(cfg.holidays, vec![NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()]);

        let etf = cfg.data_source("korean-etf").unwrap();
        assert_eq!(etf.store_key(), "data/korean_etf.json");
        assert_eq!(etf.market(), "KRX");
        assert_eq!(etf.backend, BackendType::JsonStore);
        assert_eq!(etf.options["feed_path"], "feeds/korean_etf.json");

        let us = cfg.data_source("us-equity").unwrap();
        assert_eq!(us.store_key(), "us-equity");
        assert_eq!(us.market(), DEFAULT_MARKET);
        assert_eq!(us.backend, BackendType::Stub);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.price_threshold(), 0.1);
        assert_eq!(settings.volume_threshold(), 5.0);
        assert_eq!(settings.sanity_ceiling(), 50.0);
        assert!(settings.skip_if_market_closed());
        assert!(settings.retry_on_error());
        assert_eq!(settings.max_retries(), 3);
        assert_eq!(settings.max_concurrent(), 4);
        assert_eq!(settings.task_timeout(), Duration::from_secs(30));
        assert_eq!(settings.session_timeout(), None);
        assert_eq!(settings.modification_batch_size(), None);
    }

    #[test]
    fn test_settings_overrides_flow_into_policies() {
        let cfg: Config = serde_yaml::from_str(BASIC).unwrap();
        let tolerance = cfg.settings.tolerance();
        assert_eq!(tolerance.price_threshold, 0.2);
        assert_eq!(tolerance.kind_of("turnover"), FieldKind::Volume);
        assert_eq!(cfg.settings.max_concurrent(), 2);
        assert_eq!(cfg.settings.retry_policy().max_retries, 3);
    }

    #[test]
    fn test_load_yaml_file() {
        let file = write_temp(".yaml", BASIC);
        let cfg = load_and_validate_config(file.path()).unwrap();
        assert_eq!(cfg.data_sources.len(), 2);
    }

    #[test]
    fn test_load_toml_file() {
        let toml = r#"
holidays = ["2025-12-25"]

[settings]
volume_threshold = 7.5
retry_on_error = false

[[data_sources]]
id = "korean-etf"
agent = "korean-etf-validator"
modifier = "korean-etf-modifier"
"#;
        let file = write_temp(".toml", toml);
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.settings.volume_threshold(), 7.5);
        assert!(!cfg.settings.retry_on_error());
        assert_eq!(cfg.data_sources[0].id, "korean-etf");
        assert_eq!(cfg.holidays.len(), 1);
    }

    #[test]
    fn test_load_and_validate_reports_every_problem() {
        let yaml = r#"
settings:
  price_threshold: -1.0
  max_concurrent: 0
data_sources:
  - id: dup
    agent: a
    modifier: m
  - id: dup
    agent: ""
    modifier: m
"#;
        let file = write_temp(".yaml", yaml);
        let err = load_and_validate_config(file.path()).unwrap_err();
        match err {
            ConfigError::Invalid(problems) => assert_eq!(problems.len(), 4),
            other => panic!("expected validation failure, got {}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }
}
