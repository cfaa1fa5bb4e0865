//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::forecast::{AdditiveConfig, SeasonalityToggle};
use crate::pipeline::WindowPolicy;
use crate::storage::{validate_table_name, DocumentSchema};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub results: ResultsConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("flowcast"))
        .unwrap_or_else(|| PathBuf::from("./flowcast_data"))
}

/// HTTP gateway configuration
#[derive(Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret expected in the `api_key` header
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Historical observation store
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,

    /// Sensor node whose flow is forecast
    #[serde(default = "default_entity_id")]
    pub entity_id: String,

    #[serde(default = "default_entity_field")]
    pub entity_field: String,

    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    #[serde(default = "default_value_field")]
    pub value_field: String,
}

fn default_history_path() -> PathBuf {
    default_data_dir().join("history.db")
}

fn default_entity_id() -> String {
    "DMC012".to_string()
}

fn default_entity_field() -> String {
    "info.id_node".to_string()
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

fn default_value_field() -> String {
    "data.raw_cur_flow".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            entity_id: default_entity_id(),
            entity_field: default_entity_field(),
            timestamp_field: default_timestamp_field(),
            value_field: default_value_field(),
        }
    }
}

impl HistoryConfig {
    /// Field paths for the document store
    pub fn schema(&self) -> DocumentSchema {
        DocumentSchema::new(&self.entity_field, &self.timestamp_field, &self.value_field)
    }
}

/// Forecast results store
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsConfig {
    #[serde(default = "default_results_path")]
    pub path: PathBuf,

    #[serde(default = "default_results_table")]
    pub table: String,
}

fn default_results_path() -> PathBuf {
    default_data_dir().join("results.db")
}

fn default_results_table() -> String {
    "forecasting".to_string()
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            path: default_results_path(),
            table: default_results_table(),
        }
    }
}

/// Training window selection
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub policy: WindowPolicy,

    #[serde(default = "default_min_points")]
    pub min_points: usize,
}

fn default_min_points() -> usize {
    10
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            policy: WindowPolicy::default(),
            min_points: default_min_points(),
        }
    }
}

/// Model and horizon
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    /// Future points after the last training timestamp
    #[serde(default = "default_horizon_points")]
    pub horizon_points: usize,

    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_secs: u64,

    #[serde(default = "default_changepoint_prior_scale")]
    pub changepoint_prior_scale: f64,

    #[serde(default = "default_n_changepoints")]
    pub n_changepoints: usize,

    #[serde(default = "default_changepoint_range")]
    pub changepoint_range: f64,

    #[serde(default = "default_seasonality_prior_scale")]
    pub seasonality_prior_scale: f64,

    #[serde(default = "default_interval_width")]
    pub interval_width: f64,

    #[serde(default)]
    pub daily_seasonality: SeasonalityToggle,

    #[serde(default)]
    pub weekly_seasonality: SeasonalityToggle,

    #[serde(default)]
    pub yearly_seasonality: SeasonalityToggle,
}

fn default_horizon_points() -> usize {
    2016 // one week at 5 minutes
}

fn default_sampling_interval() -> u64 {
    300
}

fn default_changepoint_prior_scale() -> f64 {
    0.01
}

fn default_n_changepoints() -> usize {
    25
}

fn default_changepoint_range() -> f64 {
    0.8
}

fn default_seasonality_prior_scale() -> f64 {
    10.0
}

fn default_interval_width() -> f64 {
    0.80
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_points: default_horizon_points(),
            sampling_interval_secs: default_sampling_interval(),
            changepoint_prior_scale: default_changepoint_prior_scale(),
            n_changepoints: default_n_changepoints(),
            changepoint_range: default_changepoint_range(),
            seasonality_prior_scale: default_seasonality_prior_scale(),
            interval_width: default_interval_width(),
            daily_seasonality: SeasonalityToggle::Auto,
            weekly_seasonality: SeasonalityToggle::Auto,
            yearly_seasonality: SeasonalityToggle::Auto,
        }
    }
}

impl ForecastConfig {
    pub fn sampling_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sampling_interval_secs as i64)
    }

    /// Model parameters, with the window's minimum as the model's minimum
    pub fn model_config(&self, min_points: usize) -> AdditiveConfig {
        AdditiveConfig {
            changepoint_prior_scale: self.changepoint_prior_scale,
            n_changepoints: self.n_changepoints,
            changepoint_range: self.changepoint_range,
            seasonality_prior_scale: self.seasonality_prior_scale,
            interval_width: self.interval_width,
            daily_seasonality: self.daily_seasonality,
            weekly_seasonality: self.weekly_seasonality,
            yearly_seasonality: self.yearly_seasonality,
            min_points,
        }
    }
}

/// Periodic train-and-write job
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_schedule_interval")]
    pub interval_minutes: u64,
}

fn default_schedule_interval() -> u64 {
    60
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_schedule_interval(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("flowcast={},tower_http=info", config.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse TOML content
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        for path in Self::default_paths() {
            if path.exists() {
                match Self::load_with_env(&path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Candidate config files, most specific first
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("flowcast").join("config.toml")),
            Some(PathBuf::from("/etc/flowcast/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // API overrides
        if let Some(host) = lookup("FLOWCAST_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("FLOWCAST_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
        if let Some(key) = lookup("FLOWCAST_API_KEY").or_else(|| lookup("API_KEY")) {
            self.api.api_key = key;
        }
        if let Some(secs) = lookup("FLOWCAST_REQUEST_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.api.request_timeout_secs = secs;
        }

        // Store overrides
        if let Some(path) = lookup("FLOWCAST_HISTORY_PATH") {
            self.history.path = PathBuf::from(path);
        }
        if let Some(entity) = lookup("FLOWCAST_ENTITY_ID") {
            self.history.entity_id = entity;
        }
        if let Some(path) = lookup("FLOWCAST_RESULTS_PATH") {
            self.results.path = PathBuf::from(path);
        }
        if let Some(table) = lookup("FLOWCAST_RESULTS_TABLE") {
            self.results.table = table;
        }

        // Schedule overrides
        if let Some(enabled) = lookup("FLOWCAST_SCHEDULE_ENABLED") {
            self.schedule.enabled = enabled.to_lowercase() != "false" && enabled != "0";
        }
        if let Some(minutes) = lookup("FLOWCAST_SCHEDULE_INTERVAL_MINUTES").and_then(|m| m.parse().ok()) {
            self.schedule.interval_minutes = minutes;
        }

        // Logging overrides
        if let Some(level) = lookup("FLOWCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("FLOWCAST_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            self.logging.format = format;
        }
    }

    /// Reject settings no run could succeed with
    /// Full check for the server: the API section plus [`Config::validate_pipeline`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.api.api_key.is_empty() {
            return invalid("api.api_key is empty (set API_KEY)".to_string());
        }
        if self.api.request_timeout_secs == 0 {
            return invalid("api.request_timeout_secs must be positive".to_string());
        }
        self.validate_pipeline()
    }

    /// Everything a pipeline run needs, without the API section
    pub fn validate_pipeline(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.history.entity_id.is_empty() {
            return invalid("history.entity_id is empty".to_string());
        }
        validate_table_name(&self.results.table)
            .or_else(|e| invalid(format!("results.table: {}", e)))?;
        self.window
            .policy
            .validate()
            .or_else(|e| invalid(format!("window.policy: {}", e)))?;
        if self.window.min_points < 2 {
            return invalid("window.min_points must be at least 2".to_string());
        }
        if self.forecast.horizon_points == 0 {
            return invalid("forecast.horizon_points must be positive".to_string());
        }
        if self.forecast.sampling_interval_secs == 0 {
            return invalid("forecast.sampling_interval_secs must be positive".to_string());
        }
        self.forecast
            .model_config(self.window.min_points)
            .validate()
            .or_else(|e| invalid(format!("forecast: {}", e)))?;
        if self.schedule.enabled && self.schedule.interval_minutes == 0 {
            return invalid("schedule.interval_minutes must be positive".to_string());
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Flowcast Configuration
#
# Environment variables override these settings:
# - API_KEY / FLOWCAST_API_KEY
# - FLOWCAST_API_HOST, FLOWCAST_API_PORT, FLOWCAST_REQUEST_TIMEOUT_SECS
# - FLOWCAST_HISTORY_PATH, FLOWCAST_ENTITY_ID
# - FLOWCAST_RESULTS_PATH, FLOWCAST_RESULTS_TABLE
# - FLOWCAST_SCHEDULE_ENABLED, FLOWCAST_SCHEDULE_INTERVAL_MINUTES
# - FLOWCAST_LOG_LEVEL, FLOWCAST_LOG_FORMAT

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 5000

# Secret expected in the api_key header (prefer the API_KEY env var)
api_key = ""

# Upper bound for one forecast request, in seconds
request_timeout_secs = 120

[history]
# SQLite file holding raw sensor documents
path = "./data/history.db"

# Sensor node to forecast
entity_id = "DMC012"

# Dotted paths into each sensor document
entity_field = "info.id_node"
timestamp_field = "timestamp"
value_field = "data.raw_cur_flow"

[results]
# SQLite file holding persisted forecasts
path = "./data/results.db"
table = "forecasting"

[window]
# Smallest training window accepted
min_points = 10

# Train on the last 14 days
[window.policy]
kind = "trailing"
days = 14

# Or train on 14 days from a year ago, shifted to end now:
# kind = "shifted_historical"
# days = 14
# offset_days = 365

[forecast]
# One week of 5-minute points
horizon_points = 2016
sampling_interval_secs = 300

# Lower = smoother trend
changepoint_prior_scale = 0.01
n_changepoints = 25
changepoint_range = 0.8
seasonality_prior_scale = 10.0

# Coverage of yhat_lower..yhat_upper
interval_width = 0.8

# auto, on or off
daily_seasonality = "auto"
weekly_seasonality = "auto"
yearly_seasonality = "auto"

[schedule]
# Periodically retrain and append new forecast rows
enabled = false
interval_minutes = 60

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> Config {
        let mut config = Config::default();
        config.api.api_key = "secret".to_string();
        config
    }

    #[test]
    fn test_generated_config_parses() {
        let mut config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.api.port, 5000);
        assert_eq!(config.history.entity_id, "DMC012");
        assert_eq!(config.results.table, "forecasting");
        assert_eq!(config.window.policy, WindowPolicy::Trailing { days: 14 });
        assert_eq!(config.forecast.horizon_points, 2016);
        assert_eq!(config.forecast.changepoint_prior_scale, 0.01);
        assert_eq!(config.logging.format, LogFormat::Pretty);

        config.api.api_key = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [window.policy]
            kind = "shifted_historical"
            days = 14
            offset_days = 365

            [forecast]
            interval_width = 0.95
            weekly_seasonality = "off"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.window.policy,
            WindowPolicy::ShiftedHistorical { days: 14, offset_days: 365 }
        );
        assert_eq!(config.forecast.interval_width, 0.95);
        assert_eq!(config.forecast.weekly_seasonality, SeasonalityToggle::Off);
        assert_eq!(config.forecast.sampling_interval_secs, 300);
        assert_eq!(config.history.value_field, "data.raw_cur_flow");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("API_KEY", "from-env"),
            ("FLOWCAST_API_PORT", "8080"),
            ("FLOWCAST_ENTITY_ID", "DMC099"),
            ("FLOWCAST_LOG_FORMAT", "json"),
            ("FLOWCAST_SCHEDULE_ENABLED", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.api_key, "from-env");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.history.entity_id, "DMC099");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.schedule.enabled);
    }

    #[test]
    fn test_api_key_is_redacted() {
        let rendered = format!("{:?}", valid().api);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(Config::default().validate().is_err()); // no api key

        let mut config = valid();
        config.forecast.interval_width = 1.5;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.results.table = "forecasting; DROP TABLE x".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.forecast.horizon_points = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.window.policy = WindowPolicy::ShiftedHistorical { days: 14, offset_days: 7 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_validation_ignores_api_key() {
        let config = Config::default();
        assert!(config.validate().is_err());
        assert!(config.validate_pipeline().is_ok());

        let mut config = Config::default();
        config.forecast.sampling_interval_secs = 0;
        assert!(config.validate_pipeline().is_err());
    }
}
