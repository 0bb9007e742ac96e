use std::env;
use std::path::PathBuf;
use std::time::Duration;

use sentinel_client_core::auth::{DEFAULT_API_BASE_URL, ENV_API_BASE_URL};
use sentinel_client_core::{AuthInputError, normalize_base_url};
use sentinel_dashboard::DEFAULT_METRICS_PATH;
use thiserror::Error;

const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;
const MIN_REFRESH_INTERVAL_MS: u64 = 250;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LOG_FILTER: &str = "info";
const STATE_DIR_NAME: &str = "sentinelstack";

pub const ENV_STATE_DIR: &str = "SENTINEL_STATE_DIR";
pub const ENV_REFRESH_INTERVAL_MS: &str = "SENTINEL_REFRESH_INTERVAL_MS";
pub const ENV_HTTP_TIMEOUT_MS: &str = "SENTINEL_HTTP_TIMEOUT_MS";
pub const ENV_METRICS_SOURCE: &str = "SENTINEL_METRICS_SOURCE";
pub const ENV_METRICS_PATH: &str = "SENTINEL_METRICS_PATH";
pub const ENV_LOG_FILTER: &str = "SENTINEL_LOG_FILTER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsSourceKind {
    Synthetic,
    Http,
}

impl MetricsSourceKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "synthetic" | "mock" => Some(Self::Synthetic),
            "http" | "api" => Some(Self::Http),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub api_base_url: String,
    pub state_dir: PathBuf,
    pub refresh_period: Duration,
    pub http_timeout_ms: u64,
    pub metrics_source: MetricsSourceKind,
    pub metrics_path: String,
    pub log_filter: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {ENV_API_BASE_URL} value '{value}': {source}")]
    InvalidApiBaseUrl {
        value: String,
        source: AuthInputError,
    },
    #[error("invalid {key} value '{value}': expected a whole number of milliseconds")]
    InvalidMillis { key: &'static str, value: String },
    #[error("invalid {ENV_METRICS_SOURCE} value '{value}': expected 'synthetic' or 'http'")]
    InvalidMetricsSource { value: String },
    #[error("no data directory available; set {ENV_STATE_DIR}")]
    StateDirUnavailable,
}

impl CliConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_base_url_raw =
            read(ENV_API_BASE_URL).unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = normalize_base_url(&api_base_url_raw).map_err(|source| {
            ConfigError::InvalidApiBaseUrl {
                value: api_base_url_raw.clone(),
                source,
            }
        })?;

        let state_dir = match read(ENV_STATE_DIR) {
            Some(dir) => PathBuf::from(dir.trim()),
            None => dirs::data_dir()
                .map(|dir| dir.join(STATE_DIR_NAME))
                .ok_or(ConfigError::StateDirUnavailable)?,
        };

        let refresh_interval_ms = parse_millis(
            ENV_REFRESH_INTERVAL_MS,
            read(ENV_REFRESH_INTERVAL_MS),
            DEFAULT_REFRESH_INTERVAL_MS,
        )?
        .max(MIN_REFRESH_INTERVAL_MS);

        let http_timeout_ms = parse_millis(
            ENV_HTTP_TIMEOUT_MS,
            read(ENV_HTTP_TIMEOUT_MS),
            DEFAULT_HTTP_TIMEOUT_MS,
        )?;

        let metrics_source = match read(ENV_METRICS_SOURCE) {
            Some(value) => MetricsSourceKind::parse(&value)
                .ok_or(ConfigError::InvalidMetricsSource { value })?,
            None => MetricsSourceKind::Synthetic,
        };

        let metrics_path = read(ENV_METRICS_PATH)
            .map(|path| path.trim().to_string())
            .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string());

        let log_filter = read(ENV_LOG_FILTER).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            api_base_url,
            state_dir,
            refresh_period: Duration::from_millis(refresh_interval_ms),
            http_timeout_ms,
            metrics_source,
            metrics_path,
            log_filter,
        })
    }
}

fn parse_millis(key: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidMillis { key, value }),
        None => Ok(default),
    }
}
