use crate::estimation::{DEFAULT_REQUEST_TIMEOUT, PipelineSettings};
use crate::service::{DEFAULT_TICK_INTERVAL, DEFAULT_WEATHER_INTERVAL, ServiceSettings};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use time::UtcOffset;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const CONFIG_PATH_ENV: &str = "PARKFLOW_CONFIG";
pub const API_KEY_ENV: &str = "PARKFLOW_SOURCE_API_KEY";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_FETCH_INTERVAL_SECS: u64 = 60;
pub const MIN_FETCH_INTERVAL_SECS: u64 = 5;
pub const MAX_FETCH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_UTC_OFFSET_HOURS: i8 = -5;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    pub source: SourceSection,
    #[serde(default)]
    pub refresh: Option<RefreshSection>,
    #[serde(default)]
    pub estimation: Option<EstimationSection>,
    #[serde(default)]
    pub weather: Option<EndpointSection>,
    #[serde(default)]
    pub geocode: Option<EndpointSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceSection {
    /// `api` reads the REST endpoint, `mock` serves fixture rows (default: api)
    #[serde(default)]
    pub mode: SourceMode,
    /// REST endpoint returning the lot rows as a JSON array (required in api mode)
    #[serde(default)]
    pub url: String,
    pub api_key: Option<String>,
    /// JSON file of rows for mock mode; built-in demo lots when unset
    pub fixture_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Api,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshSection {
    /// Seconds between fetches, clamped to 5..=60 (default: 60)
    pub fetch_interval_secs: Option<u64>,
    /// Seconds between heuristic re-estimates (default: 15)
    pub tick_interval_secs: Option<u64>,
    /// Timeout for every upstream request (default: 10)
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EstimationSection {
    /// Fixed offset used for peak hours and weekdays (default: -5)
    pub utc_offset_hours: Option<i8>,
    /// Apply the congestion adjustment to heuristic lots (default: true)
    pub congestion_adjustment: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointSection {
    pub url: Option<String>,
    /// Only read for [weather] (default: 600)
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Path from `PARKFLOW_CONFIG`, else the default path.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_default() -> Result<Config, ConfigError> {
    let mut config = load_from_path(config_path())?;
    if let Ok(key) = std::env::var(API_KEY_ENV)
        && !key.trim().is_empty()
    {
        config.source.api_key = Some(key);
    }
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.source.mode == SourceMode::Api && self.source.url.trim().is_empty() {
            return Err(ConfigError::Invalid("source.url must not be empty".to_string()));
        }
        if UtcOffset::from_hms(self.utc_offset_hours(), 0, 0).is_err() {
            return Err(ConfigError::Invalid(format!(
                "estimation.utc_offset_hours out of range: {}",
                self.utc_offset_hours()
            )));
        }
        Ok(())
    }

    pub fn source_mode(&self) -> SourceMode {
        self.source.mode
    }

    pub fn fixture_path(&self) -> Option<&Path> {
        self.source
            .fixture_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn source_api_key(&self) -> Option<&str> {
        non_empty(self.source.api_key.as_ref())
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Returns the fetch interval, clamped to 5..=60 seconds
    pub fn fetch_interval(&self) -> Duration {
        let secs = self
            .refresh
            .as_ref()
            .and_then(|r| r.fetch_interval_secs)
            .unwrap_or(DEFAULT_FETCH_INTERVAL_SECS)
            .clamp(MIN_FETCH_INTERVAL_SECS, MAX_FETCH_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn tick_interval(&self) -> Duration {
        self.refresh
            .as_ref()
            .and_then(|r| r.tick_interval_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TICK_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        self.refresh
            .as_ref()
            .and_then(|r| r.request_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn utc_offset_hours(&self) -> i8 {
        self.estimation
            .as_ref()
            .and_then(|e| e.utc_offset_hours)
            .unwrap_or(DEFAULT_UTC_OFFSET_HOURS)
    }

    pub fn utc_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.utc_offset_hours(), 0, 0).unwrap_or(UtcOffset::UTC)
    }

    pub fn congestion_adjustment(&self) -> bool {
        self.estimation
            .as_ref()
            .and_then(|e| e.congestion_adjustment)
            .unwrap_or(true)
    }

    pub fn weather_url(&self) -> Option<&str> {
        non_empty(self.weather.as_ref()?.url.as_ref())
    }

    pub fn weather_interval(&self) -> Duration {
        self.weather
            .as_ref()
            .and_then(|w| w.interval_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WEATHER_INTERVAL)
    }

    pub fn geocode_url(&self) -> Option<&str> {
        non_empty(self.geocode.as_ref()?.url.as_ref())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            utc_offset: self.utc_offset(),
            congestion_adjustment: self.congestion_adjustment(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            fetch_interval: self.fetch_interval(),
            tick_interval: self.tick_interval(),
            weather_interval: self.weather_interval(),
            pipeline: self.pipeline_settings(),
        }
    }
}
