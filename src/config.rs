//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `SHOPFLOOR_*` environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::FactoryApiConfig;
use crate::connection::ManagerConfig;
use crate::timerange::{Shift, ShiftSchedule};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default = "default_shifts")]
    pub shifts: Vec<ShiftConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telemetry source connection
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_connection_url")]
    pub url: String,

    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,

    /// 0 retries forever
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

fn default_connection_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_reconnect_initial() -> u64 {
    1000
}

fn default_reconnect_max() -> u64 {
    30_000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_connection_url(),
            reconnect_initial_ms: default_reconnect_initial(),
            reconnect_max_ms: default_reconnect_max(),
            max_reconnect_attempts: 0,
        }
    }
}

impl ConnectionConfig {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            reconnect_initial: Duration::from_millis(self.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms)),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Telemetry window sizing
///
/// `capacity` may only lower the window below its fixed size of 100.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_capacity")]
    pub capacity: usize,
}

fn default_window_capacity() -> usize {
    crate::window::DEFAULT_CAPACITY
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: default_window_capacity(),
        }
    }
}

impl WindowConfig {
    /// Validated capacity, between 1 and 100
    pub fn capacity(&self) -> Result<usize, ConfigError> {
        let max = crate::window::DEFAULT_CAPACITY;
        if (1..=max).contains(&self.capacity) {
            Ok(self.capacity)
        } else {
            Err(ConfigError::Invalid {
                field: "window.capacity".to_string(),
                error: format!("{} is outside 1..={}", self.capacity, max),
            })
        }
    }
}

/// OEE refresh cadence
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    300 // 5 minutes
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl OrchestratorConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Factory backend API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Bearer token of an already authenticated caller
    pub token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
            token: None,
        }
    }
}

impl ApiConfig {
    pub fn client_config(&self) -> FactoryApiConfig {
        FactoryApiConfig {
            base_url: self.base_url.clone(),
            request_timeout_ms: self.request_timeout_ms,
            token: self.token.clone().filter(|t| !t.is_empty()),
        }
    }
}

/// One named shift, wall-clock "HH:MM" bounds
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ShiftConfig {
    pub name: String,
    pub start: String,
    pub end: String,
}

fn default_shifts() -> Vec<ShiftConfig> {
    [("A", "06:00", "14:00"), ("B", "14:00", "22:00"), ("C", "22:00", "06:00")]
        .into_iter()
        .map(|(name, start, end)| ShiftConfig {
            name: name.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        })
        .collect()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
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
        let config_paths = [
            dirs::config_dir().map(|p| p.join("shopfloor").join("config.toml")),
            Some(PathBuf::from("/etc/shopfloor/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Shift schedule built from `[[shifts]]`
    pub fn shift_schedule(&self) -> Result<ShiftSchedule, ConfigError> {
        let shifts = self
            .shifts
            .iter()
            .map(|s| {
                Shift::new(s.name.clone(), &s.start, &s.end).map_err(|e| ConfigError::Invalid {
                    field: format!("shifts.{}", s.name),
                    error: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ShiftSchedule::new(shifts))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `SHOPFLOOR_*` overrides from a variable lookup
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Connection overrides
        if let Some(url) = lookup("SHOPFLOOR_CONNECTION_URL") {
            self.connection.url = url;
        }
        if let Some(attempts) = lookup("SHOPFLOOR_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.connection.max_reconnect_attempts = n;
            }
        }

        // Window overrides
        if let Some(capacity) = lookup("SHOPFLOOR_WINDOW_CAPACITY") {
            if let Ok(n) = capacity.parse() {
                self.window.capacity = n;
            }
        }

        // Orchestrator overrides
        if let Some(secs) = lookup("SHOPFLOOR_REFRESH_INTERVAL_SECS") {
            if let Ok(n) = secs.parse() {
                self.orchestrator.refresh_interval_secs = n;
            }
        }

        // API overrides
        if let Some(url) = lookup("SHOPFLOOR_API_URL") {
            self.api.base_url = url;
        }
        if let Some(token) = lookup("SHOPFLOOR_API_TOKEN") {
            self.api.token = Some(token);
        }

        // Logging overrides
        if let Some(level) = lookup("SHOPFLOOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SHOPFLOOR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            window: WindowConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            api: ApiConfig::default(),
            shifts: default_shifts(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {field}: {error}")]
    Invalid { field: String, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Shopfloor Configuration
#
# Environment variables override these settings:
# - SHOPFLOOR_CONNECTION_URL
# - SHOPFLOOR_MAX_RECONNECT_ATTEMPTS
# - SHOPFLOOR_WINDOW_CAPACITY
# - SHOPFLOOR_REFRESH_INTERVAL_SECS
# - SHOPFLOOR_API_URL
# - SHOPFLOOR_API_TOKEN
# - SHOPFLOOR_LOG_LEVEL
# - SHOPFLOOR_LOG_FORMAT

[connection]
# Telemetry source WebSocket URL
url = "ws://localhost:8000/ws"

# Reconnect backoff: doubles from initial up to max (ms)
reconnect_initial_ms = 1000
reconnect_max_ms = 30000

# Give up after this many failed attempts in a row (0 = never)
max_reconnect_attempts = 0

[window]
# Telemetry records kept per machine (1 to 100)
capacity = 100

[orchestrator]
# How often watched OEE figures are re-queried (seconds)
refresh_interval_secs = 300

[api]
# Factory backend base URL
base_url = "http://localhost:8000"

# Request timeout (ms)
request_timeout_ms = 5000

# Bearer token of an authenticated operator
# token = ""

# Shift calendar (informational; the "shift" range is always the last 8 hours)
[[shifts]]
name = "A"
start = "06:00"
end = "14:00"

[[shifts]]
name = "B"
start = "14:00"
end = "22:00"

[[shifts]]
name = "C"
start = "22:00"
end = "06:00"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
