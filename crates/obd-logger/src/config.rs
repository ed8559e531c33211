//! Logger configuration
//!
//! Sources in increasing priority: defaults, the TOML file, `OBD_LOGGER_*`
//! environment variables (`__` between nested keys, e.g.
//! `OBD_LOGGER_ADAPTER__BAUD_RATE=115200`), then command-line flags.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use obd_protocol::{ObdProtocol, DEFAULT_BAUD_RATE, DEFAULT_RESPONSE_TIMEOUT_MS};
use obd_session::{CommandSchedule, ScheduleConfig, ScheduleError, SessionConfig, DEFAULT_PIPE_CAPACITY};
use serde::{Deserialize, Serialize};
use storage::RecordingConfig;

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "obd-logger.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "OBD_LOGGER";

/// Device name that selects port discovery
pub const AUTO_DEVICE: &str = "auto";

/// Device name that selects the built-in emulator
pub const MOCK_DEVICE: &str = "mock";

/// Complete logger configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub adapter: AdapterConfig,
    pub schedule: ScheduleConfig,
    pub recording: RecordingConfig,
    pub logging: LoggingConfig,
    pub status: StatusConfig,
}

/// Serial adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Port name, `auto` or `mock`
    pub device: String,
    pub baud_rate: u32,
    pub protocol: ObdProtocol,
    /// Time allowed for one adapter response (milliseconds)
    pub response_timeout_ms: u64,
    /// Bytes buffered between the driver thread and the consumer
    pub pipe_capacity: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            device: AUTO_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            protocol: ObdProtocol::default(),
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `obd_session=debug`
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Live status report settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Interval between status lines (milliseconds)
    pub interval_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl AppConfig {
    /// Load from `path` (required) or the default file (optional), then the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Session settings for the adapter
    pub fn session_config(&self) -> Result<SessionConfig, ScheduleError> {
        Ok(SessionConfig {
            pipe_capacity: self.adapter.pipe_capacity,
            protocol: self.adapter.protocol,
            schedule: CommandSchedule::from_config(&self.schedule)?,
            response_timeout: Duration::from_millis(self.adapter.response_timeout_ms),
        })
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status.interval_ms.max(1))
    }
}
