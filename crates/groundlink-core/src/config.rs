//! Relay configuration
//!
//! Resolved once at startup: built-in defaults, then an optional JSON file,
//! then `TELEM_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::device::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};
use crate::hub::{BackpressurePolicy, DEFAULT_SUBSCRIBER_CAPACITY};
use crate::ingest::{IngestOptions, DEFAULT_RECONNECT_DELAY_MS};

/// Environment variable naming the serial port
pub const ENV_PORT: &str = "TELEM_PORT";
/// Environment variable holding the baud rate
pub const ENV_BAUD: &str = "TELEM_BAUD";
/// Per-read timeout in milliseconds
pub const ENV_READ_TIMEOUT_MS: &str = "TELEM_READ_TIMEOUT_MS";
/// Delay before reopening after a failure, in milliseconds
pub const ENV_RECONNECT_DELAY_MS: &str = "TELEM_RECONNECT_DELAY_MS";
/// Events buffered per subscriber
pub const ENV_SUBSCRIBER_CAPACITY: &str = "TELEM_SUBSCRIBER_CAPACITY";
/// `drop-oldest` or `disconnect`
pub const ENV_BACKPRESSURE: &str = "TELEM_BACKPRESSURE";
/// Retry a device that is missing at startup
pub const ENV_RETRY_OPEN: &str = "TELEM_RETRY_OPEN";
/// Run against the flight simulator
pub const ENV_DEMO: &str = "TELEM_DEMO";

/// Configuration errors
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Platform default serial port
pub fn default_port_name() -> String {
    if cfg!(windows) {
        "COM3".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

/// Everything the relay needs at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Pause before reopening the device after a failure
    pub reconnect_delay_ms: u64,
    /// Events buffered per subscriber
    pub subscriber_capacity: usize,
    /// What to do with a subscriber whose buffer is full
    pub backpressure: BackpressurePolicy,
    /// Retry when the device is missing at startup instead of exiting
    pub retry_initial_open: bool,
    /// Use the built-in flight simulator instead of a serial port
    pub demo: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port_name: default_port_name(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            backpressure: BackpressurePolicy::default(),
            retry_initial_open: false,
            demo: false,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by a JSON file, then by the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a JSON config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.normalize();
        Ok(config)
    }

    /// Defaults overridden through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Apply `TELEM_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get(ENV_PORT) {
            self.port_name = port.trim().to_string();
        }
        if let Some(baud) = get(ENV_BAUD) {
            // Matches the firmware tooling: a bad baud falls back rather than failing
            match baud.trim().parse::<u32>() {
                Ok(b) if b > 0 => self.baud_rate = b,
                _ => {
                    tracing::warn!(
                        "{}='{}' is not a valid baud rate, using {}",
                        ENV_BAUD,
                        baud,
                        DEFAULT_BAUD_RATE
                    );
                    self.baud_rate = DEFAULT_BAUD_RATE;
                }
            }
        }
        if let Some(v) = get(ENV_READ_TIMEOUT_MS) {
            self.read_timeout_ms = parse_value(ENV_READ_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = get(ENV_RECONNECT_DELAY_MS) {
            self.reconnect_delay_ms = parse_value(ENV_RECONNECT_DELAY_MS, &v)?;
        }
        if let Some(v) = get(ENV_SUBSCRIBER_CAPACITY) {
            self.subscriber_capacity = parse_value(ENV_SUBSCRIBER_CAPACITY, &v)?;
        }
        if let Some(v) = get(ENV_BACKPRESSURE) {
            self.backpressure = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_BACKPRESSURE,
                value: v.clone(),
            })?;
        }
        if let Some(v) = get(ENV_RETRY_OPEN) {
            self.retry_initial_open = parse_flag(ENV_RETRY_OPEN, &v)?;
        }
        if let Some(v) = get(ENV_DEMO) {
            self.demo = parse_flag(ENV_DEMO, &v)?;
        }

        self.normalize();
        Ok(())
    }

    fn normalize(&mut self) {
        if self.baud_rate == 0 {
            self.baud_rate = DEFAULT_BAUD_RATE;
        }
        if self.read_timeout_ms == 0 {
            self.read_timeout_ms = DEFAULT_READ_TIMEOUT_MS;
        }
        self.subscriber_capacity = self.subscriber_capacity.max(1);
    }

    /// Per-read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Loop retry options derived from this config
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            retry_initial_open: self.retry_initial_open,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
