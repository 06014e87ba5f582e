//! Configuration module for the M-Bus Center bridge
//!
//! Loads configuration from a TOML file:
//! - [default] - General settings (log_level)
//! - [center] - M-Bus Center connection and polling settings
//! - [mqtt] - MQTT broker settings
//! - [[sensors]] - Meters to poll, as printed by `scan`

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::center::KnownSensor;

/// Log level for the application
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing LevelFilter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
    pub center: CenterConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub sensors: Vec<KnownSensor>,
}

/// General application settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DefaultConfig {
    /// Log level: TRACE, DEBUG, INFO, WARN, ERROR
    #[serde(default)]
    pub log_level: LogLevel,
}

/// M-Bus Center connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CenterConfig {
    /// IP address, `ip:port` or URL of the center (required)
    pub host: String,

    /// Topic segment and display name of the center
    #[serde(default = "default_center_name")]
    pub name: String,

    /// Poll interval (e.g., "60s", "5m")
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Timeout of a single HTTP request
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Highest sensor ID probed by `scan`
    #[serde(default = "default_scan_max_id")]
    pub scan_max_id: u32,
}

fn default_center_name() -> String {
    "emu_m_bus_center".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_scan_max_id() -> u32 {
    249
}

/// MQTT broker configuration
#[derive(Deserialize, Clone)]
pub struct MqttConfig {
    /// MQTT root topic (e.g., "emu")
    #[serde(default = "default_mqtt_root")]
    pub root: String,

    /// MQTT broker hostname
    pub host: String,

    /// MQTT broker port (default 1883)
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// MQTT username, empty for anonymous brokers
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

fn default_mqtt_root() -> String {
    "emu".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("root", &self.root)
            .finish()
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the config.toml file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or fails validation
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration logic (semantic validation beyond type checks)
    fn validate(&self) -> Result<(), ConfigError> {
        if self.center.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "center.host must not be empty".to_string(),
            ));
        }

        // Polls are aligned to whole seconds
        if self.center.interval < Duration::from_secs(1) {
            return Err(ConfigError::ValidationError(
                "center.interval must be at least 1s".to_string(),
            ));
        }

        if self.center.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "center.timeout must not be zero".to_string(),
            ));
        }

        if self.mqtt.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "mqtt.host must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.sensor_id) {
                return Err(ConfigError::ValidationError(format!(
                    "sensor_id {} is configured more than once",
                    sensor.sensor_id
                )));
            }
        }

        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
