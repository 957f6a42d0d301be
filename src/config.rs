//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values fall back to the defaults
//! below, so an empty file describes a serial link on `/dev/rfcomm0` logging to
//! `Saved_Data/`.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{DataloggerError, Result};
use crate::protocol::command;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
    #[serde(default)]
    pub commands: CommandConfig,
}

/// Kind of device link
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Serial device (USB CDC, UART adapter, or bound RFCOMM TTY)
    Serial,
    /// TCP socket
    Tcp,
}

/// Device link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,

    /// Serial device path, or TCP host
    #[serde(default = "default_address")]
    pub address: String,

    /// TCP port (ignored for serial links)
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

/// Ingest pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

/// Session log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

/// Channel profile store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProfilesConfig {
    #[serde(default = "default_profiles_path")]
    pub path: String,
}

/// Device command literals
#[derive(Debug, Deserialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_auto_update_on")]
    pub auto_update_on: String,

    #[serde(default = "default_auto_update_off")]
    pub auto_update_off: String,
}

// Default value functions
fn default_transport_kind() -> TransportKind { TransportKind::Serial }
fn default_address() -> String { "/dev/rfcomm0".to_string() }
fn default_port() -> u16 { 1 }
fn default_baud_rate() -> u32 { 115_200 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_read_buffer_size() -> usize { 4096 }

fn default_max_line_bytes() -> usize { 4096 }
fn default_event_queue_capacity() -> usize { 1024 }

fn default_storage_enabled() -> bool { true }
fn default_log_dir() -> String { "Saved_Data".to_string() }

fn default_profiles_path() -> String { "configurations.json".to_string() }

fn default_auto_update_on() -> String { command::AUTO_UPDATE_ON.to_string() }
fn default_auto_update_off() -> String { command::AUTO_UPDATE_OFF.to_string() }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            address: default_address(),
            port: default_port(),
            baud_rate: default_baud_rate(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: default_max_line_bytes(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_storage_enabled(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            path: default_profiles_path(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            auto_update_on: default_auto_update_on(),
            auto_update_off: default_auto_update_off(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> DataloggerError {
    DataloggerError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensor_datalogger::config::Config;
    ///
    /// let config = Config::load("config/datalogger.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let transport = &self.transport;

        if transport.address.is_empty() {
            return Err(invalid("transport address cannot be empty"));
        }

        if transport.kind == TransportKind::Tcp && transport.port == 0 {
            return Err(invalid("transport port must be non-zero for tcp"));
        }

        if transport.kind == TransportKind::Serial && transport.baud_rate == 0 {
            return Err(invalid("baud_rate must be greater than 0"));
        }

        if transport.connect_timeout_ms == 0 || transport.connect_timeout_ms > 60000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 60000"));
        }

        if transport.read_buffer_size == 0 || transport.read_buffer_size > 65536 {
            return Err(invalid("read_buffer_size must be between 1 and 65536"));
        }

        if self.pipeline.max_line_bytes < 16 || self.pipeline.max_line_bytes > 1 << 20 {
            return Err(invalid("max_line_bytes must be between 16 and 1048576"));
        }

        if self.pipeline.event_queue_capacity == 0 {
            return Err(invalid("event_queue_capacity must be greater than 0"));
        }

        if self.storage.enabled && self.storage.log_dir.is_empty() {
            return Err(invalid("storage log_dir cannot be empty when enabled"));
        }

        if self.profiles.path.is_empty() {
            return Err(invalid("profiles path cannot be empty"));
        }

        for (name, value) in [
            ("auto_update_on", &self.commands.auto_update_on),
            ("auto_update_off", &self.commands.auto_update_off),
        ] {
            if !command::is_valid_command(value) {
                return Err(invalid(format!(
                    "{} must be non-empty single-line ASCII",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Connect timeout as a [`Duration`](std::time::Duration)
    #[must_use]
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.transport.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.transport.kind, TransportKind::Serial);
        assert_eq!(config.transport.address, "/dev/rfcomm0");
        assert_eq!(config.storage.log_dir, "Saved_Data");
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[transport]
kind = "tcp"
address = "192.168.4.1"
port = 3333

[pipeline]
max_line_bytes = 512

[storage]
log_dir = "/tmp/datalogger"

[commands]
auto_update_on = "START"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Tcp);
        assert_eq!(config.transport.port, 3333);
        assert_eq!(config.pipeline.max_line_bytes, 512);
        assert_eq!(config.commands.auto_update_on, "START");
        assert_eq!(config.commands.auto_update_off, "TOGGLE OFF AUTOUPDATE");
    }

    #[test]
    fn test_unknown_transport_kind() {
        assert!(Config::from_toml("[transport]\nkind = \"bluetooth\"").is_err());
    }

    #[test]
    fn test_empty_address() {
        let mut config = Config::default();
        config.transport.address = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tcp_port_zero() {
        let mut config = Config::default();
        config.transport.kind = TransportKind::Tcp;
        config.transport.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serial_ignores_port() {
        let mut config = Config::default();
        config.transport.port = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connect_timeout_bounds() {
        let mut config = Config::default();
        config.transport.connect_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.transport.connect_timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_buffer_size_zero() {
        let mut config = Config::default();
        config.transport.read_buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_line_bytes_bounds() {
        let mut config = Config::default();
        config.pipeline.max_line_bytes = 15;
        assert!(config.validate().is_err());
        config.pipeline.max_line_bytes = (1 << 20) + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_event_queue_capacity_zero() {
        let mut config = Config::default();
        config.pipeline.event_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.storage.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.storage.enabled = false;
        config.storage.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_command_literal() {
        let mut config = Config::default();
        config.commands.auto_update_off = "STOP\n".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_address(), "/dev/rfcomm0");
        assert_eq!(default_port(), 1);
        assert_eq!(default_baud_rate(), 115_200);
        assert_eq!(default_connect_timeout_ms(), 5000);
        assert_eq!(default_read_buffer_size(), 4096);
        assert_eq!(default_max_line_bytes(), 4096);
        assert_eq!(default_event_queue_capacity(), 1024);
        assert!(default_storage_enabled());
        assert_eq!(default_log_dir(), "Saved_Data");
        assert_eq!(default_profiles_path(), "configurations.json");
        assert_eq!(default_auto_update_on(), "TOGGLE ON AUTOUPDATE");
        assert_eq!(default_auto_update_off(), "TOGGLE OFF AUTOUPDATE");
    }
}
