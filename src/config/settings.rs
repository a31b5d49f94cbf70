//! Harness settings

use crate::core::registers::DEFAULT_NODE_ID;
use crate::core::transport::{SerialConfig, SerialFlowControl, SerialParity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config directory could not be determined
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("Config file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`HarnessConfig`]
    #[error("Invalid config file {path}: {source}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Serialising the config failed
    #[error("Could not serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("Invalid setting {key}: {reason}")]
    Invalid {
        /// Setting name
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Serial link
    pub serial: SerialSettings,
    /// Device addressing and timing
    pub device: DeviceSettings,
    /// Reboot wait after a node id change
    pub reboot: RebootSettings,
    /// Report generation and serving
    pub report: ReportSettings,
    /// Logging
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => super::config_file().ok_or(ConfigError::NoConfigDir)?,
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to `path`
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=247).contains(&self.device.node_id) {
            return Err(ConfigError::Invalid {
                key: "device.node_id",
                reason: format!("{} is outside 1..=247", self.device.node_id),
            });
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(ConfigError::Invalid {
                key: "serial.data_bits",
                reason: format!("{} is outside 5..=8", self.serial.data_bits),
            });
        }
        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(ConfigError::Invalid {
                key: "serial.stop_bits",
                reason: format!("{} is not 1 or 2", self.serial.stop_bits),
            });
        }
        if self.report.port == 0 {
            return Err(ConfigError::Invalid {
                key: "report.port",
                reason: "port 0 cannot be probed".to_string(),
            });
        }
        Ok(())
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits
    pub data_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Stop bits
    pub stop_bits: u8,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Time allowed for a complete response
    pub response_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "COM3".to_string(),
            baud_rate: 115_200,
            data_bits: 8,
            parity: SerialParity::None,
            stop_bits: 1,
            flow_control: SerialFlowControl::None,
            response_timeout_ms: 500,
        }
    }
}

impl SerialSettings {
    /// Transport configuration for these settings
    pub fn to_serial_config(&self) -> SerialConfig {
        let mut config = SerialConfig::new(&self.port, self.baud_rate)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(self.parity);
        config.flow_control = self.flow_control;
        config
    }

    /// Response timeout
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Node id of the hand
    pub node_id: u8,
    /// Pause after each exchange; the firmware needs it between requests
    pub settle_delay_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID,
            settle_delay_ms: 100,
        }
    }
}

impl DeviceSettings {
    /// Settle delay
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Reboot wait settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebootSettings {
    /// Reconnect attempts before giving up
    pub max_attempts: u32,
    /// Pause before each attempt
    pub delay_ms: u64,
}

impl Default for RebootSettings {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            delay_ms: 1000,
        }
    }
}

impl RebootSettings {
    /// Delay between attempts
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Report settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Directory for result files
    pub results_dir: PathBuf,
    /// Directory for the generated report
    pub report_dir: PathBuf,
    /// Report tool executable
    pub tool: PathBuf,
    /// Port the report server listens on
    pub port: u16,
    /// Startup probes before the server is declared dead
    pub startup_attempts: u32,
    /// Pause between startup probes
    pub startup_delay_ms: u64,
    /// Open a browser once the server is up
    pub open_browser: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("allure-results"),
            report_dir: PathBuf::from("allure-report"),
            tool: PathBuf::from("allure"),
            port: 8081,
            startup_attempts: 30,
            startup_delay_ms: 1000,
            open_browser: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bench_setup() {
        let config = HarnessConfig::default();
        assert_eq!(config.serial.port, "COM3");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.device.node_id, 2);
        assert_eq!(config.device.settle_delay(), Duration::from_millis(100));
        assert_eq!(config.reboot.max_attempts, 60);
        assert_eq!(config.report.port, 8081);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: HarnessConfig = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyUSB0"
            parity = "even"

            [device]
            node_id = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.parity, SerialParity::Even);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.device.node_id, 7);
        assert_eq!(config.device.settle_delay_ms, 100);
    }

    #[test]
    fn test_invalid_node_id() {
        let mut config = HarnessConfig::default();
        config.device.node_id = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "device.node_id", .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = HarnessConfig::default();
        config.report.port = 9090;
        config.save(&path).unwrap();
        assert_eq!(HarnessConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }
}
