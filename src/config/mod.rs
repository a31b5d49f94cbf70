//! Configuration module
//!
//! Handles harness settings loaded from TOML

mod settings;

pub use settings::{
    ConfigError, DeviceSettings, HarnessConfig, LoggingConfig, RebootSettings, ReportSettings,
    SerialSettings,
};

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "roh", "rohcheck")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default configuration file
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
