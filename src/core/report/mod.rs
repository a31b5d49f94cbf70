//! Test report output
//!
//! Check results are written as allure result files. The external allure
//! tool turns them into a browsable report and serves it locally.

mod allure;
mod tool;

pub use allure::{AllureLabel, AllureResult, AllureStatusDetails, AllureStep, AllureWriter};
pub use tool::{open_browser, wait_for_interrupt, ReportServer, ReportTool};

use std::path::PathBuf;
use thiserror::Error;

/// Report errors
#[derive(Error, Debug)]
pub enum ReportError {
    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Result could not be encoded
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The report tool could not be started
    #[error("Could not start {tool}: {source}")]
    ToolNotFound {
        /// Tool path
        tool: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The report tool exited unsuccessfully
    #[error("{command} exited with {status}")]
    ToolFailed {
        /// Command line
        command: String,
        /// Exit status text
        status: String,
    },

    /// The report server did not start listening in time
    #[error("Report server did not start on port {port} after {attempts} attempts")]
    ServerTimeout {
        /// Port probed
        port: u16,
        /// Probes made
        attempts: u32,
    },

    /// The browser could not be opened
    #[error("Could not open browser: {0}")]
    Browser(String),

    /// Ctrl-C handler could not be installed
    #[error("Could not install Ctrl-C handler: {0}")]
    Signal(String),
}
