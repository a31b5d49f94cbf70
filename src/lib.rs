//! # rohcheck core library
//!
//! Register validation for ROH robotic hands over Modbus RTU:
//! - Serial transport with a simulated hand for hardware-free runs
//! - Register client with device exception and sub-exception decoding
//! - Data-driven check catalogue with factory default restore
//! - Allure result files and report serving
//!
//! ## Example
//!
//! ```rust,no_run
//! use rohcheck_core::{catalogue, ClientOptions, SerialConfig, SuiteRunner, Transport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Transport::Serial(SerialConfig::new("COM3", 115200));
//!     let runner = SuiteRunner::new(transport, ClientOptions::default());
//!     let report = runner.run(&catalogue()).await;
//!     println!("{:?}", report.summary());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{ConfigError, HarnessConfig};
pub use crate::core::client::{ClientError, ClientOptions, RohClient};
pub use crate::core::report::{AllureWriter, ReportError, ReportTool};
pub use crate::core::simulator::{SharedHand, VirtualHand};
pub use crate::core::suite::{catalogue, Check, CheckResult, CheckStatus, SuiteReport, SuiteRunner};
pub use crate::core::transport::{SerialConfig, Transport, TransportError, TransportType};
pub use crate::utils::reboot::{wait_device_reboot, RebootWaitConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
