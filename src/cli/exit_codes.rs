//! CLI Exit Codes
//!
//! Exit codes for CI jobs driving the harness.

use crate::config::ConfigError;
use crate::core::client::ClientError;
use crate::core::report::ReportError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const GENERAL_ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// No response in time
    pub const TIMEOUT: u8 = 4;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Protocol error or device exception
    pub const PROTOCOL_ERROR: u8 = 9;

    /// At least one check failed
    pub const CHECKS_FAILED: u8 = 10;

    /// Report could not be generated or served
    pub const REPORT_FAILED: u8 = 11;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Every code, in table order
    pub const ALL: [u8; 10] = [
        Self::SUCCESS,
        Self::GENERAL_ERROR,
        Self::INVALID_ARGS,
        Self::CONNECTION_FAILED,
        Self::TIMEOUT,
        Self::CONFIG_ERROR,
        Self::PROTOCOL_ERROR,
        Self::CHECKS_FAILED,
        Self::REPORT_FAILED,
        Self::PORT_NOT_FOUND,
    ];
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Success without output
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success that prints `msg`
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with exit code `code`
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Suite finished with `failed` failing checks
    pub fn checks_failed(failed: usize) -> Self {
        Self::Error(ExitCodes::CHECKS_FAILED, format!("{} checks failed", failed))
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        let code = match err {
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::Timeout(_) => ExitCodes::TIMEOUT,
            TransportError::ConnectionFailed(_)
            | TransportError::PermissionDenied(_)
            | TransportError::NotConnected => ExitCodes::CONNECTION_FAILED,
            TransportError::IoError(_) => ExitCodes::GENERAL_ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&ClientError> for CliResult {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::Transport(e) => Self::from(e),
            ClientError::Protocol(_) | ClientError::Exception { .. } => {
                Self::Error(ExitCodes::PROTOCOL_ERROR, err.to_string())
            }
        }
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<&ReportError> for CliResult {
    fn from(err: &ReportError) -> Self {
        Self::Error(ExitCodes::REPORT_FAILED, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Response timeout",
        8 => "Configuration error",
        9 => "Protocol error or device exception",
        10 => "One or more checks failed",
        11 => "Report generation failed",
        14 => "Port not found",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in ExitCodes::ALL {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
