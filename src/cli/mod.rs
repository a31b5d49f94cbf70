//! CLI Module
//!
//! Exit codes and output formatting shared by the binary.

pub mod exit_codes;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};

use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

/// Render `value` as pretty JSON, or with `text` otherwise
pub fn format_output<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value),
        OutputFormat::Text => Ok(text(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_output() {
        let values = vec![1u16, 2];
        let json = format_output(OutputFormat::Json, &values, |_| String::new()).unwrap();
        assert!(json.contains('1'));
        let text = format_output(OutputFormat::Text, &values, |v| format!("{:?}", v)).unwrap();
        assert_eq!(text, "[1, 2]");
    }
}
