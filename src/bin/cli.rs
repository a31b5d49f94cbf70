//! rohcheck CLI - register validation harness for ROH hands
//!
//! Runs the check suite, writes allure results and serves the report.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rohcheck_core::cli::{format_output, print_exit_codes, CliResult, ExitCodes, OutputFormat};
use rohcheck_core::config::HarnessConfig;
use rohcheck_core::core::client::{ClientOptions, RohClient};
use rohcheck_core::core::registers::register_name;
use rohcheck_core::core::report::{open_browser, wait_for_interrupt, AllureWriter, ReportTool};
use rohcheck_core::core::simulator::VirtualHand;
use rohcheck_core::core::suite::{catalogue, SuiteReport, SuiteRunner};
use rohcheck_core::core::transport::{list_ports, Transport};
use rohcheck_core::utils::reboot::RebootWaitConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// rohcheck CLI
#[derive(Parser, Debug)]
#[command(
    name = "rohcheck",
    version,
    about = "Register validation harness for Modbus-RTU robotic hands",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port name (e.g., COM3, /dev/ttyUSB0)
    #[arg(short, long, env = "ROH_PORT", global = true)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, env = "ROH_BAUD", global = true)]
    baud: Option<u32>,

    /// Node id of the hand
    #[arg(short, long, env = "ROH_NODE_ID", global = true)]
    node_id: Option<u8>,

    /// Path of the allure executable
    #[arg(long, env = "ALLURE_PATH", global = true)]
    allure: Option<PathBuf>,

    /// Use the built-in virtual hand instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the check suite and write allure results
    Run {
        /// Only run checks whose name matches this regex
        #[arg(long)]
        filter: Option<String>,

        /// Results directory
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },

    /// Generate the report and serve it until Ctrl-C
    Report {
        /// Do not open a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Run the suite, then generate and serve the report
    All {
        /// Only run checks whose name matches this regex
        #[arg(long)]
        filter: Option<String>,

        /// Results directory
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Do not open a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Read holding registers
    Read {
        /// First register address (decimal or 0x hex)
        #[arg(value_parser = parse_u16)]
        address: u16,

        /// Number of registers
        #[arg(long, default_value = "1")]
        count: u16,
    },

    /// Write holding registers
    Write {
        /// First register address (decimal or 0x hex)
        #[arg(value_parser = parse_u16)]
        address: u16,

        /// Values to write
        #[arg(required = true, value_parser = parse_u16)]
        values: Vec<u16>,
    },

    /// List the checks in the suite
    ListChecks,

    /// List available serial ports
    ListPorts,

    /// Show the exit code table
    ExitCodes,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{}: {}", s, e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(result) => {
            eprintln!("{}", result.message().unwrap_or_default());
            return result.to_exit_code();
        }
    };

    let _guard = init_logging(&cli, &config);

    let result = match &cli.command {
        Commands::Run {
            filter,
            results_dir,
        } => run_suite(&cli, &config, filter.as_deref(), results_dir.as_ref()).await,
        Commands::Report { no_browser } => serve_report(&config, *no_browser).await,
        Commands::All {
            filter,
            results_dir,
            no_browser,
        } => run_all(&cli, &config, filter.as_deref(), results_dir.as_ref(), *no_browser).await,
        Commands::Read { address, count } => read_registers(&cli, &config, *address, *count).await,
        Commands::Write { address, values } => write_registers(&cli, &config, *address, values).await,
        Commands::ListChecks => list_checks(&cli),
        Commands::ListPorts => show_ports(&cli),
        Commands::ExitCodes => {
            print_exit_codes();
            CliResult::success()
        }
    };

    if let Some(message) = result.message() {
        if result.is_success() {
            if !cli.quiet {
                println!("{}", message);
            }
        } else {
            eprintln!("Error: {}", message);
        }
    }
    result.to_exit_code()
}

/// Config file with command line overrides applied
fn load_config(cli: &Cli) -> Result<HarnessConfig, CliResult> {
    let mut config = HarnessConfig::load(cli.config.as_deref()).map_err(|e| CliResult::from(&e))?;

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(node_id) = cli.node_id {
        config.device.node_id = node_id;
    }
    if let Some(allure) = &cli.allure {
        config.report.tool = allure.clone();
    }

    config.validate().map_err(|e| CliResult::from(&e))?;
    Ok(config)
}

fn init_logging(cli: &Cli, config: &HarnessConfig) -> Option<WorkerGuard> {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match &config.logging.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "rohcheck.log".into());
            let appender = tracing_appender::rolling::never(dir.unwrap_or_else(|| std::path::Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let init = if config.logging.json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).try_init()
    };
    if let Err(e) = init {
        eprintln!("Could not install logger: {}", e);
    }
    guard
}

fn transport(cli: &Cli, config: &HarnessConfig) -> Transport {
    if cli.simulate {
        Transport::Simulated(VirtualHand::new(config.device.node_id).shared())
    } else {
        Transport::Serial(config.serial.to_serial_config())
    }
}

/// Run the suite and write its results; the report is returned even when writing fails
async fn execute_suite(
    cli: &Cli,
    config: &HarnessConfig,
    filter: Option<&str>,
    results_dir: Option<&PathBuf>,
) -> Result<(SuiteReport, CliResult), CliResult> {
    let mut runner = SuiteRunner::new(transport(cli, config), ClientOptions::from_config(config))
        .with_reboot(RebootWaitConfig::from(&config.reboot));
    if let Some(pattern) = filter {
        runner = runner
            .with_filter(pattern)
            .map_err(|e| CliResult::error(ExitCodes::INVALID_ARGS, format!("Invalid filter: {}", e)))?;
    }

    let report = runner.run(&catalogue()).await;

    let dir = results_dir.cloned().unwrap_or_else(|| config.report.results_dir.clone());
    let written = match AllureWriter::new(dir).write_all(&report.results) {
        Ok(_) => CliResult::success(),
        Err(e) => {
            error!("Writing results failed: {}", e);
            CliResult::from(&e)
        }
    };
    Ok((report, written))
}

fn print_summary(cli: &Cli, report: &SuiteReport) {
    let summary = report.summary();
    let output = format_output(cli.format, report, |r| {
        let mut lines: Vec<String> = r
            .results
            .iter()
            .map(|c| match &c.message {
                Some(message) => format!("{:<8} {} ({})", c.status, c.name, message),
                None => format!("{:<8} {}", c.status, c.name),
            })
            .collect();
        lines.push(format!(
            "{} checks: {} passed, {} failed, {} skipped",
            summary.total, summary.passed, summary.failed, summary.skipped
        ));
        lines.join("\n")
    });
    match output {
        Ok(text) if !cli.quiet || cli.format == OutputFormat::Json => println!("{}", text),
        Ok(_) => {}
        Err(e) => eprintln!("Could not format results: {}", e),
    }
}

fn suite_outcome(report: &SuiteReport, written: CliResult) -> CliResult {
    let summary = report.summary();
    if summary.failed > 0 {
        CliResult::checks_failed(summary.failed)
    } else if !written.is_success() {
        written
    } else {
        CliResult::success()
    }
}

async fn run_suite(
    cli: &Cli,
    config: &HarnessConfig,
    filter: Option<&str>,
    results_dir: Option<&PathBuf>,
) -> CliResult {
    match execute_suite(cli, config, filter, results_dir).await {
        Ok((report, written)) => {
            print_summary(cli, &report);
            suite_outcome(&report, written)
        }
        Err(result) => result,
    }
}

async fn serve_report(config: &HarnessConfig, no_browser: bool) -> CliResult {
    let tool = ReportTool::new(&config.report);

    let mut outcome = CliResult::success();
    if let Err(e) = tool.generate().await {
        error!("Report generation failed: {}", e);
        outcome = CliResult::from(&e);
    }

    let mut server = match tool.serve().await {
        Ok(server) => server,
        Err(e) => return CliResult::from(&e),
    };

    if config.report.open_browser && !no_browser {
        if let Err(e) = open_browser(server.url()) {
            warn!("{}", e);
        }
    }

    println!("Report served at {}. Press Ctrl+C to stop.", server.url());
    if let Err(e) = wait_for_interrupt().await {
        error!("{}", e);
        outcome = CliResult::from(&e);
    }
    server.stop().await;
    outcome
}

async fn run_all(
    cli: &Cli,
    config: &HarnessConfig,
    filter: Option<&str>,
    results_dir: Option<&PathBuf>,
    no_browser: bool,
) -> CliResult {
    let mut config = config.clone();
    if let Some(dir) = results_dir {
        config.report.results_dir = dir.clone();
    }

    let suite = match execute_suite(cli, &config, filter, None).await {
        Ok((report, written)) => {
            print_summary(cli, &report);
            suite_outcome(&report, written)
        }
        Err(result) => result,
    };

    let served = serve_report(&config, no_browser).await;
    if suite.is_success() {
        served
    } else {
        suite
    }
}

fn client_options(config: &HarnessConfig) -> ClientOptions {
    ClientOptions::from_config(config)
}

async fn read_registers(cli: &Cli, config: &HarnessConfig, address: u16, count: u16) -> CliResult {
    let mut client = match RohClient::setup(&transport(cli, config), client_options(config)).await {
        Ok(client) => client,
        Err(e) => return CliResult::from(&e),
    };
    let result = client.read_registers(address, count).await;
    client.close().await;

    match result {
        Ok(values) => {
            let entries: Vec<serde_json::Value> = values
                .iter()
                .zip(address..)
                .map(|(value, addr)| {
                    serde_json::json!({ "address": addr, "name": register_name(addr), "value": value })
                })
                .collect();
            let printed = emit(cli, &entries, |_| {
                values
                    .iter()
                    .zip(address..)
                    .map(|(value, addr)| format!("{:>5}  {:<24} {}", addr, register_name(addr), value))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            general(printed)
        }
        Err(e) => CliResult::from(&e),
    }
}

async fn write_registers(cli: &Cli, config: &HarnessConfig, address: u16, values: &[u16]) -> CliResult {
    let mut client = match RohClient::setup(&transport(cli, config), client_options(config)).await {
        Ok(client) => client,
        Err(e) => return CliResult::from(&e),
    };
    let result = client.write_registers(address, values).await;
    client.close().await;

    match result {
        Ok(()) => CliResult::success_with_message(format!(
            "Wrote {} registers from {} ({})",
            values.len(),
            address,
            register_name(address)
        )),
        Err(e) => CliResult::from(&e),
    }
}

fn list_checks(cli: &Cli) -> CliResult {
    let checks = catalogue();
    let printed = emit(cli, &checks, |checks| {
        checks
            .iter()
            .map(|c| match &c.skip {
                Some(reason) => format!("{:<36} {} [skipped: {}]", c.name, c.title, reason),
                None => format!("{:<36} {}", c.name, c.title),
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
    general(printed)
}

/// Print `value` in the selected format
fn emit<T: Serialize>(cli: &Cli, value: &T, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    let output = format_output(cli.format, value, text).context("formatting output")?;
    println!("{}", output);
    Ok(())
}

fn general(result: anyhow::Result<()>) -> CliResult {
    match result {
        Ok(()) => CliResult::success(),
        Err(e) => CliResult::error(ExitCodes::GENERAL_ERROR, format!("{:#}", e)),
    }
}

fn show_ports(cli: &Cli) -> CliResult {
    let ports = match list_ports() {
        Ok(ports) => ports,
        Err(e) => return CliResult::from(&e),
    };

    if ports.is_empty() {
        return CliResult::success_with_message("No serial ports found.");
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            return general(emit(cli, &json, |_| String::new()));
        }
        OutputFormat::Text => {
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
    }
    CliResult::success()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u16() {
        assert_eq!(parse_u16("1005"), Ok(1005));
        assert_eq!(parse_u16("0x3ED"), Ok(1005));
        assert!(parse_u16("70000").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["rohcheck", "--simulate", "run", "--filter", "^read_"]).unwrap();
        assert!(cli.simulate);
        assert!(matches!(cli.command, Commands::Run { filter: Some(_), .. }));
    }

    #[test]
    fn test_write_needs_values() {
        assert!(Cli::try_parse_from(["rohcheck", "write", "1008"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "rohcheck",
            "--config",
            "/nonexistent/rohcheck.toml",
            "--port",
            "/dev/ttyUSB1",
            "--node-id",
            "7",
            "list-checks",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.device.node_id, 7);
    }
}
