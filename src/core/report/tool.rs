//! External report tool, local report server and browser

use super::ReportError;
use crate::config::ReportSettings;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Drives the allure command line tool
#[derive(Debug, Clone)]
pub struct ReportTool {
    tool: PathBuf,
    results_dir: PathBuf,
    report_dir: PathBuf,
    port: u16,
    startup_attempts: u32,
    startup_delay: Duration,
}

impl ReportTool {
    /// Tool configured from the report settings
    pub fn new(settings: &ReportSettings) -> Self {
        Self {
            tool: settings.tool.clone(),
            results_dir: settings.results_dir.clone(),
            report_dir: settings.report_dir.clone(),
            port: settings.port,
            startup_attempts: settings.startup_attempts,
            startup_delay: Duration::from_millis(settings.startup_delay_ms),
        }
    }

    /// Address the server listens on
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.tool);
        command.stdin(Stdio::null());
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> ReportError {
        ReportError::ToolNotFound {
            tool: self.tool.display().to_string(),
            source,
        }
    }

    /// `allure generate <results> -o <report> --clean`
    pub async fn generate(&self) -> Result<(), ReportError> {
        let line = format!(
            "{} generate {} -o {} --clean",
            self.tool.display(),
            self.results_dir.display(),
            self.report_dir.display()
        );
        info!("Generating report: {}", line);

        let status = self
            .command()
            .arg("generate")
            .arg(&self.results_dir)
            .arg("-o")
            .arg(&self.report_dir)
            .arg("--clean")
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if status.success() {
            info!("Report generated in {}", self.report_dir.display());
            Ok(())
        } else {
            Err(ReportError::ToolFailed {
                command: line,
                status: status.to_string(),
            })
        }
    }

    /// `allure serve <results> -p <port>`, returning once the port accepts connections
    pub async fn serve(&self) -> Result<ReportServer, ReportError> {
        info!("Starting report server on port {}", self.port);
        let child = self
            .command()
            .arg("serve")
            .arg(&self.results_dir)
            .arg("-p")
            .arg(self.port.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let mut server = ReportServer {
            child,
            url: self.url(),
        };

        for attempt in 0..self.startup_attempts {
            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                info!("Report server is up at {}", server.url);
                return Ok(server);
            }
            debug!("report server probe {} failed", attempt);
            tokio::time::sleep(self.startup_delay).await;
        }

        error!("Report server failed to start within {} attempts", self.startup_attempts);
        server.stop().await;
        Err(ReportError::ServerTimeout {
            port: self.port,
            attempts: self.startup_attempts,
        })
    }
}

/// Running report server process
#[derive(Debug)]
pub struct ReportServer {
    child: Child,
    url: String,
}

impl ReportServer {
    /// Address the server listens on
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Terminate the server process
    pub async fn stop(&mut self) {
        match self.child.kill().await {
            Ok(()) => info!("Report server stopped"),
            Err(e) => warn!("Stopping report server failed: {}", e),
        }
    }
}

/// Open `url` in the default browser
pub fn open_browser(url: &str) -> Result<(), ReportError> {
    info!("Opening {}", url);
    opener::open(url).map_err(|e| ReportError::Browser(e.to_string()))
}

/// Block until Ctrl-C is pressed
pub async fn wait_for_interrupt() -> Result<(), ReportError> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| ReportError::Signal(e.to_string()))?;

    rx.recv().await;
    info!("Interrupted");
    Ok(())
}
