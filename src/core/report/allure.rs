//! Allure result files

use super::ReportError;
use crate::core::suite::{CheckResult, CheckStatus, StepResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const RESULT_SUFFIX: &str = "-result.json";
const SUITE_NAME: &str = "rohcheck";
const STAGE_FINISHED: &str = "finished";

/// `statusDetails` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllureStatusDetails {
    /// Failure or skip reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `labels` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllureLabel {
    /// Label name
    pub name: String,
    /// Label value
    pub value: String,
}

impl AllureLabel {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// `steps` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllureStep {
    /// Step title
    pub name: String,
    /// passed, failed or skipped
    pub status: String,
    /// Failure detail
    pub status_details: AllureStatusDetails,
    /// Always `finished`
    pub stage: String,
    /// Start, milliseconds since the epoch
    pub start: i64,
    /// Stop, milliseconds since the epoch
    pub stop: i64,
}

/// One `<uuid>-result.json` document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllureResult {
    /// File identity
    pub uuid: String,
    /// Stable per check, links runs together in the report history
    pub history_id: String,
    /// Display name
    pub name: String,
    /// Qualified name
    pub full_name: String,
    /// passed, failed or skipped
    pub status: String,
    /// Failure or skip detail
    pub status_details: AllureStatusDetails,
    /// Always `finished`
    pub stage: String,
    /// Start, milliseconds since the epoch
    pub start: i64,
    /// Stop, milliseconds since the epoch
    pub stop: i64,
    /// Suite and framework labels
    pub labels: Vec<AllureLabel>,
    /// Write/verify steps
    pub steps: Vec<AllureStep>,
}

fn status_text(status: CheckStatus) -> String {
    match status {
        CheckStatus::Passed => "passed",
        CheckStatus::Failed => "failed",
        CheckStatus::Skipped => "skipped",
    }
    .to_string()
}

impl From<&StepResult> for AllureStep {
    fn from(step: &StepResult) -> Self {
        Self {
            name: step.name.clone(),
            status: status_text(step.status),
            status_details: AllureStatusDetails {
                message: step.message.clone(),
            },
            stage: STAGE_FINISHED.to_string(),
            start: step.start,
            stop: step.stop,
        }
    }
}

impl From<&CheckResult> for AllureResult {
    fn from(result: &CheckResult) -> Self {
        let full_name = format!("{}.{}", SUITE_NAME, result.name);
        Self {
            uuid: Uuid::new_v4().to_string(),
            history_id: hex::encode(full_name.as_bytes()),
            name: result.title.clone(),
            full_name,
            status: status_text(result.status),
            status_details: AllureStatusDetails {
                message: result.message.clone(),
            },
            stage: STAGE_FINISHED.to_string(),
            start: result.start,
            stop: result.stop,
            labels: vec![
                AllureLabel::new("suite", SUITE_NAME),
                AllureLabel::new("testMethod", result.name.clone()),
                AllureLabel::new("framework", SUITE_NAME),
                AllureLabel::new("language", "rust"),
            ],
            steps: result.steps.iter().map(AllureStep::from).collect(),
        }
    }
}

/// Writes check results into an allure results directory
#[derive(Debug, Clone)]
pub struct AllureWriter {
    dir: PathBuf,
}

impl AllureWriter {
    /// Writer for `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Results directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and remove result files from earlier runs
    pub fn prepare(&self) -> Result<usize, ReportError> {
        fs::create_dir_all(&self.dir).map_err(|source| self.io_error(&self.dir, source))?;

        let mut removed = 0;
        let entries = fs::read_dir(&self.dir).map_err(|source| self.io_error(&self.dir, source))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let stale = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(RESULT_SUFFIX));
            if stale {
                fs::remove_file(&path).map_err(|source| self.io_error(&path, source))?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("removed {} stale result files from {}", removed, self.dir.display());
        }
        Ok(removed)
    }

    /// Write one result; returns the file written
    pub fn write(&self, result: &CheckResult) -> Result<PathBuf, ReportError> {
        let document = AllureResult::from(result);
        let path = self.dir.join(format!("{}{}", document.uuid, RESULT_SUFFIX));
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&path, json).map_err(|source| self.io_error(&path, source))?;
        Ok(path)
    }

    /// Clean the directory and write every result
    pub fn write_all(&self, results: &[CheckResult]) -> Result<Vec<PathBuf>, ReportError> {
        self.prepare()?;
        let paths = results
            .iter()
            .map(|r| self.write(r))
            .collect::<Result<Vec<_>, _>>()?;
        info!("wrote {} results to {}", paths.len(), self.dir.display());
        Ok(paths)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> ReportError {
        ReportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(status: CheckStatus) -> CheckResult {
        CheckResult {
            name: "write_finger_p0".to_string(),
            title: "write finger P0".to_string(),
            status,
            message: (status != CheckStatus::Passed).then(|| "out-of-range value 99 was not detected".to_string()),
            steps: vec![StepResult {
                name: "write 99 to 1045, expect ignored".to_string(),
                status,
                message: None,
                start: 10,
                stop: 20,
            }],
            start: 5,
            stop: 25,
        }
    }

    #[test]
    fn test_result_document() {
        let doc = AllureResult::from(&sample(CheckStatus::Failed));
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["stage"], "finished");
        assert_eq!(value["fullName"], "rohcheck.write_finger_p0");
        assert_eq!(value["statusDetails"]["message"], "out-of-range value 99 was not detected");
        assert_eq!(value["steps"][0]["status"], "failed");
        assert_eq!(value["start"], 5);
        assert!(value.get("historyId").is_some());
    }

    #[test]
    fn test_history_id_is_stable() {
        let a = AllureResult::from(&sample(CheckStatus::Passed));
        let b = AllureResult::from(&sample(CheckStatus::Failed));
        assert_eq!(a.history_id, b.history_id);
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_prepare_removes_only_results() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old-result.json"), "{}").unwrap();
        fs::write(dir.path().join("environment.properties"), "").unwrap();

        let writer = AllureWriter::new(dir.path());
        assert_eq!(writer.prepare().unwrap(), 1);
        assert!(dir.path().join("environment.properties").exists());
    }

    #[test]
    fn test_write_all() {
        let dir = TempDir::new().unwrap();
        let writer = AllureWriter::new(dir.path().join("allure-results"));
        let paths = writer
            .write_all(&[sample(CheckStatus::Passed), sample(CheckStatus::Skipped)])
            .unwrap();
        assert_eq!(paths.len(), 2);
        for path in paths {
            let text = fs::read_to_string(&path).unwrap();
            let doc: AllureResult = serde_json::from_str(&text).unwrap();
            assert!(path.to_string_lossy().ends_with(&format!("{}-result.json", doc.uuid)));
        }
    }
}
