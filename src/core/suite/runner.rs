//! Sequential check execution

use super::{Case, Check, CheckKind, Display, Expect};
use crate::core::client::{ClientError, ClientOptions, RohClient};
use crate::core::registers::{register_name, FINGER_ANGLE_TARGET_MAX_LOSS, NODE_ID};
use crate::core::transport::Transport;
use crate::utils::reboot::{wait_device_reboot, RebootWaitConfig};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

const TEST_START: &str = "TEST START";

/// Outcome of a check or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// All expectations held
    Passed,
    /// An expectation did not hold, or the hand misbehaved
    Failed,
    /// Not run
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// One write/verify step of a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// What was done
    pub name: String,
    /// Outcome
    pub status: CheckStatus,
    /// Failure detail
    pub message: Option<String>,
    /// Start, milliseconds since the epoch
    pub start: i64,
    /// Stop, milliseconds since the epoch
    pub stop: i64,
}

impl StepResult {
    fn finish(name: String, start: i64, outcome: &Result<(), String>) -> Self {
        let (status, message) = match outcome {
            Ok(()) => (CheckStatus::Passed, None),
            Err(message) => (CheckStatus::Failed, Some(message.clone())),
        };
        Self {
            name,
            status,
            message,
            start,
            stop: now_millis(),
        }
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Check identifier
    pub name: String,
    /// Check title
    pub title: String,
    /// Outcome
    pub status: CheckStatus,
    /// Failure or skip reason
    pub message: Option<String>,
    /// Individual steps
    pub steps: Vec<StepResult>,
    /// Start, milliseconds since the epoch
    pub start: i64,
    /// Stop, milliseconds since the epoch
    pub stop: i64,
}

impl CheckResult {
    fn skipped(check: &Check, reason: &str) -> Self {
        let now = now_millis();
        Self {
            name: check.name.clone(),
            title: check.title.clone(),
            status: CheckStatus::Skipped,
            message: Some(reason.to_string()),
            steps: Vec::new(),
            start: now,
            stop: now,
        }
    }
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SuiteSummary {
    /// Checks selected
    pub total: usize,
    /// Checks passed
    pub passed: usize,
    /// Checks failed
    pub failed: usize,
    /// Checks skipped
    pub skipped: usize,
}

/// Results of a suite run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    /// One entry per selected check, in execution order
    pub results: Vec<CheckResult>,
}

impl SuiteReport {
    /// Counts per status
    pub fn summary(&self) -> SuiteSummary {
        let count = |status: CheckStatus| self.results.iter().filter(|r| r.status == status).count();
        SuiteSummary {
            total: self.results.len(),
            passed: count(CheckStatus::Passed),
            failed: count(CheckStatus::Failed),
            skipped: count(CheckStatus::Skipped),
        }
    }

    /// No check failed
    pub fn success(&self) -> bool {
        self.summary().failed == 0
    }

    /// Result of a check by name
    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Runs checks one after another, each on its own connection
pub struct SuiteRunner {
    transport: Transport,
    options: ClientOptions,
    reboot: RebootWaitConfig,
    filter: Option<Regex>,
}

impl SuiteRunner {
    /// Create a runner
    pub fn new(transport: Transport, options: ClientOptions) -> Self {
        Self {
            transport,
            options,
            reboot: RebootWaitConfig::default(),
            filter: None,
        }
    }

    /// Set the reboot wait used by node id checks
    #[must_use]
    pub fn with_reboot(mut self, reboot: RebootWaitConfig) -> Self {
        self.reboot = reboot;
        self
    }

    /// Only run checks whose name matches `pattern`
    pub fn with_filter(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.filter = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Checks the filter lets through
    pub fn selected<'a>(&self, checks: &'a [Check]) -> Vec<&'a Check> {
        checks
            .iter()
            .filter(|c| self.filter.as_ref().map_or(true, |re| re.is_match(&c.name)))
            .collect()
    }

    /// Run every selected check
    pub async fn run(&self, checks: &[Check]) -> SuiteReport {
        let selected = self.selected(checks);
        info!("running {} of {} checks on {}", selected.len(), checks.len(), self.transport.target());

        let mut report = SuiteReport::default();
        for check in selected {
            let result = self.run_check(check).await;
            info!("{} {}", result.status, result.name);
            report.results.push(result);
        }

        let summary = report.summary();
        info!(
            "{} passed, {} failed, {} skipped",
            summary.passed, summary.failed, summary.skipped
        );
        report
    }

    /// Run one check with a fresh connection
    pub async fn run_check(&self, check: &Check) -> CheckResult {
        if let Some(reason) = &check.skip {
            info!("skipping {}: {}", check.name, reason);
            return CheckResult::skipped(check, reason);
        }

        let mut client = match RohClient::setup(&self.transport, self.options.clone()).await {
            Ok(client) => client,
            Err(_) => {
                error!("Could not connect to modbus. Skipping tests.");
                return CheckResult::skipped(check, "could not connect to modbus");
            }
        };

        print_test_info(TEST_START, &check.title);
        let start = now_millis();
        let mut steps = Vec::new();
        let outcome = self.execute(&mut client, &check.kind, &mut steps).await;
        client.close().await;

        let (status, message) = match outcome {
            Ok(()) => (CheckStatus::Passed, None),
            Err(message) => {
                error!("{} failed: {}", check.name, message);
                (CheckStatus::Failed, Some(message))
            }
        };
        CheckResult {
            name: check.name.clone(),
            title: check.title.clone(),
            status,
            message,
            steps,
            start,
            stop: now_millis(),
        }
    }

    async fn execute(
        &self,
        client: &mut RohClient,
        kind: &CheckKind,
        steps: &mut Vec<StepResult>,
    ) -> Result<(), String> {
        match kind {
            CheckKind::Read {
                register,
                count,
                display,
                expected,
            } => read_check(client, *register, *count, *display, *expected).await,
            CheckKind::WriteVerify {
                register,
                cases,
                restore,
            } => {
                let outcome = verify_cases(client, *register, cases, steps).await;
                restore_default(client, *register, &[*restore]).await;
                outcome
            }
            CheckKind::AngleTarget {
                register,
                default,
                negative_range,
            } => {
                let outcome = match angle_target_cases(client, *register, *negative_range).await {
                    Ok(cases) => verify_cases(client, *register, &cases, steps).await,
                    Err(e) => Err(e),
                };
                restore_default(client, *register, &[*default]).await;
                outcome
            }
            CheckKind::MultiRead { start, count } => {
                let values = client
                    .read_registers(*start, *count)
                    .await
                    .map_err(|e| format!("reading {} registers from {} failed: {}", count, start, e))?;
                info!("read {} registers from <{}>: {:?}", count, start, values);
                Ok(())
            }
            CheckKind::MultiWrite {
                start,
                values,
                restore,
            } => {
                let outcome = multi_write(client, *start, values, steps).await;
                restore_default(client, *start, restore).await;
                outcome
            }
            CheckKind::NodeId { candidates } => self.node_id_check(client, candidates, steps).await,
        }
    }

    async fn node_id_check(
        &self,
        client: &mut RohClient,
        candidates: &[u8],
        steps: &mut Vec<StepResult>,
    ) -> Result<(), String> {
        let default_node = self.options.node_id;
        let mut current = default_node;
        let mut outcome = Ok(());

        for &candidate in candidates {
            let start = now_millis();
            info!("current node id = {}, node id to write = {}", current, candidate);
            let result = self.change_node_id(client, current, candidate).await;
            steps.push(StepResult::finish(
                format!("change node id {} -> {}", current, candidate),
                start,
                &result,
            ));
            if result.is_err() {
                outcome = result;
                break;
            }
            current = candidate;
        }

        if current != default_node {
            info!("restoring default node id {}", default_node);
            match self.change_node_id(client, current, default_node).await {
                Ok(()) => info!("default restored"),
                Err(e) => error!("restoring default failed: {}", e),
            }
        }
        outcome
    }

    /// Write a new node id on `from`, follow the reboot and read it back on `to`
    async fn change_node_id(&self, client: &mut RohClient, from: u8, to: u8) -> Result<(), String> {
        client
            .write_registers_to(from, NODE_ID, &[u16::from(to)])
            .await
            .map_err(|e| format!("writing node id {} failed: {}", to, e))?;
        client.close().await;

        *client = wait_device_reboot(&self.transport, &self.options, &self.reboot, to)
            .await
            .ok_or_else(|| format!("device did not come back on node {}", to))?;

        let value = client
            .read_registers_from(to, NODE_ID, 1)
            .await
            .map_err(|e| format!("reading node id on node {} failed: {}", to, e))?;
        match value.first() {
            Some(&v) if v == u16::from(to) => {
                info!("node id read back {} matches written {}", v, to);
                Ok(())
            }
            other => Err(format!("node id read back {:?}, expected {}", other, to)),
        }
    }
}

/// Log the check banner
pub fn print_test_info(status: &str, info: &str) {
    let start_message = format!(
        "###########################  {} <{}> ############################",
        status, info
    );
    let border = "-".repeat(start_message.chars().count());
    info!("{}", border);
    info!("{}", start_message);
    info!("{}", border);
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn read_check(
    client: &mut RohClient,
    register: u16,
    count: u16,
    display: Display,
    expected: Option<&str>,
) -> Result<(), String> {
    let values = client
        .read_registers(register, count)
        .await
        .map_err(|e| format!("reading register <{}> failed: {}", register_name(register), e))?;
    let shown = values.iter().map(|&v| display.render(v)).collect::<Vec<_>>().join(", ");
    info!("read register <{}> succeeded, value: {}", register_name(register), shown);

    // Identity mismatches are logged only
    if let Some(expected) = expected {
        if shown == expected {
            info!("<{}> matches {}", register_name(register), expected);
        } else {
            warn!("<{}> reads {}, expected {}", register_name(register), shown, expected);
        }
    }
    Ok(())
}

async fn read_one(client: &mut RohClient, register: u16) -> Result<u16, String> {
    client
        .read_registers(register, 1)
        .await
        .map_err(|e| format!("reading register {} failed: {}", register, e))?
        .first()
        .copied()
        .ok_or_else(|| format!("register {} returned no value", register))
}

async fn verify_cases(
    client: &mut RohClient,
    register: u16,
    cases: &[Case],
    steps: &mut Vec<StepResult>,
) -> Result<(), String> {
    for case in cases {
        let start = now_millis();
        let outcome = verify_case(client, register, *case).await;
        steps.push(StepResult::finish(
            format!("write {} to {}, expect {}", case.value, register, case.expect),
            start,
            &outcome,
        ));
        outcome?;
    }
    Ok(())
}

async fn verify_case(client: &mut RohClient, register: u16, case: Case) -> Result<(), String> {
    let value = case.value;
    let written = client.write_registers(register, &[value]).await;

    match case.expect {
        Expect::WriteFails => {
            return match written {
                Err(ClientError::Exception { .. }) => {
                    info!("out-of-range value {} was detected", value);
                    Ok(())
                }
                Err(e) => Err(format!("write of {} to {} failed without a device exception: {}", value, register, e)),
                Ok(()) => Err(format!("out-of-range value {} was not detected", value)),
            };
        }
        Expect::WriteSucceeds => {
            return match written {
                Ok(()) => {
                    info!("write register {} succeeded, value {}", register, value);
                    Ok(())
                }
                Err(e) => Err(format!("write register {} failed, value {}: {}", register, value, e)),
            };
        }
        _ => {}
    }

    // Read-back decides; some registers acknowledge and drop a value
    if let Err(e) = &written {
        warn!("write of {} to {} failed: {}", value, register, e);
    }
    let read = read_one(client, register).await?;

    let (held, expected) = match case.expect {
        Expect::Equal => (read == value, format!("{}", value)),
        Expect::Reads(expected) => (read == expected, format!("{}", expected)),
        Expect::Rejected => (read != value, format!("anything but {}", value)),
        Expect::Within(tolerance) => (
            (i32::from(read) - i32::from(value)).unsigned_abs() <= u32::from(tolerance),
            format!("{} +/- {}", value, tolerance),
        ),
        Expect::WriteFails | Expect::WriteSucceeds => (true, String::new()),
    };

    if held {
        info!("register {} read back {} for written {}, as expected", register, read, value);
        Ok(())
    } else if case.expect == Expect::Rejected {
        Err(format!("out-of-range value {} was not detected by register {}", value, register))
    } else {
        Err(format!(
            "register {} read back {} for written {}, expected {}",
            register, read, value, expected
        ))
    }
}

async fn restore_default(client: &mut RohClient, start: u16, values: &[u16]) {
    info!("restoring default");
    match client.write_registers(start, values).await {
        Ok(()) => info!("default restored"),
        Err(e) => error!("restoring default failed: {}", e),
    }
}

async fn multi_write(
    client: &mut RohClient,
    start: u16,
    values: &[u16],
    steps: &mut Vec<StepResult>,
) -> Result<(), String> {
    let begin = now_millis();
    let count = values.len();
    let outcome = match client.write_registers(start, values).await {
        Ok(()) => {
            info!("write {} registers from <{}> succeeded", count, start);
            let quantity = u16::try_from(count).unwrap_or(u16::MAX);
            match client.read_registers(start, quantity).await {
                Ok(read) if read == values => Ok(()),
                Ok(read) => Err(format!("registers from {} read back {:?}, expected {:?}", start, read, values)),
                Err(e) => Err(format!("reading back {} registers from {} failed: {}", count, start, e)),
            }
        }
        Err(e) => Err(format!("write {} registers from <{}> failed: {}", count, start, e)),
    };
    steps.push(StepResult::finish(
        format!("write {:?} from {}", values, start),
        begin,
        &outcome,
    ));
    outcome
}

/// Write `value` and read back where the firmware put it
///
/// A refused write leaves the probe at the written value.
async fn probe_angle(client: &mut RohClient, register: u16, value: u16, label: &str) -> Result<u16, String> {
    match client.write_registers(register, &[value]).await {
        Ok(()) => {
            let read = read_one(client, register).await?;
            info!("get {} angle: {} -> {}", label, register, read);
            Ok(read)
        }
        Err(_) => {
            info!("get {} angle: {} probe failed", label, register);
            Ok(value)
        }
    }
}

async fn angle_target_cases(client: &mut RohClient, register: u16, negative_range: bool) -> Result<Vec<Case>, String> {
    let min = probe_angle(client, register, 0, "min").await?;
    let max = probe_angle(client, register, 32767, "max").await?;
    let normal = (i32::from(min) + (i32::from(max) - i32::from(min)) / 2) as u16;
    let min_neg = probe_angle(client, register, 65535, "min negative").await?;
    let max_neg = probe_angle(client, register, 32768, "max negative").await?;

    let loss = Expect::Within(FINGER_ANGLE_TARGET_MAX_LOSS);
    // Without a negative range 32768 clamps to the same floor as 65535
    let most_negative = if negative_range { max_neg } else { min_neg };
    Ok(vec![
        Case::new(0, Expect::Reads(min)),
        Case::new(min, loss),
        Case::new(normal, loss),
        Case::new(max, loss),
        Case::new(32767, Expect::Reads(max)),
        Case::new(32768, Expect::Reads(most_negative)),
        Case::new(max_neg, loss),
        Case::new(min_neg, loss),
        Case::new(65535, Expect::Reads(min_neg)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registers::{expected, FingerBlock, FINGER_COUNT, FW_VERSION, SELF_TEST_LEVEL};
    use crate::core::simulator::{SharedHand, VirtualHand};
    use crate::core::suite::catalogue;
    use std::time::Duration;

    fn runner(hand: &SharedHand) -> SuiteRunner {
        SuiteRunner::new(
            Transport::Simulated(hand.clone()),
            ClientOptions {
                node_id: 2,
                settle_delay: Duration::ZERO,
                response_timeout: Duration::from_millis(30),
            },
        )
        .with_reboot(RebootWaitConfig {
            max_attempts: 5,
            delay: Duration::from_millis(1),
        })
    }

    fn write_check(register: u16, cases: Vec<Case>, restore: u16) -> Check {
        Check::new(
            "write_under_test",
            "write under test",
            CheckKind::WriteVerify {
                register,
                cases,
                restore,
            },
        )
    }

    #[tokio::test]
    async fn test_write_verify_passes_and_restores() {
        let hand = VirtualHand::default().shared();
        let check = write_check(
            SELF_TEST_LEVEL,
            vec![Case::new(0, Expect::Equal), Case::new(3, Expect::WriteFails)],
            1,
        );
        let result = runner(&hand).run_check(&check).await;
        assert_eq!(result.status, CheckStatus::Passed, "{:?}", result.message);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(hand.lock().get(SELF_TEST_LEVEL), 1);
    }

    #[tokio::test]
    async fn test_failed_expectation_still_restores() {
        let hand = VirtualHand::default().shared();
        let speed = FingerBlock::Speed.at(0);
        let check = write_check(
            speed,
            vec![Case::new(10, Expect::Rejected), Case::new(20, Expect::Equal)],
            65535,
        );
        let result = runner(&hand).run_check(&check).await;
        assert_eq!(result.status, CheckStatus::Failed);
        assert!(result.message.unwrap().contains("was not detected"));
        // Stops at the first failing case
        assert_eq!(result.steps.len(), 1);
        assert_eq!(hand.lock().get(speed), 65535);
    }

    #[tokio::test]
    async fn test_offline_hand_skips() {
        let hand = VirtualHand::default().shared();
        hand.lock().set_online(false);
        let check = write_check(SELF_TEST_LEVEL, vec![Case::new(0, Expect::Equal)], 1);
        let result = runner(&hand).run_check(&check).await;
        assert_eq!(result.status, CheckStatus::Skipped);
        assert_eq!(result.message.as_deref(), Some("could not connect to modbus"));
    }

    #[tokio::test]
    async fn test_skip_marker_does_not_connect() {
        let hand = VirtualHand::default().shared();
        let check = write_check(SELF_TEST_LEVEL, vec![], 1).skipped("not today");
        let result = runner(&hand).run_check(&check).await;
        assert_eq!(result.status, CheckStatus::Skipped);
        assert_eq!(hand.lock().stats().requests, 0);
    }

    fn angle_check(finger: u8, negative_range: bool) -> Check {
        Check::new(
            "write_angle",
            "write angle",
            CheckKind::AngleTarget {
                register: FingerBlock::AngleTarget.at(finger),
                default: 0,
                negative_range,
            },
        )
    }

    #[tokio::test]
    async fn test_angle_target_check() {
        let hand = VirtualHand::default().shared();
        for finger in 0..FINGER_COUNT {
            let result = runner(&hand).run_check(&angle_check(finger, finger == 0)).await;
            assert_eq!(result.status, CheckStatus::Passed, "finger {}: {:?}", finger, result.message);
            assert_eq!(result.steps.len(), 9);
        }
    }

    #[tokio::test]
    async fn test_angle_target_32768_reads_most_negative_on_thumb_bend() {
        let hand = VirtualHand::default().shared();
        let result = runner(&hand).run_check(&angle_check(0, false)).await;
        assert_eq!(result.status, CheckStatus::Failed);
        let failed = result.steps.last().unwrap();
        assert!(failed.name.contains("32768"), "{}", failed.name);
    }

    #[tokio::test]
    async fn test_identity_mismatch_is_logged_not_failed() {
        let hand = VirtualHand::default().shared();
        let check = Check::new(
            "read_fw_version",
            "read firmware version",
            CheckKind::Read {
                register: FW_VERSION,
                count: 1,
                display: Display::Version,
                expected: Some("V9.9.9"),
            },
        );
        let result = runner(&hand).run_check(&check).await;
        assert_eq!(result.status, CheckStatus::Passed);
        assert_eq!(Display::Version.render(hand.lock().get(FW_VERSION)), expected::FW_VERSION);
    }

    #[tokio::test]
    async fn test_node_id_change_and_restore() {
        let hand = VirtualHand::default().shared();
        hand.lock().set_reboot_cycles(1);
        let check = Check::new("write_node_id", "write node id", CheckKind::NodeId { candidates: vec![3] });
        let result = runner(&hand).run_check(&check).await;
        assert_eq!(result.status, CheckStatus::Passed, "{:?}", result.message);
        assert_eq!(hand.lock().node_id(), 2);
    }

    #[tokio::test]
    async fn test_filter_selects_by_name() {
        let hand = VirtualHand::default().shared();
        let runner = runner(&hand).with_filter("^read_finger_pos\\d$").unwrap();
        let checks = catalogue();
        let selected = runner.selected(&checks);
        assert_eq!(selected.len(), 6);

        let report = runner.run(&checks).await;
        assert_eq!(report.summary().passed, 6);
        assert!(report.success());
    }

    #[test]
    fn test_bad_filter_is_an_error() {
        let hand = VirtualHand::default().shared();
        assert!(runner(&hand).with_filter("(").is_err());
    }
}
