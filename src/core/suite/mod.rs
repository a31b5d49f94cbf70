//! Register check suite
//!
//! Each check is plain data: what to read or write, and what the hand must
//! answer. [`catalogue`] lists the full suite; [`SuiteRunner`] executes it
//! against a live or simulated hand, one fresh connection per check.

mod catalogue;
mod runner;

pub use catalogue::catalogue;
pub use runner::{
    print_test_info, CheckResult, CheckStatus, StepResult, SuiteReport, SuiteRunner, SuiteSummary,
};

use crate::core::registers;
use serde::Serialize;
use std::fmt;

/// How a read value is shown in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Display {
    /// Plain decimal
    Raw,
    /// Packed `V{major}.{minor}.0`
    Version,
    /// Revision counter
    Revision,
    /// Four hex digits
    Hardware,
}

impl Display {
    /// Render a register value
    pub fn render(self, value: u16) -> String {
        match self {
            Display::Raw => value.to_string(),
            Display::Version => registers::format_full_version(value),
            Display::Revision => registers::format_revision(value),
            Display::Hardware => registers::format_hardware(value),
        }
    }
}

/// Expected outcome of one write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Expect {
    /// Read-back equals the written value
    Equal,
    /// Read-back equals a fixed value
    Reads(u16),
    /// Write is silently ignored: read-back differs from the written value
    Rejected,
    /// The hand answers the write with an exception
    WriteFails,
    /// The write is acknowledged (register is not readable)
    WriteSucceeds,
    /// Read-back is within the given distance of the written value
    Within(u16),
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Equal => write!(f, "read back equal"),
            Expect::Reads(v) => write!(f, "read back {}", v),
            Expect::Rejected => write!(f, "ignored"),
            Expect::WriteFails => write!(f, "write refused"),
            Expect::WriteSucceeds => write!(f, "write accepted"),
            Expect::Within(tol) => write!(f, "read back within {}", tol),
        }
    }
}

/// One value to write and its expected outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Case {
    /// Value written
    pub value: u16,
    /// Expected outcome
    pub expect: Expect,
}

impl Case {
    /// Shorthand constructor
    pub const fn new(value: u16, expect: Expect) -> Self {
        Self { value, expect }
    }
}

/// What a check does
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CheckKind {
    /// Read must succeed
    Read {
        /// First register
        register: u16,
        /// Number of registers
        count: u16,
        /// How to log the value
        display: Display,
        /// Value the firmware is expected to report, logged for comparison
        expected: Option<&'static str>,
    },
    /// Write each case and verify, then write `restore`
    WriteVerify {
        /// Register under test
        register: u16,
        /// Values and expectations, in order
        cases: Vec<Case>,
        /// Value written afterwards
        restore: u16,
    },
    /// Angle target: probe the finger's range, then verify against it
    AngleTarget {
        /// Register under test
        register: u16,
        /// Value written afterwards
        default: u16,
        /// The finger travels below zero, so 32768 reads back its most
        /// negative angle rather than the 65535 reading
        negative_range: bool,
    },
    /// Read several consecutive registers
    MultiRead {
        /// First register
        start: u16,
        /// Number of registers
        count: u16,
    },
    /// Write several consecutive registers in one request
    MultiWrite {
        /// First register
        start: u16,
        /// Values written
        values: Vec<u16>,
        /// Values written afterwards
        restore: Vec<u16>,
    },
    /// Change the node id, follow the hand through its reboot, change it back
    NodeId {
        /// Node ids to try
        candidates: Vec<u8>,
    },
}

impl CheckKind {
    /// Whether the check changes device state
    pub fn writes(&self) -> bool {
        !matches!(self, CheckKind::Read { .. } | CheckKind::MultiRead { .. })
    }
}

/// A single named check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    /// Unique identifier, e.g. `write_finger_p0`
    pub name: String,
    /// Banner text
    pub title: String,
    /// What to do
    pub kind: CheckKind,
    /// Reason the check is not run, if any
    pub skip: Option<String>,
}

impl Check {
    /// Build a check that runs
    pub fn new(name: impl Into<String>, title: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            kind,
            skip: None,
        }
    }

    /// Mark the check as skipped
    #[must_use]
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_render() {
        assert_eq!(Display::Version.render(0x0300), "V3.0.0");
        assert_eq!(Display::Revision.render(130), "V0.130");
        assert_eq!(Display::Hardware.render(0x1B01), "1B01");
        assert_eq!(Display::Raw.render(8000), "8000");
    }

    #[test]
    fn test_check_builder() {
        let check = Check::new("read_x", "read x", CheckKind::MultiRead { start: 1095, count: 6 })
            .skipped("not fitted");
        assert_eq!(check.skip.as_deref(), Some("not fitted"));
        assert!(!check.kind.writes());
    }
}
