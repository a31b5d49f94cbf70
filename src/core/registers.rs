//! ROH holding register map
//!
//! Addresses, access modes and factory defaults as defined by the hand's
//! firmware. Per-finger registers come in blocks of ten consecutive
//! addresses; only the first six are populated on the five-finger hand
//! (thumb bend, index, middle, ring, little, thumb rotation).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Register protocol version (R)
pub const PROTOCOL_VERSION: u16 = 1000;
/// Firmware version (R)
pub const FW_VERSION: u16 = 1001;
/// Firmware revision counter (R)
pub const FW_REVISION: u16 = 1002;
/// Hardware version (R)
pub const HW_VERSION: u16 = 1003;
/// Boot loader version (R)
pub const BOOT_VERSION: u16 = 1004;
/// Modbus node id; a write reboots the hand (RW)
pub const NODE_ID: u16 = 1005;
/// Cause of the last device failure exception (R)
pub const SUB_EXCEPTION: u16 = 1006;
/// Battery voltage in mV (R)
pub const BATTERY_VOLTAGE: u16 = 1007;
/// Power-on self test level (RW)
pub const SELF_TEST_LEVEL: u16 = 1008;
/// Beeper on/off (RW)
pub const BEEP_SWITCH: u16 = 1009;
/// Beep once for this many ms (W)
pub const BEEP_PERIOD: u16 = 1010;
/// Button press counter (RW)
pub const BUTTON_PRESS_CNT: u16 = 1011;
/// Start recalibration (W)
pub const RECALIBRATE: u16 = 1012;
/// Start initialisation (W)
pub const START_INIT: u16 = 1013;
/// Reset the hand (W)
pub const RESET: u16 = 1014;
/// Power off (W)
pub const POWER_OFF: u16 = 1015;
/// First reserved register
pub const RESERVED0: u16 = 1016;
/// First thumb calibration position
pub const CALI_THUMB_POS0: u16 = 1040;

/// First register of the map
pub const FIRST_ADDRESS: u16 = PROTOCOL_VERSION;
/// Last register of the map
pub const LAST_ADDRESS: u16 = 1184;

/// Number of actuated degrees of freedom
pub const FINGER_COUNT: u8 = 6;
/// Index of the thumb rotation axis
pub const THUMB_ROTATION: u8 = 5;

/// Largest read-back deviation accepted for position targets
pub const FINGER_POS_TARGET_MAX_LOSS: u16 = 32;
/// Largest read-back deviation accepted for angle targets
pub const FINGER_ANGLE_TARGET_MAX_LOSS: u16 = 5;

/// Default node id of a factory-fresh hand
pub const DEFAULT_NODE_ID: u8 = 2;

/// Register access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Read only
    Read,
    /// Write only
    Write,
    /// Read and write
    ReadWrite,
}

impl Access {
    /// Whether holding-register reads are allowed
    pub fn readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    /// Whether writes are allowed
    pub fn writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "R"),
            Self::Write => write!(f, "W"),
            Self::ReadWrite => write!(f, "R/W"),
        }
    }
}

/// Blocks of ten per-finger registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerBlock {
    /// Calibration end positions, 1020
    CaliEnd,
    /// Calibration start positions, 1030
    CaliStart,
    /// PID proportional gain, 1045
    P,
    /// PID integral gain, 1055
    I,
    /// PID derivative gain, 1065
    D,
    /// PID overall gain, 1075
    G,
    /// Finger status (R), 1085
    Status,
    /// Motor current limit, 1095
    CurrentLimit,
    /// Motor current (R), 1105
    Current,
    /// Force target, 1115
    ForceTarget,
    /// Speed, 1125
    Speed,
    /// Position target, 1135
    PosTarget,
    /// Position (R), 1145
    Pos,
    /// Angle target, 1155
    AngleTarget,
    /// Angle (R), 1165
    Angle,
    /// Measured force (R), 1175
    Force,
}

impl FingerBlock {
    /// All blocks in address order
    pub fn all() -> &'static [FingerBlock] {
        &[
            FingerBlock::CaliEnd,
            FingerBlock::CaliStart,
            FingerBlock::P,
            FingerBlock::I,
            FingerBlock::D,
            FingerBlock::G,
            FingerBlock::Status,
            FingerBlock::CurrentLimit,
            FingerBlock::Current,
            FingerBlock::ForceTarget,
            FingerBlock::Speed,
            FingerBlock::PosTarget,
            FingerBlock::Pos,
            FingerBlock::AngleTarget,
            FingerBlock::Angle,
            FingerBlock::Force,
        ]
    }

    /// Address of index 0 of the block
    pub const fn base(self) -> u16 {
        match self {
            FingerBlock::CaliEnd => 1020,
            FingerBlock::CaliStart => 1030,
            FingerBlock::P => 1045,
            FingerBlock::I => 1055,
            FingerBlock::D => 1065,
            FingerBlock::G => 1075,
            FingerBlock::Status => 1085,
            FingerBlock::CurrentLimit => 1095,
            FingerBlock::Current => 1105,
            FingerBlock::ForceTarget => 1115,
            FingerBlock::Speed => 1125,
            FingerBlock::PosTarget => 1135,
            FingerBlock::Pos => 1145,
            FingerBlock::AngleTarget => 1155,
            FingerBlock::Angle => 1165,
            FingerBlock::Force => 1175,
        }
    }

    /// Address for a finger index
    pub const fn at(self, finger: u8) -> u16 {
        self.base() + finger as u16
    }

    /// Snake-case name used in check names
    pub fn key(self) -> &'static str {
        match self {
            FingerBlock::CaliEnd => "cali_end",
            FingerBlock::CaliStart => "cali_start",
            FingerBlock::P => "p",
            FingerBlock::I => "i",
            FingerBlock::D => "d",
            FingerBlock::G => "g",
            FingerBlock::Status => "status",
            FingerBlock::CurrentLimit => "current_limit",
            FingerBlock::Current => "current",
            FingerBlock::ForceTarget => "force_target",
            FingerBlock::Speed => "speed",
            FingerBlock::PosTarget => "pos_target",
            FingerBlock::Pos => "pos",
            FingerBlock::AngleTarget => "angle_target",
            FingerBlock::Angle => "angle",
            FingerBlock::Force => "force",
        }
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            FingerBlock::CaliEnd => "calibration end",
            FingerBlock::CaliStart => "calibration start",
            FingerBlock::P => "P",
            FingerBlock::I => "I",
            FingerBlock::D => "D",
            FingerBlock::G => "G",
            FingerBlock::Status => "status",
            FingerBlock::CurrentLimit => "current limit",
            FingerBlock::Current => "current",
            FingerBlock::ForceTarget => "force target",
            FingerBlock::Speed => "speed",
            FingerBlock::PosTarget => "pos target",
            FingerBlock::Pos => "pos",
            FingerBlock::AngleTarget => "angle target",
            FingerBlock::Angle => "angle",
            FingerBlock::Force => "force",
        }
    }

    /// Access mode of the given index within the block
    pub fn access(self, index: u8) -> Access {
        match self {
            FingerBlock::Status
            | FingerBlock::Current
            | FingerBlock::Pos
            | FingerBlock::Angle
            | FingerBlock::Force => Access::Read,
            // Only the first five force targets are writable
            FingerBlock::ForceTarget if index >= 5 => Access::Read,
            _ => Access::ReadWrite,
        }
    }

    /// Block and index containing `address`
    pub fn locate(address: u16) -> Option<(FingerBlock, u8)> {
        Self::all().iter().find_map(|&block| {
            let base = block.base();
            (address >= base && address < base + 10).then(|| (block, (address - base) as u8))
        })
    }
}

/// Name of a finger index
pub fn finger_name(finger: u8) -> &'static str {
    match finger {
        0 => "thumb bend",
        1 => "index finger",
        2 => "middle finger",
        3 => "ring finger",
        4 => "little finger",
        5 => "thumb rotation",
        _ => "reserved",
    }
}

/// Description of one register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInfo {
    /// Holding register address
    pub address: u16,
    /// Register name
    pub name: String,
    /// Access mode
    pub access: Access,
}

const SINGLE_REGISTERS: &[(u16, &str, Access)] = &[
    (PROTOCOL_VERSION, "PROTOCOL_VERSION", Access::Read),
    (FW_VERSION, "FW_VERSION", Access::Read),
    (FW_REVISION, "FW_REVISION", Access::Read),
    (HW_VERSION, "HW_VERSION", Access::Read),
    (BOOT_VERSION, "BOOT_VERSION", Access::Read),
    (NODE_ID, "NODE_ID", Access::ReadWrite),
    (SUB_EXCEPTION, "SUB_EXCEPTION", Access::Read),
    (BATTERY_VOLTAGE, "BATTERY_VOLTAGE", Access::Read),
    (SELF_TEST_LEVEL, "SELF_TEST_LEVEL", Access::ReadWrite),
    (BEEP_SWITCH, "BEEP_SWITCH", Access::ReadWrite),
    (BEEP_PERIOD, "BEEP_PERIOD", Access::Write),
    (BUTTON_PRESS_CNT, "BUTTON_PRESS_CNT", Access::ReadWrite),
    (RECALIBRATE, "RECALIBRATE", Access::Write),
    (START_INIT, "START_INIT", Access::Write),
    (RESET, "RESET", Access::Write),
    (POWER_OFF, "POWER_OFF", Access::Write),
];

/// Look up a register by address
pub fn lookup(address: u16) -> Option<RegisterInfo> {
    if let Some(&(address, name, access)) = SINGLE_REGISTERS.iter().find(|(a, _, _)| *a == address) {
        return Some(RegisterInfo {
            address,
            name: name.to_string(),
            access,
        });
    }

    if (RESERVED0..RESERVED0 + 4).contains(&address) {
        return Some(RegisterInfo {
            address,
            name: format!("RESERVED{}", address - RESERVED0),
            access: Access::ReadWrite,
        });
    }

    if (CALI_THUMB_POS0..CALI_THUMB_POS0 + 5).contains(&address) {
        return Some(RegisterInfo {
            address,
            name: format!("CALI_THUMB_POS{}", address - CALI_THUMB_POS0),
            access: Access::ReadWrite,
        });
    }

    FingerBlock::locate(address).map(|(block, index)| RegisterInfo {
        address,
        name: format!("FINGER_{}{}", block.key().to_uppercase(), index),
        access: block.access(index),
    })
}

/// Display name of a register, falling back to the bare address
pub fn register_name(address: u16) -> String {
    lookup(address).map_or_else(|| address.to_string(), |info| info.name)
}

/// Force limit the firmware applies when force sensors are fitted (mN)
pub const FINGER_FORCE_LIMIT: u16 = 15000;

/// Value the register must hold for the hand to behave as shipped
///
/// Writable registers without a documented default return `None`.
pub fn factory_default(address: u16) -> Option<u16> {
    match address {
        SELF_TEST_LEVEL => return Some(1),
        BEEP_SWITCH => return Some(1),
        BEEP_PERIOD => return Some(500),
        NODE_ID => return Some(u16::from(DEFAULT_NODE_ID)),
        _ => {}
    }

    let (block, finger) = FingerBlock::locate(address)?;
    if finger >= FINGER_COUNT {
        return None;
    }
    match block {
        FingerBlock::P | FingerBlock::D => Some(25000),
        FingerBlock::I => Some(200),
        FingerBlock::G => Some(100),
        FingerBlock::CurrentLimit => Some(1299),
        FingerBlock::ForceTarget if finger < 5 => Some(0),
        FingerBlock::Speed => Some(65535),
        FingerBlock::PosTarget if finger == THUMB_ROTATION => Some(728),
        FingerBlock::PosTarget => Some(0),
        FingerBlock::AngleTarget if finger == THUMB_ROTATION => Some(0),
        FingerBlock::AngleTarget => Some(32367),
        _ => None,
    }
}

/// Firmware identity the suite was written against
pub mod expected {
    /// Register protocol
    pub const PROTOCOL_VERSION: &str = "V1.0.0";
    /// Firmware
    pub const FW_VERSION: &str = "V3.0.0";
    /// Firmware revision
    pub const FW_REVISION: &str = "V0.130";
    /// Hardware
    pub const HW_VERSION: &str = "1B01";
    /// Boot loader
    pub const BOOT_VERSION: &str = "V1.7.0";
}

/// `V{major}.{minor}` from a packed version register
pub fn format_version(raw: u16) -> String {
    let [major, minor] = raw.to_be_bytes();
    format!("V{}.{}", major, minor)
}

/// `V{major}.{minor}.0`, for registers that carry no patch level
pub fn format_full_version(raw: u16) -> String {
    format!("{}.0", format_version(raw))
}

/// `V{major}.{counter}`; the low byte is a plain counter
pub fn format_revision(raw: u16) -> String {
    format_version(raw)
}

/// Hardware version as four hex digits, e.g. `1B01`
pub fn format_hardware(raw: u16) -> String {
    format!("{:04X}", raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_addresses_match_firmware_map() {
        assert_eq!(FingerBlock::P.at(0), 1045);
        assert_eq!(FingerBlock::G.at(9), 1084);
        assert_eq!(FingerBlock::PosTarget.at(THUMB_ROTATION), 1140);
        assert_eq!(FingerBlock::Force.at(9), LAST_ADDRESS);
        assert_eq!(FingerBlock::locate(1100), Some((FingerBlock::CurrentLimit, 5)));
        assert_eq!(FingerBlock::locate(1019), None);
    }

    #[test]
    fn test_lookup() {
        let info = lookup(BEEP_PERIOD).unwrap();
        assert_eq!(info.name, "BEEP_PERIOD");
        assert_eq!(info.access, Access::Write);

        assert_eq!(lookup(1120).unwrap().access, Access::Read);
        assert_eq!(lookup(1119).unwrap().access, Access::ReadWrite);
        assert_eq!(lookup(1042).unwrap().name, "CALI_THUMB_POS2");
        assert_eq!(register_name(1165), "FINGER_ANGLE0");
        assert!(lookup(999).is_none());
        assert!(lookup(1185).is_none());
    }

    #[test]
    fn test_every_address_in_range_is_mapped() {
        for address in FIRST_ADDRESS..=LAST_ADDRESS {
            assert!(lookup(address).is_some(), "address {} unmapped", address);
        }
    }

    #[test]
    fn test_factory_defaults() {
        assert_eq!(factory_default(SELF_TEST_LEVEL), Some(1));
        assert_eq!(factory_default(FingerBlock::PosTarget.at(5)), Some(728));
        assert_eq!(factory_default(FingerBlock::PosTarget.at(4)), Some(0));
        assert_eq!(factory_default(FingerBlock::AngleTarget.at(0)), Some(32367));
        assert_eq!(factory_default(FingerBlock::AngleTarget.at(5)), Some(0));
        assert_eq!(factory_default(FingerBlock::CurrentLimit.at(3)), Some(1299));
        assert_eq!(factory_default(FingerBlock::P.at(7)), None);
        assert_eq!(factory_default(FingerBlock::Angle.at(0)), None);
    }

    #[test]
    fn test_version_formatting() {
        assert_eq!(format_version(0x0300), "V3.0");
        assert_eq!(format_full_version(0x0107), "V1.7.0");
        assert_eq!(format_revision(130), "V0.130");
        assert_eq!(format_hardware(0x1B01), expected::HW_VERSION);
    }
}
