//! Virtual ROH hand
//!
//! An in-process stand-in for the hand's Modbus RTU firmware. It decodes
//! request frames, applies the same acceptance rules the real firmware has
//! for each register and answers with response or exception frames, so the
//! whole check suite can run without hardware.

use crate::core::protocol::modbus::{
    build_exception_response, build_read_response, build_write_response, parse_rtu_request,
    ExceptionCode, FunctionCode, ModbusRequest, ProtocolError, MAX_READ_QUANTITY, MAX_WRITE_QUANTITY,
};
use crate::core::registers::{
    self, lookup, FingerBlock, BATTERY_VOLTAGE, BEEP_PERIOD, BEEP_SWITCH, BOOT_VERSION, FINGER_COUNT,
    FIRST_ADDRESS, FW_REVISION, FW_VERSION, HW_VERSION, LAST_ADDRESS, NODE_ID, PROTOCOL_VERSION,
    SELF_TEST_LEVEL, SUB_EXCEPTION, THUMB_ROTATION,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Hand shared between a test and the transports that talk to it
pub type SharedHand = Arc<Mutex<VirtualHand>>;

/// Firmware sub-exception codes stored in the sub-exception register
mod sub_code {
    pub const INVALID_VALUE: u16 = 3;
}

/// Position targets are stored with this resolution
const POS_TARGET_STEP: u16 = 16;
/// Lowest position target the thumb rotation accepts
const THUMB_ROTATION_POS_FLOOR: u16 = 728;
/// Angle targets are stored with this resolution (0.01 degree units)
const ANGLE_TARGET_STEP: i32 = 4;

/// Mechanical angle range of each finger, in 0.01 degree units.
/// Only the thumb bend travels below zero.
const ANGLE_RANGES: [(i32, i32); FINGER_COUNT as usize] = [
    (-3600, 3600),
    (1000, 17800),
    (1000, 17800),
    (1000, 17800),
    (1000, 17800),
    (0, 9000),
];

/// Request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandStats {
    /// Frames addressed to this hand
    pub requests: u64,
    /// Exception responses sent
    pub exceptions: u64,
    /// Frames dropped (bad CRC, other node, broadcast)
    pub ignored: u64,
}

/// Simulated hand firmware
#[derive(Debug, Clone)]
pub struct VirtualHand {
    node_id: u8,
    registers: Vec<u16>,
    online: bool,
    reboot_cycles: u32,
    rebooting: u32,
    stats: HandStats,
}

impl Default for VirtualHand {
    fn default() -> Self {
        Self::new(registers::DEFAULT_NODE_ID)
    }
}

impl VirtualHand {
    /// Create a hand answering on `node_id`, all registers at factory values
    pub fn new(node_id: u8) -> Self {
        let mut hand = Self {
            node_id,
            registers: vec![0; usize::from(LAST_ADDRESS - FIRST_ADDRESS) + 1],
            online: true,
            reboot_cycles: 2,
            rebooting: 0,
            stats: HandStats::default(),
        };
        hand.factory_reset();
        hand
    }

    /// Wrap in a [`SharedHand`]
    pub fn shared(self) -> SharedHand {
        Arc::new(Mutex::new(self))
    }

    /// Restore every register to its shipped value
    pub fn factory_reset(&mut self) {
        self.registers.iter_mut().for_each(|r| *r = 0);
        self.set(PROTOCOL_VERSION, 0x0100);
        self.set(FW_VERSION, 0x0300);
        self.set(FW_REVISION, 130);
        self.set(HW_VERSION, 0x1B01);
        self.set(BOOT_VERSION, 0x0107);
        self.set(NODE_ID, u16::from(self.node_id));
        self.set(BATTERY_VOLTAGE, 8000);

        for address in FIRST_ADDRESS..=LAST_ADDRESS {
            if let Some(value) = registers::factory_default(address) {
                if address != NODE_ID {
                    self.set(address, value);
                }
            }
        }
        // Targets are kept in their stored (quantised, clamped) form
        for finger in 0..FINGER_COUNT {
            let pos = self.get(FingerBlock::PosTarget.at(finger));
            self.set(FingerBlock::PosTarget.at(finger), quantise_pos_target(finger, pos));
            let angle = self.get(FingerBlock::AngleTarget.at(finger));
            self.set(FingerBlock::AngleTarget.at(finger), quantise_angle_target(finger, angle));
            self.sync_feedback(finger);
        }
    }

    /// Node id the hand currently answers on
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Power the hand on or off; an offline hand refuses connections
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Number of refused connection attempts after a node id change
    pub fn set_reboot_cycles(&mut self, cycles: u32) {
        self.reboot_cycles = cycles;
    }

    /// Whether the hand is still rebooting
    pub fn is_rebooting(&self) -> bool {
        self.rebooting > 0
    }

    /// Request counters
    pub fn stats(&self) -> HandStats {
        self.stats
    }

    /// Called when a host opens the link; returns whether it succeeds
    pub fn accept_connection(&mut self) -> bool {
        if !self.online {
            return false;
        }
        if self.rebooting > 0 {
            self.rebooting -= 1;
            return false;
        }
        true
    }

    /// Current value of a register; unmapped addresses read as 0
    pub fn get(&self, address: u16) -> u16 {
        Self::index(address).map_or(0, |i| self.registers[i])
    }

    /// Set a register directly, bypassing the firmware rules
    pub fn set(&mut self, address: u16, value: u16) {
        if let Some(i) = Self::index(address) {
            self.registers[i] = value;
        }
    }

    fn index(address: u16) -> Option<usize> {
        (FIRST_ADDRESS..=LAST_ADDRESS)
            .contains(&address)
            .then(|| usize::from(address - FIRST_ADDRESS))
    }

    /// Handle one request frame; `None` means the hand stays silent
    pub fn process(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if !self.online || self.rebooting > 0 {
            return None;
        }
        // Only the slave id is needed to decide whether to answer at all
        let slave_id = *frame.first()?;
        if slave_id != self.node_id {
            self.stats.ignored += 1;
            return None;
        }

        let request = match parse_rtu_request(frame) {
            Ok(request) => request,
            Err(ProtocolError::UnsupportedFunction(function)) => {
                self.stats.requests += 1;
                return Some(self.exception(function, ExceptionCode::IllegalFunction as u8));
            }
            Err(e) => {
                debug!("virtual hand dropped frame: {}", e);
                self.stats.ignored += 1;
                return None;
            }
        };
        self.stats.requests += 1;

        let function = request.function as u8;
        let reply = match request.function {
            FunctionCode::ReadHoldingRegisters => self.read(&request),
            FunctionCode::WriteSingleRegister | FunctionCode::WriteMultipleRegisters => self.write(&request),
        };

        Some(match reply {
            Ok(frame) => frame,
            Err(code) => self.exception(function, code),
        })
    }

    fn exception(&mut self, function: u8, code: u8) -> Vec<u8> {
        self.stats.exceptions += 1;
        build_exception_response(self.node_id, function, code)
    }

    fn read(&self, request: &ModbusRequest) -> Result<Vec<u8>, u8> {
        if request.quantity == 0 || request.quantity > MAX_READ_QUANTITY {
            return Err(ExceptionCode::IllegalDataValue as u8);
        }
        let end = u32::from(request.start_address) + u32::from(request.quantity);
        let mut values = Vec::with_capacity(usize::from(request.quantity));
        for address in u32::from(request.start_address)..end {
            let address = u16::try_from(address).map_err(|_| ExceptionCode::IllegalDataAddress as u8)?;
            match lookup(address) {
                Some(info) if info.access.readable() => values.push(self.get(address)),
                _ => return Err(ExceptionCode::IllegalDataAddress as u8),
            }
        }
        Ok(build_read_response(self.node_id, &values))
    }

    fn write(&mut self, request: &ModbusRequest) -> Result<Vec<u8>, u8> {
        if request.values.is_empty() || request.values.len() > usize::from(MAX_WRITE_QUANTITY) {
            return Err(ExceptionCode::IllegalDataValue as u8);
        }
        // All addresses are checked before anything is stored
        for offset in 0..request.values.len() {
            let address = u32::from(request.start_address) + offset as u32;
            let writable = u16::try_from(address)
                .ok()
                .and_then(lookup)
                .is_some_and(|info| info.access.writable());
            if !writable {
                return Err(ExceptionCode::IllegalDataAddress as u8);
            }
        }

        let old_node_id = self.node_id;
        for (address, &value) in (request.start_address..).zip(request.values.iter()) {
            if let Err(sub) = self.store(address, value) {
                self.set(SUB_EXCEPTION, sub);
                return Err(ExceptionCode::SlaveDeviceFailure as u8);
            }
        }

        let word = match request.function {
            FunctionCode::WriteSingleRegister => request.values[0],
            _ => request.quantity,
        };
        // The acknowledgement still goes out on the old id
        let reply = build_write_response(old_node_id, request.function, request.start_address, word);
        if self.node_id != old_node_id {
            self.rebooting = self.reboot_cycles;
        }
        Ok(reply)
    }

    /// Apply one register write, returning the sub-exception code on rejection
    fn store(&mut self, address: u16, value: u16) -> Result<(), u16> {
        match address {
            NODE_ID => {
                let id = u8::try_from(value)
                    .ok()
                    .filter(|id| (1..=247).contains(id))
                    .ok_or(sub_code::INVALID_VALUE)?;
                self.node_id = id;
                self.set(NODE_ID, value);
            }
            SELF_TEST_LEVEL => {
                if value > 2 {
                    return Err(sub_code::INVALID_VALUE);
                }
                self.set(address, value);
            }
            BEEP_SWITCH => self.set(address, u16::from(value != 0)),
            BEEP_PERIOD => {
                if value == 0 {
                    return Err(sub_code::INVALID_VALUE);
                }
                self.set(address, value);
            }
            _ => match FingerBlock::locate(address) {
                Some((block, finger)) if finger < FINGER_COUNT => self.store_finger(block, finger, value),
                _ => self.set(address, value),
            },
        }
        Ok(())
    }

    fn store_finger(&mut self, block: FingerBlock, finger: u8, value: u16) {
        let address = block.at(finger);
        // Out-of-range tuning values are acknowledged and dropped
        let accepted = match block {
            FingerBlock::P => (100..=50000).contains(&value),
            FingerBlock::D => value <= 50000,
            FingerBlock::I => value <= 10000,
            FingerBlock::G => (1..=100).contains(&value),
            FingerBlock::CurrentLimit => value <= 1299,
            FingerBlock::ForceTarget => value <= registers::FINGER_FORCE_LIMIT,
            _ => true,
        };
        if !accepted {
            debug!("virtual hand ignored {} = {}", registers::register_name(address), value);
            return;
        }

        match block {
            FingerBlock::PosTarget => {
                self.set(address, quantise_pos_target(finger, value));
                self.sync_feedback(finger);
            }
            FingerBlock::AngleTarget => {
                self.set(address, quantise_angle_target(finger, value));
                self.sync_feedback(finger);
            }
            _ => self.set(address, value),
        }
    }

    /// The fingers reach their targets instantly
    fn sync_feedback(&mut self, finger: u8) {
        let pos = self.get(FingerBlock::PosTarget.at(finger));
        self.set(FingerBlock::Pos.at(finger), pos);
        let angle = self.get(FingerBlock::AngleTarget.at(finger));
        self.set(FingerBlock::Angle.at(finger), angle);
    }
}

fn quantise_pos_target(finger: u8, value: u16) -> u16 {
    let stored = value - value % POS_TARGET_STEP;
    if finger == THUMB_ROTATION {
        stored.max(THUMB_ROTATION_POS_FLOOR)
    } else {
        stored
    }
}

/// Angle targets are signed; the stored value is stepped then clamped into
/// the finger's mechanical range
fn quantise_angle_target(finger: u8, value: u16) -> u16 {
    let (lo, hi) = ANGLE_RANGES[usize::from(finger) % ANGLE_RANGES.len()];
    let signed = i32::from(value as i16);
    let stepped = signed - signed.rem_euclid(ANGLE_TARGET_STEP);
    // Range bounds fit in i16; negative angles are stored two's complement
    stepped.clamp(lo, hi) as i16 as u16
}
