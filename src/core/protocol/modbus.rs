//! Modbus RTU framing
//!
//! Request builders and response parsers for the holding-register subset the
//! hand speaks (0x03, 0x06, 0x10), plus the server-side counterparts the
//! simulator uses.

use super::checksum;
use thiserror::Error;

/// Largest register count allowed in one read request
pub const MAX_READ_QUANTITY: u16 = 125;

/// Largest register count allowed in one write-multiple request
pub const MAX_WRITE_QUANTITY: u16 = 123;

/// Length of an RTU exception response (slave, function|0x80, code, crc)
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// Modbus function codes used against the hand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Get function code from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// Get name of function code
    pub fn name(&self) -> &'static str {
        match self {
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::WriteSingleRegister => "Write Single Register",
            FunctionCode::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

/// Standard Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not supported
    IllegalFunction = 0x01,
    /// Register address outside the map
    IllegalDataAddress = 0x02,
    /// Value or quantity not accepted
    IllegalDataValue = 0x03,
    /// Device failed while executing the request; the ROH hand reports the
    /// cause in its sub-exception register
    SlaveDeviceFailure = 0x04,
    /// Accepted, processing takes longer
    Acknowledge = 0x05,
    /// Device busy, retry later
    SlaveDeviceBusy = 0x06,
    /// Memory parity check failed
    MemoryParityError = 0x08,
    /// Gateway has no path to the target
    GatewayPathUnavailable = 0x0A,
    /// Gateway target did not answer
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ExceptionCode {
    /// Get exception from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(ExceptionCode::IllegalFunction),
            0x02 => Some(ExceptionCode::IllegalDataAddress),
            0x03 => Some(ExceptionCode::IllegalDataValue),
            0x04 => Some(ExceptionCode::SlaveDeviceFailure),
            0x05 => Some(ExceptionCode::Acknowledge),
            0x06 => Some(ExceptionCode::SlaveDeviceBusy),
            0x08 => Some(ExceptionCode::MemoryParityError),
            0x0A => Some(ExceptionCode::GatewayPathUnavailable),
            0x0B => Some(ExceptionCode::GatewayTargetDeviceFailedToRespond),
            _ => None,
        }
    }

    /// Get name of exception
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "Illegal Function",
            ExceptionCode::IllegalDataAddress => "Illegal Data Address",
            ExceptionCode::IllegalDataValue => "Illegal Data Value",
            ExceptionCode::SlaveDeviceFailure => "Slave Device Failure",
            ExceptionCode::Acknowledge => "Acknowledge",
            ExceptionCode::SlaveDeviceBusy => "Slave Device Busy",
            ExceptionCode::MemoryParityError => "Memory Parity Error",
            ExceptionCode::GatewayPathUnavailable => "Gateway Path Unavailable",
            ExceptionCode::GatewayTargetDeviceFailedToRespond => "Gateway Target Failed to Respond",
        }
    }
}

/// Framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than the smallest valid frame
    #[error("Frame too short ({0} bytes)")]
    FrameTooShort(usize),

    /// CRC did not match the frame body
    #[error("CRC mismatch")]
    CrcMismatch,

    /// Function code outside the supported subset
    #[error("Unsupported function code 0x{0:02X}")]
    UnsupportedFunction(u8),

    /// Byte count or length field disagrees with the frame size
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    Incomplete {
        /// Bytes the header announced
        expected: usize,
        /// Bytes present
        actual: usize,
    },

    /// Register quantity outside what a single request may carry
    #[error("Register quantity {0} out of range")]
    QuantityOutOfRange(usize),

    /// Reply came from another node
    #[error("Response from slave {actual}, expected {expected}")]
    UnexpectedSlave {
        /// Node that was addressed
        expected: u8,
        /// Node that answered
        actual: u8,
    },

    /// Reply carried another function code
    #[error("Response function 0x{actual:02X}, expected 0x{expected:02X}")]
    UnexpectedFunction {
        /// Function that was requested
        expected: u8,
        /// Function in the reply
        actual: u8,
    },
}

/// Parsed request (server side)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    /// Addressed node
    pub slave_id: u8,
    /// Requested function
    pub function: FunctionCode,
    /// First register
    pub start_address: u16,
    /// Number of registers
    pub quantity: u16,
    /// Values carried by write requests
    pub values: Vec<u16>,
}

/// Normal response (client side)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    /// Answering node
    pub slave_id: u8,
    /// Function echoed back
    pub function: FunctionCode,
    /// Payload after the byte count, or the echoed address and quantity
    pub data: Vec<u8>,
}

/// Exception response; the code is kept raw so vendor codes survive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusException {
    /// Answering node
    pub slave_id: u8,
    /// Function with the exception bit cleared
    pub function: u8,
    /// Exception code
    pub code: u8,
}

impl ModbusException {
    /// Standard name of the code, if it has one
    pub fn standard_name(&self) -> &'static str {
        ExceptionCode::from_u8(self.code).map_or("Unknown", |c| c.name())
    }
}

/// Parsed response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusFrame {
    /// Normal reply
    Response(ModbusResponse),
    /// Exception reply
    Exception(ModbusException),
}

impl ModbusFrame {
    /// Node the frame came from
    pub fn slave_id(&self) -> u8 {
        match self {
            Self::Response(r) => r.slave_id,
            Self::Exception(e) => e.slave_id,
        }
    }
}

// ============ Request encoding ============

/// Build a read holding registers request
pub fn build_read_holding_registers(
    slave_id: u8,
    start_address: u16,
    quantity: u16,
) -> Result<Vec<u8>, ProtocolError> {
    if quantity == 0 || quantity > MAX_READ_QUANTITY {
        return Err(ProtocolError::QuantityOutOfRange(quantity as usize));
    }

    let mut frame = Vec::with_capacity(8);
    frame.push(slave_id);
    frame.push(FunctionCode::ReadHoldingRegisters as u8);
    frame.extend_from_slice(&start_address.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    checksum::append_crc(&mut frame);

    Ok(frame)
}

/// Build a write single register request
pub fn build_write_single_register(slave_id: u8, address: u16, value: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(slave_id);
    frame.push(FunctionCode::WriteSingleRegister as u8);
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&value.to_be_bytes());
    checksum::append_crc(&mut frame);

    frame
}

/// Build a write multiple registers request
pub fn build_write_multiple_registers(
    slave_id: u8,
    start_address: u16,
    values: &[u16],
) -> Result<Vec<u8>, ProtocolError> {
    if values.is_empty() || values.len() > MAX_WRITE_QUANTITY as usize {
        return Err(ProtocolError::QuantityOutOfRange(values.len()));
    }

    let quantity = values.len() as u16;
    let byte_count = (values.len() * 2) as u8;

    let mut frame = Vec::with_capacity(9 + values.len() * 2);
    frame.push(slave_id);
    frame.push(FunctionCode::WriteMultipleRegisters as u8);
    frame.extend_from_slice(&start_address.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    frame.push(byte_count);

    for value in values {
        frame.extend_from_slice(&value.to_be_bytes());
    }
    checksum::append_crc(&mut frame);

    Ok(frame)
}

/// Length of a complete normal response to `request`
///
/// Used by transports to know when to stop reading. Exception responses are
/// always [`EXCEPTION_FRAME_LEN`] bytes.
pub fn expected_response_len(request: &[u8]) -> Option<usize> {
    if request.len() < 6 {
        return None;
    }
    match FunctionCode::from_u8(request[1])? {
        FunctionCode::ReadHoldingRegisters => {
            let quantity = u16::from_be_bytes([request[4], request[5]]) as usize;
            Some(5 + quantity * 2)
        }
        FunctionCode::WriteSingleRegister | FunctionCode::WriteMultipleRegisters => Some(8),
    }
}

// ============ Response decoding ============

/// Parse a response frame
pub fn parse_rtu_frame(data: &[u8]) -> Result<ModbusFrame, ProtocolError> {
    if data.len() < EXCEPTION_FRAME_LEN {
        return Err(ProtocolError::FrameTooShort(data.len()));
    }
    if !checksum::crc_matches(data) {
        return Err(ProtocolError::CrcMismatch);
    }

    let slave_id = data[0];
    let function_code = data[1];

    // Exception response (bit 7 set)
    if function_code & 0x80 != 0 {
        return Ok(ModbusFrame::Exception(ModbusException {
            slave_id,
            function: function_code & 0x7F,
            code: data[2],
        }));
    }

    let function =
        FunctionCode::from_u8(function_code).ok_or(ProtocolError::UnsupportedFunction(function_code))?;

    match function {
        FunctionCode::ReadHoldingRegisters => {
            // Response: byte count + data
            let byte_count = data[2] as usize;
            let expected = 3 + byte_count + 2;
            if data.len() != expected {
                return Err(ProtocolError::Incomplete {
                    expected,
                    actual: data.len(),
                });
            }
            Ok(ModbusFrame::Response(ModbusResponse {
                slave_id,
                function,
                data: data[3..3 + byte_count].to_vec(),
            }))
        }
        FunctionCode::WriteSingleRegister | FunctionCode::WriteMultipleRegisters => {
            // Echo of address + value/quantity
            if data.len() != 8 {
                return Err(ProtocolError::Incomplete {
                    expected: 8,
                    actual: data.len(),
                });
            }
            Ok(ModbusFrame::Response(ModbusResponse {
                slave_id,
                function,
                data: data[2..6].to_vec(),
            }))
        }
    }
}

// ============ Server side ============

/// Parse a request frame (used by the simulator)
pub fn parse_rtu_request(data: &[u8]) -> Result<ModbusRequest, ProtocolError> {
    if data.len() < 8 {
        return Err(ProtocolError::FrameTooShort(data.len()));
    }
    if !checksum::crc_matches(data) {
        return Err(ProtocolError::CrcMismatch);
    }

    let slave_id = data[0];
    let function = FunctionCode::from_u8(data[1]).ok_or(ProtocolError::UnsupportedFunction(data[1]))?;
    let start_address = u16::from_be_bytes([data[2], data[3]]);
    let word = u16::from_be_bytes([data[4], data[5]]);

    match function {
        FunctionCode::ReadHoldingRegisters => Ok(ModbusRequest {
            slave_id,
            function,
            start_address,
            quantity: word,
            values: Vec::new(),
        }),
        FunctionCode::WriteSingleRegister => Ok(ModbusRequest {
            slave_id,
            function,
            start_address,
            quantity: 1,
            values: vec![word],
        }),
        FunctionCode::WriteMultipleRegisters => {
            let byte_count = *data.get(6).ok_or(ProtocolError::FrameTooShort(data.len()))? as usize;
            let expected = 7 + byte_count + 2;
            if data.len() != expected || byte_count != word as usize * 2 {
                return Err(ProtocolError::Incomplete {
                    expected,
                    actual: data.len(),
                });
            }
            Ok(ModbusRequest {
                slave_id,
                function,
                start_address,
                quantity: word,
                values: parse_registers(&data[7..7 + byte_count]),
            })
        }
    }
}

/// Build a read holding registers response
pub fn build_read_response(slave_id: u8, values: &[u16]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5 + values.len() * 2);
    frame.push(slave_id);
    frame.push(FunctionCode::ReadHoldingRegisters as u8);
    frame.push((values.len() * 2) as u8);
    for value in values {
        frame.extend_from_slice(&value.to_be_bytes());
    }
    checksum::append_crc(&mut frame);
    frame
}

/// Build the echo response of a write request
pub fn build_write_response(slave_id: u8, function: FunctionCode, address: u16, word: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(slave_id);
    frame.push(function as u8);
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&word.to_be_bytes());
    checksum::append_crc(&mut frame);
    frame
}

/// Build an exception response
pub fn build_exception_response(slave_id: u8, function: u8, code: u8) -> Vec<u8> {
    let mut frame = vec![slave_id, function | 0x80, code];
    checksum::append_crc(&mut frame);
    frame
}

// ============ Helper functions ============

/// Extract register values from response data
pub fn parse_registers(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Format an RTU frame for trace output
pub fn format_frame(data: &[u8]) -> String {
    if data.len() < 4 {
        return format!("Invalid RTU frame: {}", hex::encode(data));
    }
    format!(
        "RTU: Slave={:02X} Func={:02X} Data={} CRC={:04X}",
        data[0],
        data[1],
        hex::encode(&data[2..data.len() - 2]),
        u16::from_le_bytes([data[data.len() - 2], data[data.len() - 1]])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_read_holding_registers() {
        let frame = build_read_holding_registers(2, 1000, 1).unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(frame[0], 2); // Slave ID
        assert_eq!(frame[1], 3); // Function code
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 1000);
        assert!(checksum::crc_matches(&frame));
        assert_eq!(expected_response_len(&frame), Some(7));
    }

    #[test]
    fn test_read_quantity_limits() {
        assert_eq!(
            build_read_holding_registers(2, 1000, 0),
            Err(ProtocolError::QuantityOutOfRange(0))
        );
        assert!(build_read_holding_registers(2, 1000, 126).is_err());
    }

    #[test]
    fn test_build_write_multiple_registers() {
        let frame = build_write_multiple_registers(2, 1095, &[600; 6]).unwrap();
        assert_eq!(frame.len(), 9 + 12);
        assert_eq!(frame[1], 0x10);
        assert_eq!(u16::from_be_bytes([frame[4], frame[5]]), 6);
        assert_eq!(frame[6], 12);
        assert_eq!(expected_response_len(&frame), Some(8));
        assert!(build_write_multiple_registers(2, 1095, &[]).is_err());
    }

    #[test]
    fn test_parse_read_response() {
        let frame = build_read_response(2, &[100, 300]);
        match parse_rtu_frame(&frame).unwrap() {
            ModbusFrame::Response(r) => {
                assert_eq!(r.slave_id, 2);
                assert_eq!(r.function, FunctionCode::ReadHoldingRegisters);
                assert_eq!(parse_registers(&r.data), vec![100, 300]);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_exception_keeps_raw_code() {
        let frame = build_exception_response(2, 0x10, 0x07);
        match parse_rtu_frame(&frame).unwrap() {
            ModbusFrame::Exception(e) => {
                assert_eq!(e.function, 0x10);
                assert_eq!(e.code, 7);
                assert_eq!(e.standard_name(), "Unknown");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_standard_exception_names() {
        let frame = build_exception_response(2, 0x06, 0x04);
        match parse_rtu_frame(&frame).unwrap() {
            ModbusFrame::Exception(e) => {
                assert_eq!(e.function, 0x06);
                assert_eq!(e.standard_name(), "Slave Device Failure");
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(ExceptionCode::from_u8(0x0B), Some(ExceptionCode::GatewayTargetDeviceFailedToRespond));
        assert_eq!(ExceptionCode::from_u8(0x07), None);
    }

    #[test]
    fn test_parse_rejects_bad_crc() {
        let mut frame = build_read_response(2, &[1]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(parse_rtu_frame(&frame), Err(ProtocolError::CrcMismatch));
    }

    #[test]
    fn test_request_round_trip_through_server_parser() {
        let frame = build_write_multiple_registers(3, 1045, &[25000, 100]).unwrap();
        let request = parse_rtu_request(&frame).unwrap();
        assert_eq!(request.slave_id, 3);
        assert_eq!(request.function, FunctionCode::WriteMultipleRegisters);
        assert_eq!(request.start_address, 1045);
        assert_eq!(request.values, vec![25000, 100]);

        let single = build_write_single_register(3, 1009, 1);
        let request = parse_rtu_request(&single).unwrap();
        assert_eq!(request.values, vec![1]);
    }

    #[test]
    fn test_parse_registers() {
        let data = vec![0x00, 0x64, 0x01, 0x2C]; // 100, 300
        assert_eq!(parse_registers(&data), vec![100, 300]);
    }
}
