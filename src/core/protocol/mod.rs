//! Protocol implementations
//!
//! Provides the Modbus RTU framing the hand speaks:
//! - CRC-16/Modbus
//! - Holding register request builders and response parsers

pub mod checksum;
pub mod modbus;

pub use checksum::crc16_modbus;
pub use modbus::{
    FunctionCode, ExceptionCode, ModbusFrame, ModbusRequest, ModbusResponse, ModbusException,
    ProtocolError,
    build_read_holding_registers, build_write_multiple_registers, build_write_single_register,
    expected_response_len, parse_registers, parse_rtu_frame, parse_rtu_request,
};
