//! Core module containing the harness functionality
//!
//! - Transport layer (serial port, simulated hand)
//! - Modbus RTU framing
//! - ROH register map and factory defaults
//! - Register client with exception classification
//! - Virtual hand for running without hardware
//! - Check catalogue and runner
//! - Allure report output

pub mod client;
pub mod protocol;
pub mod registers;
pub mod report;
pub mod simulator;
pub mod suite;
pub mod transport;
