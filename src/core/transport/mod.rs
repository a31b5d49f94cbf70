//! Transport layer for the Modbus link
//!
//! Supports:
//! - Serial ports (RS-485, USB-Serial)
//! - An in-process simulated hand for running the suite without hardware

mod serial;
mod simulated;

pub use serial::{list_ports, SerialConfig, SerialFlowControl, SerialParity, SerialTransport};
pub use simulated::SimulatedTransport;

use crate::core::simulator::SharedHand;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Transport configuration
#[derive(Debug, Clone)]
pub enum Transport {
    /// Serial port connection
    Serial(SerialConfig),
    /// Simulated hand
    Simulated(SharedHand),
}

impl Transport {
    /// Short description for log lines, e.g. the port name
    pub fn target(&self) -> String {
        match self {
            Self::Serial(cfg) => cfg.port.clone(),
            Self::Simulated(_) => "simulated".to_string(),
        }
    }
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Serial port
    Serial,
    /// Simulated hand
    Simulated,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No complete response before the deadline
    #[error("Response timeout after {0} ms")]
    Timeout(u64),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Frames sent
    pub packets_sent: u64,
    /// Reads that returned data
    pub packets_received: u64,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}

/// Transport trait for all connection types
#[async_trait]
pub trait TransportTrait: Send + Sync {
    /// Connect to the target
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Disconnect from the target
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send a complete frame
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Receive whatever is available; empty when nothing arrived within the
    /// port's read timeout
    async fn receive(&mut self) -> Result<Bytes, TransportError>;

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Get connection info string
    fn connection_info(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}

/// Create a transport instance from configuration
pub fn create_transport(config: &Transport) -> Box<dyn TransportTrait> {
    match config {
        Transport::Serial(cfg) => Box::new(SerialTransport::new(cfg.clone())),
        Transport::Simulated(hand) => Box::new(SimulatedTransport::new(hand.clone())),
    }
}
