//! Register client for the ROH hand
//!
//! Wraps request/response exchanges over a [`TransportTrait`] and turns
//! exception responses into readable diagnostics. Device failures (exception
//! 4) carry their real cause in the sub-exception register, which is read
//! back once to complete the message.

use crate::config::HarnessConfig;
use crate::core::protocol::modbus::{
    build_read_holding_registers, build_write_multiple_registers, expected_response_len,
    format_frame, parse_registers, parse_rtu_frame, ModbusFrame, ProtocolError, EXCEPTION_FRAME_LEN,
};
use crate::core::registers::{DEFAULT_NODE_ID, SUB_EXCEPTION};
use crate::core::transport::{create_transport, Transport, TransportError, TransportStats, TransportTrait};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Exception codes the ROH firmware reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RohError {
    /// Function code not supported
    IllegalFunction,
    /// Address outside the map or not accessible that way
    IllegalDataAddress,
    /// Malformed request data (protocol layer, not application)
    IllegalDataValue,
    /// Request understood but refused; see [`RohSubError`]
    DeviceFailure,
    /// Anything else
    Unknown(u8),
}

impl RohError {
    /// Classify a raw exception code
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::IllegalFunction,
            2 => Self::IllegalDataAddress,
            3 => Self::IllegalDataValue,
            4 => Self::DeviceFailure,
            other => Self::Unknown(other),
        }
    }

    /// Raw exception code
    pub fn code(self) -> u8 {
        match self {
            Self::IllegalFunction => 1,
            Self::IllegalDataAddress => 2,
            Self::IllegalDataValue => 3,
            Self::DeviceFailure => 4,
            Self::Unknown(code) => code,
        }
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "illegal function code",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value (protocol layer, not application)",
            Self::DeviceFailure => "device failure",
            Self::Unknown(_) => "unknown failure",
        }
    }
}

impl fmt::Display for RohError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Detailed cause of a device failure, held in the sub-exception register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RohSubError {
    /// Waiting for or running initialisation
    InitPending,
    /// Waiting for calibration
    CalibrationPending,
    /// Register value rejected
    InvalidValue,
    /// Motor stalled
    MotorStall,
    /// Operation failed
    OperationFailed,
    /// Saving to flash failed
    SaveFailed,
}

impl RohSubError {
    /// Decode the sub-exception register
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::InitPending),
            2 => Some(Self::CalibrationPending),
            3 => Some(Self::InvalidValue),
            4 => Some(Self::MotorStall),
            5 => Some(Self::OperationFailed),
            6 => Some(Self::SaveFailed),
            _ => None,
        }
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            Self::InitPending => "waiting for or running initialisation, request not accepted",
            Self::CalibrationPending => "waiting for calibration, request not accepted",
            Self::InvalidValue => "invalid register value",
            Self::MotorStall => "motor stalled",
            Self::OperationFailed => "operation failed",
            Self::SaveFailed => "save failed",
        }
    }
}

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Link-level failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The hand answered with an exception
    #[error("Device exception {code}: {diagnostic}")]
    Exception {
        /// Raw exception code
        code: u8,
        /// Classified description
        diagnostic: String,
    },
}

impl ClientError {
    /// Exception code, when the hand refused the request
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Per-connection options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Node id requests go to unless another is given
    pub node_id: u8,
    /// Pause after each exchange
    pub settle_delay: Duration,
    /// Time allowed for a complete response
    pub response_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID,
            settle_delay: Duration::from_millis(100),
            response_timeout: Duration::from_millis(500),
        }
    }
}

impl ClientOptions {
    /// Options from the harness configuration
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            node_id: config.device.node_id,
            settle_delay: config.device.settle_delay(),
            response_timeout: config.serial.response_timeout(),
        }
    }
}

/// Connected register client
pub struct RohClient {
    transport: Box<dyn TransportTrait>,
    options: ClientOptions,
    target: String,
}

impl RohClient {
    /// Open a connection to the hand
    pub async fn setup(transport: &Transport, options: ClientOptions) -> Result<Self, ClientError> {
        let target = transport.target();
        let mut link = create_transport(transport);
        if let Err(e) = link.connect().await {
            error!("[port = {}]Could not connect to Modbus device.", target);
            debug!("[port = {}]{}", target, e);
            return Err(e.into());
        }
        info!("[port = {}]Successfully connected to Modbus device.", target);
        Ok(Self {
            transport: link,
            options,
            target,
        })
    }

    /// Close the connection; failures are only logged
    pub async fn close(&mut self) {
        match self.transport.disconnect().await {
            Ok(()) => info!("[port = {}]Modbus connection closed.", self.target),
            Err(e) => error!("[port = {}]Error closing Modbus connection: {}", self.target, e),
        }
    }

    /// Default node id
    pub fn node_id(&self) -> u8 {
        self.options.node_id
    }

    /// Connection options
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Description of the underlying link
    pub fn connection_info(&self) -> String {
        self.transport.connection_info()
    }

    /// Link statistics
    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Read `count` holding registers from the default node
    pub async fn read_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>, ClientError> {
        self.read_registers_from(self.options.node_id, start, count).await
    }

    /// Read `count` holding registers from `node`
    pub async fn read_registers_from(
        &mut self,
        node: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let request = build_read_holding_registers(node, start, count)?;
        let outcome = match self.exchange(node, &request).await {
            Ok(ModbusFrame::Response(response)) => {
                if response.data.len() == usize::from(count) * 2 {
                    Ok(parse_registers(&response.data))
                } else {
                    Err(ClientError::Protocol(ProtocolError::Incomplete {
                        expected: usize::from(count) * 2,
                        actual: response.data.len(),
                    }))
                }
            }
            Ok(ModbusFrame::Exception(exception)) => {
                let diagnostic = self.describe_exception(node, exception.code).await;
                Err(ClientError::Exception {
                    code: exception.code,
                    diagnostic,
                })
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            error!("read registers failed: {}", diagnostic_of(e));
        }
        // The firmware needs the pause even after a failed request
        tokio::time::sleep(self.options.settle_delay).await;
        outcome
    }

    /// Write consecutive holding registers on the default node
    pub async fn write_registers(&mut self, start: u16, values: &[u16]) -> Result<(), ClientError> {
        self.write_registers_to(self.options.node_id, start, values).await
    }

    /// Write consecutive holding registers on `node` (function 0x10)
    pub async fn write_registers_to(
        &mut self,
        node: u8,
        start: u16,
        values: &[u16],
    ) -> Result<(), ClientError> {
        let request = build_write_multiple_registers(node, start, values)?;
        let outcome = match self.exchange(node, &request).await {
            Ok(ModbusFrame::Response(_)) => Ok(()),
            Ok(ModbusFrame::Exception(exception)) => {
                let diagnostic = self.describe_exception(node, exception.code).await;
                Err(ClientError::Exception {
                    code: exception.code,
                    diagnostic,
                })
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => tokio::time::sleep(self.options.settle_delay).await,
            Err(e) => error!("write registers failed: {}", diagnostic_of(e)),
        }
        outcome
    }

    /// Describe an exception code
    ///
    /// For device failures the sub-exception register of `node` is read; if
    /// that read fails or holds an unknown code the cause is reported as
    /// unknown.
    pub async fn describe_exception(&mut self, node: u8, code: u8) -> String {
        let kind = RohError::from_code(code);
        if kind != RohError::DeviceFailure {
            return kind.description().to_string();
        }

        let cause = match self.read_sub_exception(node).await {
            Ok(sub) => RohSubError::from_code(sub).map(RohSubError::description),
            Err(e) => {
                warn!("could not read sub-exception register: {}", e);
                None
            }
        };
        format!("{}, cause: {}", kind.description(), cause.unwrap_or("unknown"))
    }

    async fn read_sub_exception(&mut self, node: u8) -> Result<u16, ClientError> {
        let request = build_read_holding_registers(node, SUB_EXCEPTION, 1)?;
        let frame = self.exchange(node, &request).await;
        tokio::time::sleep(self.options.settle_delay).await;
        match frame? {
            ModbusFrame::Response(response) => parse_registers(&response.data)
                .first()
                .copied()
                .ok_or(ClientError::Protocol(ProtocolError::FrameTooShort(response.data.len()))),
            ModbusFrame::Exception(exception) => Err(ClientError::Exception {
                code: exception.code,
                diagnostic: RohError::from_code(exception.code).description().to_string(),
            }),
        }
    }

    /// Send one request and collect its reply
    async fn exchange(&mut self, node: u8, request: &[u8]) -> Result<ModbusFrame, ClientError> {
        let expected = expected_response_len(request)
            .ok_or(ProtocolError::FrameTooShort(request.len()))?;

        trace!("TX {}", format_frame(request));
        self.transport.send(request).await?;

        let deadline = Instant::now() + self.options.response_timeout;
        let mut buffer: Vec<u8> = Vec::with_capacity(expected);
        loop {
            let chunk = self.transport.receive().await?;
            buffer.extend_from_slice(&chunk);

            let is_exception = buffer.len() >= 2 && buffer[1] & 0x80 != 0;
            if (is_exception && buffer.len() >= EXCEPTION_FRAME_LEN) || buffer.len() >= expected {
                break;
            }
            if Instant::now() >= deadline {
                if buffer.is_empty() {
                    return Err(TransportError::Timeout(
                        self.options.response_timeout.as_millis() as u64,
                    )
                    .into());
                }
                return Err(ProtocolError::Incomplete {
                    expected,
                    actual: buffer.len(),
                }
                .into());
            }
        }
        trace!("RX {}", format_frame(&buffer));

        let frame = parse_rtu_frame(&buffer)?;
        if frame.slave_id() != node {
            return Err(ProtocolError::UnexpectedSlave {
                expected: node,
                actual: frame.slave_id(),
            }
            .into());
        }
        let function = match &frame {
            ModbusFrame::Response(response) => response.function as u8,
            ModbusFrame::Exception(exception) => exception.function,
        };
        if function != request[1] {
            return Err(ProtocolError::UnexpectedFunction {
                expected: request[1],
                actual: function,
            }
            .into());
        }
        Ok(frame)
    }
}

fn diagnostic_of(error: &ClientError) -> String {
    match error {
        ClientError::Exception { diagnostic, .. } => diagnostic.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::modbus::{build_exception_response, build_read_response};
    use crate::core::registers::{FingerBlock, BEEP_PERIOD, FW_VERSION, NODE_ID, SELF_TEST_LEVEL};
    use crate::core::simulator::{SharedHand, VirtualHand};
    use crate::core::transport::TransportType;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;

    fn fast_options() -> ClientOptions {
        ClientOptions {
            node_id: 2,
            settle_delay: Duration::ZERO,
            response_timeout: Duration::from_millis(50),
        }
    }

    async fn simulated() -> (SharedHand, RohClient) {
        let hand = VirtualHand::default().shared();
        let client = RohClient::setup(&Transport::Simulated(hand.clone()), fast_options())
            .await
            .unwrap();
        (hand, client)
    }

    #[tokio::test]
    async fn test_read_and_write() {
        let (_hand, mut client) = simulated().await;
        assert_eq!(client.read_registers(NODE_ID, 1).await.unwrap(), vec![2]);

        let speed = FingerBlock::Speed.at(3);
        client.write_registers(speed, &[1234]).await.unwrap();
        assert_eq!(client.read_registers(speed, 1).await.unwrap(), vec![1234]);
        client.close().await;
    }

    #[tokio::test]
    async fn test_multi_register_write() {
        let (hand, mut client) = simulated().await;
        let start = FingerBlock::CurrentLimit.at(0);
        client.write_registers(start, &[600; 6]).await.unwrap();
        assert_eq!(client.read_registers(start, 6).await.unwrap(), vec![600; 6]);
        assert_eq!(hand.lock().get(FingerBlock::CurrentLimit.at(5)), 600);
    }

    #[tokio::test]
    async fn test_device_failure_reads_sub_exception() {
        let (_hand, mut client) = simulated().await;
        let err = client.write_registers(SELF_TEST_LEVEL, &[3]).await.unwrap_err();
        match err {
            ClientError::Exception { code, diagnostic } => {
                assert_eq!(code, 4);
                assert_eq!(diagnostic, "device failure, cause: invalid register value");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_protocol_exceptions() {
        let (_hand, mut client) = simulated().await;
        let err = client.write_registers(FW_VERSION, &[1]).await.unwrap_err();
        assert_eq!(err.exception_code(), Some(2));
        assert!(err.to_string().contains("illegal data address"));

        let err = client.read_registers(BEEP_PERIOD, 1).await.unwrap_err();
        assert_eq!(err.exception_code(), Some(2));
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        let (_hand, mut client) = simulated().await;
        let err = client.read_registers_from(9, NODE_ID, 1).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Timeout(50))));
    }

    #[tokio::test]
    async fn test_setup_fails_when_offline() {
        let hand = VirtualHand::default().shared();
        hand.lock().set_online(false);
        let result = RohClient::setup(&Transport::Simulated(hand), fast_options()).await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(RohError::from_code(3), RohError::IllegalDataValue);
        assert_eq!(RohError::from_code(7).description(), "unknown failure");
        assert_eq!(RohError::from_code(7).code(), 7);
        assert_eq!(RohSubError::from_code(4), Some(RohSubError::MotorStall));
        assert_eq!(RohSubError::from_code(0), None);
        assert_eq!(RohSubError::from_code(9), None);
    }

    /// Replays canned replies, one per request
    struct Scripted {
        replies: VecDeque<Option<Vec<u8>>>,
        pending: Option<Bytes>,
    }

    #[async_trait]
    impl TransportTrait for Scripted {
        async fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            self.pending = self.replies.pop_front().flatten().map(Bytes::from);
            Ok(data.len())
        }
        async fn receive(&mut self) -> Result<Bytes, TransportError> {
            match self.pending.take() {
                Some(data) => Ok(data),
                None => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok(Bytes::new())
                }
            }
        }
        fn transport_type(&self) -> TransportType {
            TransportType::Simulated
        }
        fn connection_info(&self) -> String {
            "scripted".to_string()
        }
        fn stats(&self) -> TransportStats {
            TransportStats::default()
        }
    }

    fn scripted(replies: Vec<Option<Vec<u8>>>) -> RohClient {
        RohClient {
            transport: Box::new(Scripted {
                replies: replies.into(),
                pending: None,
            }),
            options: fast_options(),
            target: "scripted".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unreadable_sub_exception_gives_unknown_cause() {
        let mut client = scripted(vec![Some(build_exception_response(2, 0x10, 4)), None]);
        let err = client.write_registers(SELF_TEST_LEVEL, &[9]).await.unwrap_err();
        assert!(err.to_string().ends_with("cause: unknown"));
        assert!(!err.to_string().contains("cause unknown"));
    }

    #[tokio::test]
    async fn test_unknown_sub_exception_code() {
        let mut client = scripted(vec![
            Some(build_exception_response(2, 0x03, 4)),
            Some(build_read_response(2, &[42])),
        ]);
        let err = client.read_registers(FingerBlock::Pos.at(0), 1).await.unwrap_err();
        assert_eq!(err.exception_code(), Some(4));
        assert!(err.to_string().ends_with("cause: unknown"));
    }

    #[tokio::test]
    async fn test_high_exception_code_is_unknown_failure() {
        let mut client = scripted(vec![Some(build_exception_response(2, 0x03, 6))]);
        let err = client.read_registers(NODE_ID, 1).await.unwrap_err();
        assert!(err.to_string().contains("unknown failure"));
    }

    #[tokio::test]
    async fn test_reply_from_wrong_node_is_rejected() {
        let mut client = scripted(vec![Some(build_read_response(3, &[1]))]);
        let err = client.read_registers(NODE_ID, 1).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::UnexpectedSlave { expected: 2, actual: 3 })
        ));
    }
}
