//! Transport backed by an in-process [`VirtualHand`](crate::core::simulator::VirtualHand)

use super::{TransportError, TransportStats, TransportTrait, TransportType};
use crate::core::simulator::SharedHand;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Instant;

/// Simulated link to a virtual hand
pub struct SimulatedTransport {
    hand: SharedHand,
    connected: bool,
    pending: VecDeque<Bytes>,
    stats: TransportStats,
    connected_at: Option<Instant>,
}

impl SimulatedTransport {
    /// Create a transport talking to `hand`
    pub fn new(hand: SharedHand) -> Self {
        Self {
            hand,
            connected: false,
            pending: VecDeque::new(),
            stats: TransportStats::default(),
            connected_at: None,
        }
    }
}

#[async_trait]
impl TransportTrait for SimulatedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if !self.hand.lock().accept_connection() {
            return Err(TransportError::ConnectionFailed(
                "virtual hand is not responding".to_string(),
            ));
        }
        self.connected = true;
        self.connected_at = Some(Instant::now());
        self.stats = TransportStats::default();
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.connected_at = None;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.pending.clear();
        self.stats.bytes_sent += data.len() as u64;
        self.stats.packets_sent += 1;

        if let Some(reply) = self.hand.lock().process(data) {
            self.pending.push_back(Bytes::from(reply));
        }
        Ok(data.len())
    }

    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.pending.pop_front() {
            Some(data) => {
                self.stats.bytes_received += data.len() as u64;
                self.stats.packets_received += 1;
                Ok(data)
            }
            None => {
                // Behave like a serial read timing out
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok(Bytes::new())
            }
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Simulated
    }

    fn connection_info(&self) -> String {
        format!("virtual hand (node {})", self.hand.lock().node_id())
    }

    fn stats(&self) -> TransportStats {
        let mut stats = self.stats.clone();
        if let Some(connected_at) = self.connected_at {
            stats.uptime_secs = connected_at.elapsed().as_secs();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::modbus::build_read_holding_registers;
    use crate::core::registers::NODE_ID;
    use crate::core::simulator::VirtualHand;

    #[tokio::test]
    async fn test_request_reply() {
        let hand = VirtualHand::default().shared();
        let mut transport = SimulatedTransport::new(hand);
        transport.connect().await.unwrap();

        let request = build_read_holding_registers(2, NODE_ID, 1).unwrap();
        transport.send(&request).await.unwrap();
        let reply = transport.receive().await.unwrap();
        assert_eq!(reply.len(), 7);
        assert_eq!(&reply[3..5], &[0x00, 0x02]);
        assert!(transport.receive().await.unwrap().is_empty());
        assert_eq!(transport.stats().packets_received, 1);
    }

    #[tokio::test]
    async fn test_offline_hand_refuses_connection() {
        let hand = VirtualHand::default().shared();
        hand.lock().set_online(false);
        let mut transport = SimulatedTransport::new(hand);
        assert!(matches!(
            transport.connect().await,
            Err(TransportError::ConnectionFailed(_))
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_send_requires_connect() {
        let mut transport = SimulatedTransport::new(VirtualHand::default().shared());
        let request = build_read_holding_registers(2, NODE_ID, 1).unwrap();
        let result = tokio_test::block_on(transport.send(&request));
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
