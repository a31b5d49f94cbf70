//! Waiting for the hand to come back after a reboot
//!
//! Changing the node id restarts the hand's firmware. The link is reopened
//! until the node id register answers on the expected node.

use crate::config::RebootSettings;
use crate::core::client::{ClientOptions, RohClient};
use crate::core::registers::NODE_ID;
use crate::core::transport::Transport;
use std::time::Duration;
use tracing::{debug, info};

/// Reboot wait configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootWaitConfig {
    /// Reconnect attempts before giving up
    pub max_attempts: u32,
    /// Pause before each attempt
    pub delay: Duration,
}

impl Default for RebootWaitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            delay: Duration::from_secs(1),
        }
    }
}

impl From<&RebootSettings> for RebootWaitConfig {
    fn from(settings: &RebootSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            delay: settings.delay(),
        }
    }
}

/// Reconnect until `node` answers a node id read
///
/// Returns the connected client, or `None` once every attempt has failed.
pub async fn wait_device_reboot(
    transport: &Transport,
    options: &ClientOptions,
    config: &RebootWaitConfig,
    node: u8,
) -> Option<RohClient> {
    for attempt in 0..config.max_attempts {
        info!("Waiting for device reboot... {}", attempt);
        tokio::time::sleep(config.delay).await;

        let mut client = match RohClient::setup(transport, options.clone()).await {
            Ok(client) => client,
            Err(e) => {
                debug!("reconnect attempt {} failed: {}", attempt, e);
                continue;
            }
        };

        match client.read_registers_from(node, NODE_ID, 1).await {
            Ok(values) => {
                info!("wait_device_reboot --> node id = {:?}", values.first());
                info!("Device is up");
                return Some(client);
            }
            Err(_) => client.close().await,
        }
    }
    None
}
