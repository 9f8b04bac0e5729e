use std::time::Duration;

use apdulink_frame::{FrameConfig, DEFAULT_PACKET_SIZE};

use crate::error::Result;

/// Default time allowed for a complete response to arrive.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport behavior.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Fixed packet size of the device. Default: 64.
    pub packet_size: usize,
    /// Limit on waiting for a complete response; `None` waits forever.
    pub response_timeout: Option<Duration>,
    /// Limit on each single frame write; `None` waits forever.
    pub write_timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        self.frame_config().validate()?;
        Ok(())
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            packet_size: self.packet_size,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            write_timeout: None,
        }
    }
}
