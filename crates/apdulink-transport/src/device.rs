use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Stable identifier of a physical device handle.
///
/// Hot-plug events are matched against the currently bound device by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A packet-oriented device handle: every read and write moves exactly one
/// fixed-size packet.
///
/// Handles are shared (`Arc<dyn FrameDevice>`) between the transport's
/// scheduler, the inbound listener task and whoever delivers hot-plug
/// events, so every method takes `&self`.
#[async_trait]
pub trait FrameDevice: Send + Sync + fmt::Debug {
    /// Identifier used to match hot-plug events.
    fn id(&self) -> &DeviceId;

    /// Fixed packet size this device reads and writes.
    fn packet_size(&self) -> usize;

    /// Whether [`open`](Self::open) has succeeded and the handle is usable.
    fn is_open(&self) -> bool;

    /// Open the handle. Opening an already open handle is a no-op.
    async fn open(&self) -> Result<()>;

    /// Write a single packet and wait for the write to complete.
    async fn write_frame(&self, frame: &[u8]) -> Result<()>;

    /// Wait for the next inbound packet.
    ///
    /// Returns [`TransportError::Closed`](crate::TransportError::Closed) once
    /// the device can no longer deliver packets.
    async fn read_frame(&self) -> Result<Bytes>;

    /// Close the handle.
    async fn close(&self) -> Result<()>;
}

/// Hot-plug notification, each carrying the affected device handle.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Connected(Arc<dyn FrameDevice>),
    Disconnected(Arc<dyn FrameDevice>),
}

impl DeviceEvent {
    /// The device this event refers to.
    pub fn device(&self) -> &Arc<dyn FrameDevice> {
        match self {
            DeviceEvent::Connected(device) | DeviceEvent::Disconnected(device) => device,
        }
    }
}
