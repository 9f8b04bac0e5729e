use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::device::{DeviceId, FrameDevice};
use crate::error::{Result, TransportError};

/// In-process packet device.
///
/// [`MemoryDevice::pair`] returns the host-side handle together with the
/// [`DeviceEndpoint`] that plays the hardware: packets written by the host
/// show up on the endpoint, packets sent by the endpoint are read by the host.
#[derive(Debug)]
pub struct MemoryDevice {
    id: DeviceId,
    packet_size: usize,
    open: AtomicBool,
    opens: AtomicUsize,
    to_endpoint: mpsc::UnboundedSender<Bytes>,
    from_endpoint: Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

/// The device side of a [`MemoryDevice`] pair.
#[derive(Debug)]
pub struct DeviceEndpoint {
    packet_size: usize,
    from_host: mpsc::UnboundedReceiver<Bytes>,
    to_host: mpsc::UnboundedSender<Bytes>,
}

impl MemoryDevice {
    /// Create a connected host/device pair moving packets of `packet_size`.
    pub fn pair(id: impl AsRef<str>, packet_size: usize) -> (Self, DeviceEndpoint) {
        let (to_endpoint, from_host) = mpsc::unbounded_channel();
        let (to_host, from_endpoint) = mpsc::unbounded_channel();

        let device = Self {
            id: DeviceId::new(id),
            packet_size,
            open: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            to_endpoint,
            from_endpoint: Mutex::new(from_endpoint),
        };
        let endpoint = DeviceEndpoint {
            packet_size,
            from_host,
            to_host,
        };
        (device, endpoint)
    }

    /// How many times the handle went from closed to open.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameDevice for MemoryDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<()> {
        if !self.open.swap(true, Ordering::SeqCst) {
            self.opens.fetch_add(1, Ordering::SeqCst);
            debug!(device = %self.id, "memory device opened");
        }
        Ok(())
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::NotOpen(self.id.clone()));
        }
        if frame.len() != self.packet_size {
            return Err(TransportError::InvalidFrameSize {
                expected: self.packet_size,
                actual: frame.len(),
            });
        }
        self.to_endpoint
            .send(Bytes::copy_from_slice(frame))
            .map_err(|_| TransportError::Closed)
    }

    async fn read_frame(&self) -> Result<Bytes> {
        let mut rx = self.from_endpoint.lock().await;
        rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(device = %self.id, "memory device closed");
        }
        Ok(())
    }
}

impl DeviceEndpoint {
    /// Wait for the next packet written by the host.
    ///
    /// Returns `None` once the host-side handle has been dropped.
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        self.from_host.recv().await
    }

    /// Take a packet the host already wrote, without waiting.
    pub fn try_recv_frame(&mut self) -> Option<Bytes> {
        self.from_host.try_recv().ok()
    }

    /// Deliver a packet to the host.
    pub fn send_frame(&self, frame: impl Into<Bytes>) -> Result<()> {
        let frame = frame.into();
        if frame.len() != self.packet_size {
            return Err(TransportError::InvalidFrameSize {
                expected: self.packet_size,
                actual: frame.len(),
            });
        }
        self.to_host.send(frame).map_err(|_| TransportError::Closed)
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_requires_open() {
        let (device, _endpoint) = MemoryDevice::pair("nano", 8);
        let err = device.write_frame(&[0u8; 8]).await.unwrap_err();
        assert!(matches!(err, TransportError::NotOpen(id) if id.as_str() == "nano"));
    }

    #[tokio::test]
    async fn packets_flow_both_ways() {
        let (device, mut endpoint) = MemoryDevice::pair("nano", 4);
        device.open().await.unwrap();

        device.write_frame(&[1, 2, 3, 4]).await.unwrap();
        assert_eq!(endpoint.recv_frame().await.unwrap().as_ref(), &[1, 2, 3, 4]);

        endpoint.send_frame(vec![5, 6, 7, 8]).unwrap();
        assert_eq!(device.read_frame().await.unwrap().as_ref(), &[5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn rejects_wrong_packet_size() {
        let (device, endpoint) = MemoryDevice::pair("nano", 4);
        device.open().await.unwrap();

        let err = device.write_frame(&[1, 2, 3]).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::InvalidFrameSize {
                expected: 4,
                actual: 3
            }
        ));
        assert!(endpoint.send_frame(vec![0u8; 5]).is_err());
    }

    #[tokio::test]
    async fn open_is_idempotent_and_counted() {
        let (device, _endpoint) = MemoryDevice::pair("nano", 4);
        assert!(!device.is_open());

        device.open().await.unwrap();
        device.open().await.unwrap();
        assert!(device.is_open());
        assert_eq!(device.open_count(), 1);

        device.close().await.unwrap();
        assert!(!device.is_open());
        device.open().await.unwrap();
        assert_eq!(device.open_count(), 2);
    }

    #[tokio::test]
    async fn read_reports_closed_when_endpoint_dropped() {
        let (device, endpoint) = MemoryDevice::pair("nano", 4);
        drop(endpoint);
        let err = device.read_frame().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
