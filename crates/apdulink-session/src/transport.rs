use std::sync::{Arc, Mutex, PoisonError};

use apdulink_frame::{Command, Response, StatusSet};
use apdulink_transport::{DeviceEvent, FrameDevice, TransportError};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::TransportConfig;
use crate::dispatcher::{Control, Dispatcher};
use crate::error::Result;
use crate::handle::ResponseHandle;
use crate::queue::{PendingSend, SubmissionId};

/// Serialized command/response access to one packet device.
///
/// Commands go out strictly in submission order; each one is answered (or
/// fails) before the next reaches the wire. The device is opened on the
/// first exchange.
///
/// All work happens on a background task, so a `Transport` must be created
/// inside a tokio runtime. Dropping it closes the device and fails whatever
/// is still pending.
#[derive(Debug)]
pub struct Transport {
    control: mpsc::UnboundedSender<Control>,
    /// Held across queueing so ids reach the scheduler in numeric order.
    next_id: Mutex<u64>,
    config: TransportConfig,
}

impl Transport {
    /// Bind `device` with no hot-plug source.
    pub fn new(device: Arc<dyn FrameDevice>, config: TransportConfig) -> Result<Self> {
        Self::build(device, None, config)
    }

    /// Bind `device` and follow the connect/disconnect events on `events`.
    pub fn with_hotplug(
        device: Arc<dyn FrameDevice>,
        events: mpsc::Receiver<DeviceEvent>,
        config: TransportConfig,
    ) -> Result<Self> {
        Self::build(device, Some(events), config)
    }

    fn build(
        device: Arc<dyn FrameDevice>,
        events: Option<mpsc::Receiver<DeviceEvent>>,
        config: TransportConfig,
    ) -> Result<Self> {
        config.validate()?;
        if device.packet_size() != config.packet_size {
            return Err(TransportError::InvalidFrameSize {
                expected: device.packet_size(),
                actual: config.packet_size,
            }
            .into());
        }

        let (control, control_rx) = mpsc::unbounded_channel();
        Dispatcher::spawn(device, config.clone(), control_rx, events);
        Ok(Self {
            control,
            next_id: Mutex::new(1),
            config,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Queue a command built from its parts.
    ///
    /// A payload over 255 bytes is rejected here: the handle resolves with
    /// [`FrameError::PayloadTooLarge`](apdulink_frame::FrameError::PayloadTooLarge)
    /// and nothing is transmitted.
    pub fn send(
        &self,
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        payload: impl Into<Bytes>,
        allowed: impl Into<StatusSet>,
    ) -> ResponseHandle {
        match Command::new(cla, ins, p1, p2, payload) {
            Ok(command) => self.submit(command, allowed.into()),
            Err(err) => {
                let id = {
                    let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
                    take_id(&mut next)
                };
                debug!(id = %id, error = %err, "command rejected before queueing");
                ResponseHandle::settled(id, Err(err.into()))
            }
        }
    }

    /// Queue `command`; the response status must be in `allowed`.
    pub fn submit(&self, command: Command, allowed: StatusSet) -> ResponseHandle {
        let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = take_id(&mut next);
        let (handle, result) = ResponseHandle::new(id);
        let entry = PendingSend::new(id, command, allowed, result);
        // On failure the entry is dropped, which resolves the handle as closed.
        if self.control.send(Control::Submit(entry)).is_err() {
            debug!(id = %id, "send on closed transport");
        }
        handle
    }

    /// Run `command` and accept only `0x9000`.
    pub async fn exchange(&self, command: Command) -> Result<Response> {
        self.submit(command, StatusSet::default()).await
    }

    /// Close the device and fail every pending command with
    /// [`SessionError::Closed`]. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        if self.control.send(Control::Close(reply)).is_err() {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}

fn take_id(next: &mut u64) -> SubmissionId {
    let id = SubmissionId(*next);
    *next += 1;
    id
}
