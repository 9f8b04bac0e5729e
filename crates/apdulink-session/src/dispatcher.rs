//! The scheduler task behind a [`Transport`](crate::Transport).
//!
//! One task owns the device binding, the inbound listener, the send queue and
//! the exchange currently on the wire. Everything else talks to it through
//! channels.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use apdulink_frame::{
    decode_response, encode_command, ChannelDemux, Frame, MessageAssembler, Response,
};
use apdulink_transport::{DeviceEvent, DeviceId, FrameDevice, TransportError};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::TransportConfig;
use crate::error::{Result, SessionError};
use crate::queue::{Job, PendingSend, SendQueue, SubmissionId};

/// Requests from the [`Transport`](crate::Transport) facade.
#[derive(Debug)]
pub(crate) enum Control {
    Submit(PendingSend),
    Close(oneshot::Sender<Result<()>>),
}

type Exchange = Pin<Box<dyn Future<Output = (SubmissionId, Result<Response>)> + Send>>;

/// Pump task reading packets off one device.
#[derive(Debug)]
struct Listener {
    device: DeviceId,
    task: JoinHandle<()>,
}

pub(crate) struct Dispatcher {
    config: TransportConfig,
    device: Arc<dyn FrameDevice>,
    demux: Arc<ChannelDemux>,
    queue: SendQueue,
    listener: Option<Listener>,
    inbound: mpsc::UnboundedSender<Bytes>,
}

impl Dispatcher {
    /// Spawn the scheduler loop.
    pub(crate) fn spawn(
        device: Arc<dyn FrameDevice>,
        config: TransportConfig,
        control: mpsc::UnboundedReceiver<Control>,
        hotplug: Option<mpsc::Receiver<DeviceEvent>>,
    ) -> JoinHandle<()> {
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            config,
            device,
            demux: Arc::new(ChannelDemux::new()),
            queue: SendQueue::default(),
            listener: None,
            inbound,
        };
        tokio::spawn(dispatcher.run(control, inbound_rx, hotplug))
    }

    async fn run(
        mut self,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut inbound: mpsc::UnboundedReceiver<Bytes>,
        mut hotplug: Option<mpsc::Receiver<DeviceEvent>>,
    ) {
        info!(device = %self.device.id(), packet_size = self.config.packet_size, "transport started");
        self.attach();

        let mut active: Option<Exchange> = None;
        loop {
            if active.is_none() {
                if let Some(job) = self.queue.start_next() {
                    active = Some(self.start(job));
                }
            }

            tokio::select! {
                biased;

                event = next_event(&mut hotplug) => match event {
                    Some(event) => self.on_hotplug(event).await,
                    None => {
                        debug!("hot-plug source gone");
                        hotplug = None;
                    }
                },

                Some(raw) = inbound.recv() => self.route(raw, active.is_some()),

                request = control.recv() => match request {
                    Some(Control::Submit(entry)) => self.queue.push(entry),
                    Some(Control::Close(reply)) => {
                        control.close();
                        let result = self.shutdown().await;
                        drain(&mut control);
                        let _ = reply.send(result);
                        break;
                    }
                    None => {
                        let _ = self.shutdown().await;
                        break;
                    }
                },

                (id, result) = drive(&mut active), if active.is_some() => {
                    active = None;
                    match &result {
                        Ok(response) => debug!(id = %id, status = response.status, len = response.data.len(), "command settled"),
                        Err(err) => debug!(id = %id, error = %err, "command failed"),
                    }
                    self.queue.settle(id, result);
                    let stale = self.demux.clear();
                    if stale > 0 {
                        debug!(stale, "dropped frames nobody read");
                    }
                }
            }
        }
    }

    fn start(&self, job: Job) -> Exchange {
        debug!(id = %job.id, cla = job.command.cla(), ins = job.command.ins(), "command started");
        let device = Arc::clone(&self.device);
        let demux = Arc::clone(&self.demux);
        let config = self.config.clone();
        Box::pin(async move {
            let id = job.id;
            (id, exchange(device, demux, &config, job).await)
        })
    }

    /// Parse an inbound packet and hand it to its channel.
    ///
    /// With no exchange running nobody can claim the packet, so it is dropped.
    fn route(&self, raw: Bytes, busy: bool) {
        match Frame::parse(raw) {
            Ok(frame) if busy => {
                trace!(channel = frame.channel(), sequence = frame.sequence(), "frame received");
                self.demux.on_frame(frame);
            }
            Ok(frame) => {
                debug!(channel = frame.channel(), sequence = frame.sequence(), "dropping unsolicited frame");
            }
            Err(err) => warn!(device = %self.device.id(), error = %err, "dropping malformed inbound frame"),
        }
    }

    async fn on_hotplug(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected(device) => {
                if device.id() == self.device.id() {
                    info!(device = %device.id(), "device reconnected");
                } else {
                    warn!(bound = %self.device.id(), device = %device.id(), "rebinding to a different device");
                }
                if device.packet_size() != self.config.packet_size {
                    warn!(
                        device = %device.id(),
                        packet_size = device.packet_size(),
                        expected = self.config.packet_size,
                        "connected device uses a different packet size"
                    );
                }
                self.detach().await;
                self.device = device;
                self.attach();
            }
            DeviceEvent::Disconnected(device) => {
                let bound = self
                    .listener
                    .as_ref()
                    .is_some_and(|listener| &listener.device == device.id());
                if bound {
                    info!(device = %device.id(), "device disconnected");
                    self.detach().await;
                } else {
                    debug!(device = %device.id(), "ignoring disconnect of unbound device");
                }
            }
        }
    }

    fn attach(&mut self) {
        let device = Arc::clone(&self.device);
        let inbound = self.inbound.clone();
        let id = device.id().clone();
        debug!(device = %id, "listener attached");
        self.listener = Some(Listener {
            device: id,
            task: tokio::spawn(pump(device, inbound)),
        });
    }

    async fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.task.abort();
            let _ = listener.task.await;
            debug!(device = %listener.device, "listener detached");
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.detach().await;
        let closed = self.device.close().await;
        if let Some(id) = self.queue.in_flight() {
            debug!(id = %id, pending = self.queue.len(), "abandoning in-flight command");
        }
        let failed = self.queue.close_all();
        info!(device = %self.device.id(), failed, "transport closed");
        closed.map_err(SessionError::from)
    }
}

/// Settle whatever raced in behind a close request.
fn drain(control: &mut mpsc::UnboundedReceiver<Control>) {
    while let Ok(request) = control.try_recv() {
        match request {
            Control::Submit(entry) => {
                let _ = entry.result.send(Err(SessionError::Closed));
            }
            Control::Close(reply) => {
                let _ = reply.send(Ok(()));
            }
        }
    }
}

async fn next_event(hotplug: &mut Option<mpsc::Receiver<DeviceEvent>>) -> Option<DeviceEvent> {
    match hotplug {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn drive(active: &mut Option<Exchange>) -> (SubmissionId, Result<Response>) {
    match active {
        Some(exchange) => exchange.await,
        None => std::future::pending().await,
    }
}

/// Forward every packet the device produces to the scheduler.
async fn pump(device: Arc<dyn FrameDevice>, inbound: mpsc::UnboundedSender<Bytes>) {
    loop {
        match device.read_frame().await {
            Ok(raw) => {
                if inbound.send(raw).is_err() {
                    return;
                }
            }
            Err(TransportError::Closed) => {
                debug!(device = %device.id(), "device stopped delivering frames");
                return;
            }
            Err(err) => {
                warn!(device = %device.id(), error = %err, "inbound read failed");
                tokio::task::yield_now().await;
            }
        }
    }
}

/// Drops whatever is left on a channel once its exchange ends.
struct ChannelLease {
    demux: Arc<ChannelDemux>,
    channel: u16,
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        let dropped = self.demux.discard(self.channel);
        if dropped > 0 {
            debug!(channel = self.channel, dropped, "discarded leftover frames");
        }
    }
}

/// Encode, transmit and await the answer to one command.
async fn exchange(
    device: Arc<dyn FrameDevice>,
    demux: Arc<ChannelDemux>,
    config: &TransportConfig,
    job: Job,
) -> Result<Response> {
    let encoded = encode_command(&job.command, config.packet_size)?;
    let channel = encoded.channel;
    let _lease = ChannelLease {
        demux: Arc::clone(&demux),
        channel,
    };

    if !device.is_open() {
        device.open().await?;
        info!(device = %device.id(), "device opened");
    }

    for (sequence, frame) in encoded.frames.iter().enumerate() {
        write_frame(device.as_ref(), frame, config.write_timeout).await?;
        trace!(channel, sequence, "frame written");
    }
    debug!(id = %job.id, channel, frames = encoded.frames.len(), "command transmitted");

    let message = match config.response_timeout {
        Some(limit) => tokio::time::timeout(limit, collect(&demux, channel))
            .await
            .map_err(|_| SessionError::Stalled {
                channel,
                timeout: limit,
            })??,
        None => collect(&demux, channel).await?,
    };
    Ok(decode_response(message, &job.allowed)?)
}

async fn write_frame(device: &dyn FrameDevice, frame: &[u8], limit: Option<Duration>) -> Result<()> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, device.write_frame(frame))
            .await
            .map_err(|_| SessionError::WriteTimeout(limit))??,
        None => device.write_frame(frame).await?,
    }
    Ok(())
}

async fn collect(demux: &ChannelDemux, channel: u16) -> Result<Bytes> {
    let mut assembler = MessageAssembler::new(channel);
    loop {
        let frame = demux.read(channel).await?;
        if let Some(message) = assembler.push(&frame)? {
            return Ok(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use apdulink_frame::{encode_response, Command, StatusSet};
    use apdulink_transport::{DeviceEndpoint, MemoryDevice};

    use super::*;

    struct Harness {
        demux: Arc<ChannelDemux>,
        control: mpsc::UnboundedSender<Control>,
        next_id: u64,
    }

    impl Harness {
        fn start(device: Arc<dyn FrameDevice>, config: TransportConfig) -> Self {
            let demux = Arc::new(ChannelDemux::new());
            let (inbound, inbound_rx) = mpsc::unbounded_channel();
            let (control, control_rx) = mpsc::unbounded_channel();
            let dispatcher = Dispatcher {
                config,
                device,
                demux: Arc::clone(&demux),
                queue: SendQueue::default(),
                listener: None,
                inbound,
            };
            tokio::spawn(dispatcher.run(control_rx, inbound_rx, None));
            Self {
                demux,
                control,
                next_id: 1,
            }
        }

        fn submit(&mut self, ins: u8) -> oneshot::Receiver<Result<Response>> {
            let id = SubmissionId(self.next_id);
            self.next_id += 1;
            let (tx, rx) = oneshot::channel();
            let command = Command::header_only(0xe0, ins, 0, 0);
            let entry = PendingSend::new(id, command, StatusSet::default(), tx);
            self.control.send(Control::Submit(entry)).unwrap();
            rx
        }
    }

    async fn next_channel(endpoint: &mut DeviceEndpoint) -> u16 {
        let frame = Frame::parse(endpoint.recv_frame().await.unwrap()).unwrap();
        frame.channel()
    }

    fn answer(endpoint: &DeviceEndpoint, channel: u16, data: &[u8]) {
        for frame in encode_response(channel, data, 0x9000, 64).unwrap() {
            endpoint.send_frame(frame).unwrap();
        }
    }

    async fn wait_until_empty(demux: &ChannelDemux) {
        for _ in 0..100 {
            if demux.channel_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("demux still holds {} channels", demux.channel_count());
    }

    #[tokio::test]
    async fn late_reply_after_stall_is_not_buffered() {
        let config = TransportConfig {
            response_timeout: Some(Duration::from_millis(50)),
            ..TransportConfig::default()
        };
        let (device, mut endpoint) = MemoryDevice::pair("nano", 64);
        let mut harness = Harness::start(Arc::new(device), config);

        let stalled = harness.submit(0x01);
        let channel = next_channel(&mut endpoint).await;
        assert!(matches!(
            stalled.await.unwrap(),
            Err(SessionError::Stalled { .. })
        ));

        // Long reply, well past the deadline.
        answer(&endpoint, channel, &[0x11; 150]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        wait_until_empty(&harness.demux).await;

        let answered = harness.submit(0x02);
        let channel = next_channel(&mut endpoint).await;
        // Unsolicited traffic on an unrelated channel mid-exchange.
        answer(&endpoint, channel.wrapping_add(1), b"noise");
        answer(&endpoint, channel, b"ok");
        assert_eq!(answered.await.unwrap().unwrap().data.as_ref(), b"ok");
        wait_until_empty(&harness.demux).await;
    }
}
