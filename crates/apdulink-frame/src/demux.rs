//! Routing of inbound packets to the reader waiting on their channel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::trace;

use crate::codec::Frame;
use crate::error::{FrameError, Result};

/// What [`ChannelDemux::on_frame`] did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed straight to the reader waiting on the channel.
    Handed,
    /// Queued until the next read on the channel.
    Buffered,
}

/// Buffered packets plus at most one waiting reader.
///
/// Never holds both a non-empty buffer and a live waiter: a read drains the
/// buffer before it registers, and an arriving packet goes to the waiter
/// before it is buffered.
#[derive(Debug, Default)]
struct ChannelSlot {
    buffered: VecDeque<Frame>,
    waiter: Option<oneshot::Sender<Frame>>,
}

impl ChannelSlot {
    fn is_idle(&self) -> bool {
        self.buffered.is_empty() && self.waiter.is_none()
    }
}

/// Per-channel inbound queues.
///
/// The lock is only ever held for synchronous bookkeeping, never across an
/// await, so packet arrival and reads may come from different tasks.
#[derive(Debug, Default)]
pub struct ChannelDemux {
    slots: Mutex<HashMap<u16, ChannelSlot>>,
}

impl ChannelDemux {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<u16, ChannelSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route an inbound packet to its channel.
    pub fn on_frame(&self, frame: Frame) -> Delivery {
        let channel = frame.channel();
        let mut slots = self.slots();
        let slot = slots.entry(channel).or_default();

        let frame = match slot.waiter.take() {
            Some(waiter) => match waiter.send(frame) {
                Ok(()) => {
                    if slot.is_idle() {
                        slots.remove(&channel);
                    }
                    trace!(channel, "frame handed to waiting reader");
                    return Delivery::Handed;
                }
                // Reader gave up (timeout); keep the packet.
                Err(frame) => frame,
            },
            None => frame,
        };

        slot.buffered.push_back(frame);
        trace!(channel, depth = slot.buffered.len(), "frame buffered");
        Delivery::Buffered
    }

    /// Next packet for `channel`, in arrival order.
    ///
    /// Returns immediately when a packet is buffered; otherwise registers as
    /// the channel's single waiter and suspends until one arrives.
    pub async fn read(&self, channel: u16) -> Result<Frame> {
        let waiter = {
            let mut slots = self.slots();
            let slot = slots.entry(channel).or_default();

            if let Some(frame) = slot.buffered.pop_front() {
                if slot.is_idle() {
                    slots.remove(&channel);
                }
                return Ok(frame);
            }
            if slot.waiter.as_ref().is_some_and(|w| !w.is_closed()) {
                return Err(FrameError::ReaderBusy(channel));
            }

            let (tx, rx) = oneshot::channel();
            slot.waiter = Some(tx);
            rx
        };

        waiter.await.map_err(|_| FrameError::ChannelClosed(channel))
    }

    /// Forget a channel: drop its buffered packets and wake any waiter with
    /// [`FrameError::ChannelClosed`]. Returns how many packets were dropped.
    pub fn discard(&self, channel: u16) -> usize {
        self.slots()
            .remove(&channel)
            .map_or(0, |slot| slot.buffered.len())
    }

    /// Drop every channel that has no live reader. Returns how many
    /// buffered packets went with them.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        self.slots().retain(|_, slot| {
            if slot.waiter.as_ref().is_some_and(|w| !w.is_closed()) {
                return true;
            }
            dropped += slot.buffered.len();
            false
        });
        dropped
    }

    /// Number of channels holding buffered packets or a reader.
    pub fn channel_count(&self) -> usize {
        self.slots().len()
    }

    /// Number of packets waiting to be read on `channel`.
    pub fn buffered(&self, channel: u16) -> usize {
        self.slots()
            .get(&channel)
            .map_or(0, |slot| slot.buffered.len())
    }

    /// Whether a live reader is registered on `channel`.
    pub fn has_waiter(&self, channel: u16) -> bool {
        self.slots()
            .get(&channel)
            .and_then(|slot| slot.waiter.as_ref())
            .is_some_and(|w| !w.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::apdu::Command;
    use crate::codec::{encode_command_on, FrameHeader};
    use crate::reassembly::MessageAssembler;

    fn frame(channel: u16, sequence: u16, byte: u8) -> Frame {
        Frame::new(FrameHeader::new(channel, sequence), vec![byte; 59])
    }

    async fn wait_for_waiter(demux: &ChannelDemux, channel: u16) {
        for _ in 0..200 {
            if demux.has_waiter(channel) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("reader never registered on channel {channel:#06x}");
    }

    #[tokio::test]
    async fn unclaimed_frames_are_read_in_fifo_order() {
        let demux = ChannelDemux::new();
        for seq in 0..3 {
            assert_eq!(demux.on_frame(frame(7, seq, seq as u8)), Delivery::Buffered);
        }
        assert_eq!(demux.buffered(7), 3);

        for seq in 0..3 {
            let got = demux.read(7).await.unwrap();
            assert_eq!(got.sequence(), seq);
        }
        assert_eq!(demux.buffered(7), 0);
    }

    #[tokio::test]
    async fn waiting_reader_receives_frame_without_buffering() {
        let demux = Arc::new(ChannelDemux::new());
        let reader = {
            let demux = Arc::clone(&demux);
            tokio::spawn(async move { demux.read(0x1234).await })
        };
        wait_for_waiter(&demux, 0x1234).await;

        assert_eq!(demux.on_frame(frame(0x1234, 0, 0xaa)), Delivery::Handed);
        assert_eq!(demux.buffered(0x1234), 0);
        assert!(!demux.has_waiter(0x1234));

        let got = reader.await.unwrap().unwrap();
        assert_eq!(got.payload[0], 0xaa);
    }

    #[tokio::test]
    async fn channels_do_not_mix() {
        let demux = ChannelDemux::new();
        demux.on_frame(frame(1, 0, 0x01));
        demux.on_frame(frame(2, 0, 0x02));
        demux.on_frame(frame(1, 1, 0x11));

        assert_eq!(demux.read(2).await.unwrap().payload[0], 0x02);
        assert_eq!(demux.read(1).await.unwrap().payload[0], 0x01);
        assert_eq!(demux.read(1).await.unwrap().payload[0], 0x11);
    }

    #[tokio::test]
    async fn second_reader_on_channel_is_rejected() {
        let demux = Arc::new(ChannelDemux::new());
        let first = {
            let demux = Arc::clone(&demux);
            tokio::spawn(async move { demux.read(5).await })
        };
        wait_for_waiter(&demux, 5).await;

        let err = demux.read(5).await.unwrap_err();
        assert!(matches!(err, FrameError::ReaderBusy(5)));

        demux.on_frame(frame(5, 0, 0x55));
        assert_eq!(first.await.unwrap().unwrap().payload[0], 0x55);
    }

    #[tokio::test]
    async fn abandoned_reader_does_not_lose_frame() {
        let demux = ChannelDemux::new();
        let timed_out = tokio::time::timeout(Duration::from_millis(10), demux.read(9)).await;
        assert!(timed_out.is_err());
        assert!(!demux.has_waiter(9));

        assert_eq!(demux.on_frame(frame(9, 0, 0x99)), Delivery::Buffered);
        assert_eq!(demux.read(9).await.unwrap().payload[0], 0x99);
    }

    #[tokio::test]
    async fn discard_wakes_waiter_and_drops_buffer() {
        let demux = Arc::new(ChannelDemux::new());
        demux.on_frame(frame(3, 0, 0));
        demux.on_frame(frame(3, 1, 0));
        assert_eq!(demux.discard(3), 2);
        assert_eq!(demux.buffered(3), 0);

        let reader = {
            let demux = Arc::clone(&demux);
            tokio::spawn(async move { demux.read(3).await })
        };
        wait_for_waiter(&demux, 3).await;
        assert_eq!(demux.discard(3), 0);

        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ChannelClosed(3)));
    }

    #[tokio::test]
    async fn clear_keeps_only_live_readers() {
        let demux = Arc::new(ChannelDemux::new());
        // Late answers to exchanges that already ended.
        for channel in 100..110 {
            for seq in 0..3 {
                demux.on_frame(frame(channel, seq, 0));
            }
        }
        let reader = {
            let demux = Arc::clone(&demux);
            tokio::spawn(async move { demux.read(2).await })
        };
        wait_for_waiter(&demux, 2).await;
        assert_eq!(demux.channel_count(), 11);

        assert_eq!(demux.clear(), 30);
        assert_eq!(demux.channel_count(), 1);
        assert!(demux.has_waiter(2));

        demux.on_frame(frame(2, 0, 0x02));
        assert_eq!(reader.await.unwrap().unwrap().payload[0], 0x02);
        assert_eq!(demux.channel_count(), 0);
    }

    #[tokio::test]
    async fn loopback_reassembles_commands() {
        let demux = Arc::new(ChannelDemux::new());

        for len in 0usize..=255 {
            let cmd = Command::new(0xe0, 0x10, 0x00, 0x01, vec![len as u8; len]).unwrap();
            let encoded = encode_command_on(&cmd, 0x0b0b, 64).unwrap();
            let noise = encode_command_on(&cmd, 0x0c0c, 64).unwrap();

            let feeder = {
                let demux = Arc::clone(&demux);
                tokio::spawn(async move {
                    for (raw, other) in encoded.frames.into_iter().zip(noise.frames) {
                        demux.on_frame(Frame::parse(other).unwrap());
                        demux.on_frame(Frame::parse(raw).unwrap());
                        tokio::task::yield_now().await;
                    }
                })
            };

            let mut assembler = MessageAssembler::new(0x0b0b);
            let apdu: Bytes = loop {
                let next = demux.read(0x0b0b).await.unwrap();
                if let Some(message) = assembler.push(&next).unwrap() {
                    break message;
                }
            };
            feeder.await.unwrap();

            assert_eq!(Command::parse_apdu(&apdu).unwrap(), cmd);
            demux.discard(0x0c0c);
        }
    }
}
