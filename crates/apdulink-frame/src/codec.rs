use bytes::{BufMut, Bytes, BytesMut};

use crate::apdu::Command;
use crate::error::{FrameError, Result};

/// Packet header: channel (2) + tag (1) + sequence (2) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Protocol tag carried by every APDU packet.
pub const PROTOCOL_TAG: u8 = 0x05;

/// Packet size of HID-attached devices.
pub const DEFAULT_PACKET_SIZE: usize = 64;

/// Big-endian message length at the start of a message's first packet.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Smallest packet that still carries header, length prefix and one byte.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + LENGTH_PREFIX_SIZE + 1;

/// Header of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub channel: u16,
    pub tag: u8,
    pub sequence: u16,
}

impl FrameHeader {
    /// Header for an APDU packet.
    pub fn new(channel: u16, sequence: u16) -> Self {
        Self {
            channel,
            tag: PROTOCOL_TAG,
            sequence,
        }
    }

    fn write(&self, dst: &mut BytesMut) {
        dst.put_u16(self.channel);
        dst.put_u8(self.tag);
        dst.put_u16(self.sequence);
    }
}

/// One fixed-size packet: header plus payload slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    /// Everything after the header, padding included.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// Split a raw packet into header and payload.
    ///
    /// The tag is not checked here; that is up to whoever assembles the
    /// message.
    pub fn parse(mut raw: Bytes) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                len: raw.len(),
                min: HEADER_SIZE,
            });
        }
        let header = FrameHeader {
            channel: u16::from_be_bytes([raw[0], raw[1]]),
            tag: raw[2],
            sequence: u16::from_be_bytes([raw[3], raw[4]]),
        };
        let payload = raw.split_off(HEADER_SIZE);
        Ok(Self { header, payload })
    }

    pub fn channel(&self) -> u16 {
        self.header.channel
    }

    pub fn sequence(&self) -> u16 {
        self.header.sequence
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize back into a raw packet.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        self.header.write(&mut dst);
        dst.put_slice(&self.payload);
        dst.freeze()
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Fixed packet size in bytes. Default: 64.
    pub packet_size: usize,
}

impl FrameConfig {
    pub fn validate(&self) -> Result<()> {
        validate_packet_size(self.packet_size)
    }

    /// Payload bytes carried per packet.
    pub fn block_size(&self) -> usize {
        self.packet_size.saturating_sub(HEADER_SIZE)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }
}

fn validate_packet_size(packet_size: usize) -> Result<()> {
    if packet_size < MIN_PACKET_SIZE {
        return Err(FrameError::InvalidPacketSize {
            size: packet_size,
            min: MIN_PACKET_SIZE,
        });
    }
    Ok(())
}

/// Number of packets needed for a message of `message_len` bytes.
pub fn frame_count(message_len: usize, packet_size: usize) -> usize {
    let block_size = packet_size.saturating_sub(HEADER_SIZE).max(1);
    (LENGTH_PREFIX_SIZE + message_len).div_ceil(block_size)
}

/// Split a message into packets on `channel`.
///
/// Wire format:
/// ```text
/// first packet  ┌─────────┬─────┬──────────┬────────────┬──────────────────┐
///               │ channel │ tag │ seq = 0  │ length     │ message ...      │
///               │ (2B BE) │ 05  │ (2B BE)  │ (2B BE)    │                  │
///               └─────────┴─────┴──────────┴────────────┴──────────────────┘
/// next packets  ┌─────────┬─────┬──────────┬──────────────────────────────┐
///               │ channel │ 05  │ seq = n  │ message ... (zero padded)    │
///               └─────────┴─────┴──────────┴──────────────────────────────┘
/// ```
pub fn encode_message(channel: u16, message: &[u8], packet_size: usize) -> Result<Vec<Bytes>> {
    validate_packet_size(packet_size)?;
    if message.len() > u16::MAX as usize {
        return Err(FrameError::MessageTooLarge {
            size: message.len(),
            max: u16::MAX as usize,
        });
    }

    let block_size = packet_size - HEADER_SIZE;
    let count = frame_count(message.len(), packet_size);

    let mut data = BytesMut::with_capacity(count * block_size);
    data.put_u16(message.len() as u16);
    data.put_slice(message);
    data.resize(count * block_size, 0);

    let mut frames = Vec::with_capacity(count);
    for (sequence, block) in data.chunks(block_size).enumerate() {
        let mut frame = BytesMut::with_capacity(packet_size);
        // At most 65535 + 2 bytes over blocks of 3 or more: fits u16.
        FrameHeader::new(channel, sequence as u16).write(&mut frame);
        frame.put_slice(block);
        frames.push(frame.freeze());
    }
    Ok(frames)
}

/// Packets of one outbound command plus the channel they were sent on.
#[derive(Debug, Clone)]
pub struct EncodedCommand {
    pub channel: u16,
    pub frames: Vec<Bytes>,
}

/// Encode a command on a fresh random channel.
///
/// Channel ids are not checked for collisions. The transport only ever has
/// one response outstanding, so a repeat draw cannot mix up two responses.
pub fn encode_command(command: &Command, packet_size: usize) -> Result<EncodedCommand> {
    encode_command_on(command, random_channel(), packet_size)
}

/// Encode a command on a caller-chosen channel.
pub fn encode_command_on(
    command: &Command,
    channel: u16,
    packet_size: usize,
) -> Result<EncodedCommand> {
    let frames = encode_message(channel, &command.to_apdu(), packet_size)?;
    Ok(EncodedCommand { channel, frames })
}

/// Encode a device response: `data` followed by the big-endian status code.
pub fn encode_response(
    channel: u16,
    data: &[u8],
    status: u16,
    packet_size: usize,
) -> Result<Vec<Bytes>> {
    let mut message = BytesMut::with_capacity(data.len() + 2);
    message.put_slice(data);
    message.put_u16(status);
    encode_message(channel, &message, packet_size)
}

/// Draw a channel id from a v4 UUID's random bits.
pub fn random_channel() -> u16 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    u16::from_be_bytes([bytes[0], bytes[1]])
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn single_frame_layout_is_bit_exact() {
        let cmd = Command::header_only(0xe0, 0x01, 0x00, 0x00);
        let encoded = encode_command_on(&cmd, 0x1234, 64).unwrap();

        assert_eq!(encoded.channel, 0x1234);
        assert_eq!(encoded.frames.len(), 1);

        let frame = &encoded.frames[0];
        assert_eq!(frame.len(), 64);
        assert_eq!(
            &frame[..12],
            &[0x12, 0x34, 0x05, 0x00, 0x00, 0x00, 0x05, 0xe0, 0x01, 0x00, 0x00, 0x00]
        );
        assert!(frame[12..].iter().all(|b| *b == 0));
    }

    #[test]
    fn multi_frame_sequence_and_padding() {
        let payload: Vec<u8> = (0..100u8).collect();
        let cmd = Command::new(0xe0, 0x04, 0x00, 0x00, payload.clone()).unwrap();
        let encoded = encode_command_on(&cmd, 0xbeef, 64).unwrap();

        // 2 + 5 + 100 = 107 bytes over 59-byte blocks.
        assert_eq!(encoded.frames.len(), 2);

        let first = Frame::parse(encoded.frames[0].clone()).unwrap();
        let second = Frame::parse(encoded.frames[1].clone()).unwrap();
        assert_eq!(first.header, FrameHeader::new(0xbeef, 0));
        assert_eq!(second.header, FrameHeader::new(0xbeef, 1));
        assert_eq!(&first.payload[..2], &[0x00, 105]);

        let mut joined = first.payload.to_vec();
        joined.extend_from_slice(&second.payload);
        assert_eq!(&joined[7..107], payload.as_slice());
        assert!(joined[107..].iter().all(|b| *b == 0));
    }

    #[test]
    fn exact_block_fill_needs_no_extra_frame() {
        // 2 + 5 + 52 = 59: exactly one block.
        let cmd = Command::new(0xe0, 0x02, 0, 0, vec![0x11; 52]).unwrap();
        assert_eq!(encode_command_on(&cmd, 1, 64).unwrap().frames.len(), 1);

        let cmd = Command::new(0xe0, 0x02, 0, 0, vec![0x11; 53]).unwrap();
        assert_eq!(encode_command_on(&cmd, 1, 64).unwrap().frames.len(), 2);
    }

    #[test]
    fn rejects_tiny_packet_size() {
        let cmd = Command::header_only(0xe0, 0x01, 0, 0);
        let err = encode_command_on(&cmd, 1, 7).unwrap_err();
        assert!(matches!(err, FrameError::InvalidPacketSize { size: 7, min: 8 }));
        assert!(FrameConfig { packet_size: 7 }.validate().is_err());
        assert!(FrameConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_oversized_message() {
        let err = encode_message(1, &vec![0u8; 70_000], 64).unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { .. }));
    }

    #[test]
    fn response_appends_status_trailer() {
        let frames = encode_response(0x0101, b"ok", 0x9000, 64).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            &frames[0][..11],
            &[0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x04, b'o', b'k', 0x90, 0x00]
        );
    }

    #[test]
    fn parse_rejects_short_packet() {
        let err = Frame::parse(Bytes::from_static(&[0x01, 0x02, 0x05])).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { len: 3, min: 5 }));
    }

    #[test]
    fn parse_then_serialize_keeps_bytes() {
        let frames = encode_response(0x4242, b"data", 0x6985, 16).unwrap();
        for raw in frames {
            let frame = Frame::parse(raw.clone()).unwrap();
            assert_eq!(frame.to_bytes(), raw);
            assert_eq!(frame.wire_size(), 16);
        }
    }

    proptest! {
        #[test]
        fn chunk_count_matches_block_math(len in 0usize..=255) {
            let cmd = Command::new(0xe0, 0x01, 0, 0, vec![0xa5; len]).unwrap();
            let encoded = encode_command_on(&cmd, 7, 64).unwrap();
            let expected = (2 + 5 + len).div_ceil(59);

            prop_assert_eq!(encoded.frames.len(), expected);
            prop_assert_eq!(frame_count(cmd.apdu_len(), 64), expected);
            for (i, frame) in encoded.frames.iter().enumerate() {
                prop_assert_eq!(frame.len(), 64);
                let parsed = Frame::parse(frame.clone()).unwrap();
                prop_assert_eq!(parsed.header, FrameHeader::new(7, i as u16));
            }
        }

        #[test]
        fn every_packet_size_produces_full_frames(packet_size in MIN_PACKET_SIZE..=128, len in 0usize..=255) {
            let cmd = Command::new(0x80, 0x02, 1, 2, vec![0x3c; len]).unwrap();
            let encoded = encode_command_on(&cmd, 9, packet_size).unwrap();
            prop_assert!(encoded.frames.iter().all(|f| f.len() == packet_size));
            prop_assert_eq!(encoded.frames.len(), frame_count(cmd.apdu_len(), packet_size));
        }
    }
}
