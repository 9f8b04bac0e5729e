use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::apdu::{Response, StatusSet};
use crate::codec::{Frame, LENGTH_PREFIX_SIZE, PROTOCOL_TAG};
use crate::error::{FrameError, Result};
use crate::status;

/// Collects the packets of one message on one channel.
///
/// The first packet announces the message length; once that many bytes have
/// arrived the message is complete and the padding of the final packet is
/// cut off.
#[derive(Debug)]
pub struct MessageAssembler {
    channel: u16,
    expected_len: Option<usize>,
    next_sequence: u16,
    buf: BytesMut,
}

impl MessageAssembler {
    pub fn new(channel: u16) -> Self {
        Self {
            channel,
            expected_len: None,
            next_sequence: 0,
            buf: BytesMut::new(),
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Announced message length; `None` until the first packet arrived.
    pub fn expected_len(&self) -> Option<usize> {
        self.expected_len
    }

    /// Feed the next packet.
    ///
    /// Returns the complete message once the announced length is reached.
    /// A zero-length announcement completes on the first packet.
    pub fn push(&mut self, frame: &Frame) -> Result<Option<Bytes>> {
        let header = frame.header;
        if header.channel != self.channel {
            return Err(FrameError::ChannelMismatch {
                expected: self.channel,
                found: header.channel,
            });
        }
        if header.tag != PROTOCOL_TAG {
            return Err(FrameError::UnexpectedTag {
                expected: PROTOCOL_TAG,
                found: header.tag,
            });
        }
        if header.sequence != self.next_sequence {
            return Err(FrameError::OutOfSequence {
                channel: self.channel,
                expected: self.next_sequence,
                found: header.sequence,
            });
        }
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let expected_len = match self.expected_len {
            Some(len) => {
                self.buf.extend_from_slice(&frame.payload);
                len
            }
            None => {
                if frame.payload.len() < LENGTH_PREFIX_SIZE {
                    return Err(FrameError::Truncated {
                        len: frame.payload.len(),
                        min: LENGTH_PREFIX_SIZE,
                    });
                }
                let len = u16::from_be_bytes([frame.payload[0], frame.payload[1]]) as usize;
                self.expected_len = Some(len);
                self.buf
                    .extend_from_slice(&frame.payload[LENGTH_PREFIX_SIZE..]);
                len
            }
        };

        trace!(
            channel = self.channel,
            sequence = header.sequence,
            received = self.buf.len(),
            expected = expected_len,
            "frame accumulated"
        );

        if self.buf.len() < expected_len {
            return Ok(None);
        }

        let message = self.buf.split_to(expected_len).freeze();
        debug!(
            channel = self.channel,
            frames = self.next_sequence,
            len = message.len(),
            "message reassembled"
        );
        Ok(Some(message))
    }
}

/// Split a reassembled response into body and status code and check the
/// status against `allowed`.
pub fn decode_response(message: Bytes, allowed: &StatusSet) -> Result<Response> {
    if message.len() < 2 {
        return Err(FrameError::MissingStatus(message.len()));
    }
    let split = message.len() - 2;
    let code = u16::from_be_bytes([message[split], message[split + 1]]);

    if !allowed.contains(code) {
        return Err(FrameError::Status {
            code,
            label: status::describe(code),
        });
    }

    Ok(Response {
        status: code,
        data: message.slice(..split),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::Command;
    use crate::codec::{encode_command_on, encode_message, encode_response, FrameHeader};

    fn assemble(frames: Vec<Bytes>, channel: u16) -> Bytes {
        let mut assembler = MessageAssembler::new(channel);
        let count = frames.len();
        for (i, raw) in frames.into_iter().enumerate() {
            let frame = Frame::parse(raw).unwrap();
            match assembler.push(&frame).unwrap() {
                Some(message) => {
                    assert_eq!(i + 1, count, "completed before the last frame");
                    return message;
                }
                None => assert!(i + 1 < count, "last frame did not complete"),
            }
        }
        panic!("message never completed");
    }

    #[test]
    fn command_roundtrip_through_assembler() {
        for len in [0usize, 1, 52, 53, 111, 255] {
            let cmd = Command::new(0xe0, 0x44, 0x01, 0x80, vec![0x5a; len]).unwrap();
            let encoded = encode_command_on(&cmd, 0x0a0b, 64).unwrap();
            let apdu = assemble(encoded.frames, 0x0a0b);
            assert_eq!(Command::parse_apdu(&apdu).unwrap(), cmd);
        }
    }

    #[test]
    fn response_roundtrip_strips_padding() {
        let body: Vec<u8> = (0..150u8).collect();
        let frames = encode_response(0x0101, &body, 0x9000, 64).unwrap();
        let message = assemble(frames, 0x0101);
        assert_eq!(message.len(), body.len() + 2);

        let response = decode_response(message, &StatusSet::default()).unwrap();
        assert_eq!(response.status, 0x9000);
        assert_eq!(response.data.as_ref(), body.as_slice());
    }

    #[test]
    fn disallowed_status_is_rejected() {
        let frames = encode_response(0x0101, b"nope", 0x6985, 64).unwrap();
        let message = assemble(frames, 0x0101);

        let err = decode_response(message.clone(), &StatusSet::default()).unwrap_err();
        assert!(matches!(err, FrameError::Status { code: 0x6985, .. }));
        assert_eq!(err.status_code(), Some(0x6985));
        assert!(err.to_string().contains("CONDITIONS_OF_USE_NOT_SATISFIED"));

        let response = decode_response(message, &StatusSet::from([0x9000, 0x6985])).unwrap();
        assert_eq!(response.status, 0x6985);
        assert_eq!(response.data.as_ref(), b"nope");
    }

    #[test]
    fn unknown_status_label_is_hex() {
        let frames = encode_response(1, b"", 0x1234, 64).unwrap();
        let err = decode_response(assemble(frames, 1), &StatusSet::default()).unwrap_err();
        match err {
            FrameError::Status { code, label } => {
                assert_eq!(code, 0x1234);
                assert_eq!(label, "0x1234");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn status_only_response_has_empty_data() {
        let frames = encode_response(0x2222, b"", 0x9000, 64).unwrap();
        let message = assemble(frames, 0x2222);
        assert_eq!(message.len(), 2);

        let response = decode_response(message, &StatusSet::default()).unwrap();
        assert!(response.data.is_empty());
        assert!(response.is_success());
    }

    #[test]
    fn zero_length_completes_on_first_frame() {
        let frames = encode_message(5, b"", 64).unwrap();
        let mut assembler = MessageAssembler::new(5);
        let message = assembler
            .push(&Frame::parse(frames[0].clone()).unwrap())
            .unwrap()
            .expect("zero length is a known, complete length");
        assert!(message.is_empty());
        assert_eq!(assembler.expected_len(), Some(0));

        let err = decode_response(message, &StatusSet::default()).unwrap_err();
        assert!(matches!(err, FrameError::MissingStatus(0)));
    }

    #[test]
    fn out_of_order_frame_is_rejected() {
        let frames = encode_response(3, &[0u8; 100], 0x9000, 64).unwrap();
        let mut assembler = MessageAssembler::new(3);
        let err = assembler
            .push(&Frame::parse(frames[1].clone()).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::OutOfSequence {
                channel: 3,
                expected: 0,
                found: 1
            }
        ));
    }

    #[test]
    fn wrong_tag_is_rejected() {
        let header = FrameHeader {
            channel: 3,
            tag: 0x02,
            sequence: 0,
        };
        let frame = Frame::new(header, vec![0u8; 59]);
        let err = MessageAssembler::new(3).push(&frame).unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnexpectedTag {
                expected: 0x05,
                found: 0x02
            }
        ));
    }

    #[test]
    fn foreign_channel_is_rejected() {
        let frame = Frame::new(FrameHeader::new(9, 0), vec![0u8; 59]);
        let err = MessageAssembler::new(3).push(&frame).unwrap_err();
        assert!(matches!(
            err,
            FrameError::ChannelMismatch {
                expected: 3,
                found: 9
            }
        ));
    }
}
