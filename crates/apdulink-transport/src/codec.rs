use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TransportError;

/// `tokio_util` codec that cuts a byte stream into fixed-size packets.
///
/// Stream sockets have no packet boundaries of their own, so a socket-backed
/// device relies on every packet having the same length.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    packet_size: usize,
}

impl PacketCodec {
    pub fn new(packet_size: usize) -> Self {
        Self { packet_size }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }
}

impl Decoder for PacketCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < self.packet_size {
            src.reserve(self.packet_size - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(self.packet_size).freeze()))
    }
}

impl Encoder<Bytes> for PacketCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() != self.packet_size {
            return Err(TransportError::InvalidFrameSize {
                expected: self.packet_size,
                actual: item.len(),
            });
        }
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_waits_for_full_packet() {
        let mut codec = PacketCodec::new(4);
        let mut buf = BytesMut::from(&[1u8, 2, 3][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.put_u8(4);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.as_ref(), &[1, 2, 3, 4]);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_splits_back_to_back_packets() {
        let mut codec = PacketCodec::new(2);
        let mut buf = BytesMut::from(&[1u8, 2, 3, 4, 5][..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), &[1, 2]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), &[3, 4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.as_ref(), &[5]);
    }

    #[test]
    fn encode_rejects_short_packet() {
        let mut codec = PacketCodec::new(4);
        let mut dst = BytesMut::new();
        let err = codec
            .encode(Bytes::from_static(&[1, 2]), &mut dst)
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::InvalidFrameSize {
                expected: 4,
                actual: 2
            }
        ));
        assert!(dst.is_empty());
    }
}
