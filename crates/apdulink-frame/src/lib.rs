//! APDU framing over fixed-size packets, with channel demultiplexing.
//!
//! Every packet exchanged with the device starts with a 5-byte header:
//! - a 2-byte big-endian channel id correlating a command with its response
//! - a 1-byte protocol tag ([`PROTOCOL_TAG`])
//! - a 2-byte big-endian sequence number, 0-based per message
//!
//! The first packet of a message additionally carries the 2-byte big-endian
//! message length; the last packet is zero-padded to the packet size.

pub mod apdu;
pub mod codec;
pub mod demux;
pub mod error;
pub mod reassembly;
pub mod status;

pub use apdu::{Command, Response, StatusSet, MAX_PAYLOAD};
pub use codec::{
    encode_command, encode_command_on, encode_message, encode_response, frame_count,
    random_channel, EncodedCommand, Frame, FrameConfig, FrameHeader, DEFAULT_PACKET_SIZE,
    HEADER_SIZE, MIN_PACKET_SIZE, PROTOCOL_TAG,
};
pub use demux::{ChannelDemux, Delivery};
pub use error::{FrameError, Result};
pub use reassembly::{decode_response, MessageAssembler};
pub use status::{describe, status_name};
