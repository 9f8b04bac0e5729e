//! Framed APDU transport for secure-element devices.
//!
//! Commands are cut into fixed-size packets tagged with a random channel id,
//! sent one at a time, and answered with a reassembled response whose status
//! code is checked against the caller's allowed set.
//!
//! # Crate Structure
//!
//! - [`transport`]: packet device seam plus in-memory and Unix socket devices
//! - [`frame`]: packet codec, reassembly, channel demultiplexing and status codes
//! - [`session`]: the serialized [`Transport`](session::Transport) facade (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use apdulink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use apdulink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use apdulink_session::*;
}
