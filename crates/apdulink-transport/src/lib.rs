//! Fixed-size packet device abstraction.
//!
//! A secure element only speaks in whole packets of one size (64 bytes for
//! most HID-attached devices). This crate provides the seam the rest of
//! apdulink talks to:
//! - [`FrameDevice`], an already-selected device handle that can be opened,
//!   written one packet at a time, read one packet at a time and closed
//! - [`DeviceEvent`], hot-plug notifications carrying a device handle
//!
//! and two concrete devices: an in-process [`MemoryDevice`] pair and a
//! Unix-domain-socket packet device used by the emulator and the CLI.

pub mod codec;
pub mod device;
pub mod error;
pub mod memory;

#[cfg(unix)]
pub mod uds;

pub use codec::PacketCodec;
pub use device::{DeviceEvent, DeviceId, FrameDevice};
pub use error::{Result, TransportError};
pub use memory::{DeviceEndpoint, MemoryDevice};

#[cfg(unix)]
pub use uds::{PacketStream, UnixFrameDevice, UnixFrameListener};
