use std::path::PathBuf;

use crate::device::DeviceId;

/// Errors that can occur in device transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the device link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// A write was attempted on a device handle that is not open.
    #[error("device {0} is not open")]
    NotOpen(DeviceId),

    /// The packet does not have the device's fixed size.
    #[error("invalid packet size ({actual} bytes, device expects {expected})")]
    InvalidFrameSize { expected: usize, actual: usize },

    /// The device went away or was closed.
    #[error("device closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
