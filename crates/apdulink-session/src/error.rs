use std::time::Duration;

/// Errors that settle a submitted command.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Device-level error (open, write).
    #[error("transport error: {0}")]
    Transport(#[from] apdulink_transport::TransportError),

    /// Encoding, reassembly or status error.
    #[error("frame error: {0}")]
    Frame(#[from] apdulink_frame::FrameError),

    /// The response stopped arriving.
    #[error("no complete response on channel {channel:#06x} within {timeout:?}")]
    Stalled { channel: u16, timeout: Duration },

    /// A frame write did not complete in time.
    #[error("frame write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The transport was closed before the command settled.
    #[error("transport closed")]
    Closed,
}

impl SessionError {
    /// Device status code when the command was rejected by status.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SessionError::Frame(err) => err.status_code(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
