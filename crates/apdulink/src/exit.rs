use std::fmt;
use std::io;

use apdulink_frame::FrameError;
use apdulink_session::SessionError;
use apdulink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const STATUS_REJECTED: i32 = 20;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Status { .. } => CliError::new(STATUS_REJECTED, format!("{context}: {err}")),
        FrameError::PayloadTooLarge { .. } | FrameError::MessageTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::InvalidPacketSize { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::Truncated { .. }
        | FrameError::UnexpectedTag { .. }
        | FrameError::OutOfSequence { .. }
        | FrameError::ChannelMismatch { .. }
        | FrameError::MissingStatus(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::Stalled { .. } | SessionError::WriteTimeout(_) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        SessionError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rejected_status_maps_to_20() {
        let err = SessionError::Frame(FrameError::Status {
            code: 0x6985,
            label: "CONDITIONS_OF_USE_NOT_SATISFIED (0x6985)".to_string(),
        });
        let cli = session_error("send failed", err);
        assert_eq!(cli.code, STATUS_REJECTED);
        assert!(cli.message.starts_with("send failed: "));
    }

    #[test]
    fn stall_maps_to_timeout() {
        let err = SessionError::Stalled {
            channel: 0x0101,
            timeout: Duration::from_millis(10),
        };
        assert_eq!(session_error("send failed", err).code, TIMEOUT);
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let err = TransportError::Connect {
            path: "/tmp/none.sock".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(transport_error("open failed", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn oversized_payload_is_invalid_data() {
        let err = FrameError::PayloadTooLarge { size: 300, max: 255 };
        assert_eq!(frame_error("send failed", err).code, DATA_INVALID);
    }
}
