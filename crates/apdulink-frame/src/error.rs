/// Errors that can occur during frame encoding, reassembly and routing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The command payload does not fit the single length byte.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The message does not fit the 2-byte length prefix.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The packet size leaves no room for header and length prefix.
    #[error("invalid packet size {size} (minimum {min})")]
    InvalidPacketSize { size: usize, min: usize },

    /// A packet or APDU is shorter than its fixed layout requires.
    #[error("truncated input ({len} bytes, need at least {min})")]
    Truncated { len: usize, min: usize },

    /// The packet header carries an unknown protocol tag.
    #[error("unexpected frame tag 0x{found:02x} (expected 0x{expected:02x})")]
    UnexpectedTag { expected: u8, found: u8 },

    /// A packet arrived out of order within a message.
    #[error("channel {channel:#06x}: expected sequence {expected}, got {found}")]
    OutOfSequence {
        channel: u16,
        expected: u16,
        found: u16,
    },

    /// A packet for another channel was fed to a message assembler.
    #[error("frame for channel {found:#06x} fed to assembler for {expected:#06x}")]
    ChannelMismatch { expected: u16, found: u16 },

    /// The response is too short to hold the 2-byte status trailer.
    #[error("response of {0} bytes has no status code")]
    MissingStatus(usize),

    /// The device answered with a status code the caller did not allow.
    #[error("device returned status {label}")]
    Status { code: u16, label: String },

    /// Another reader is already waiting on this channel.
    #[error("channel {0:#06x} already has a pending reader")]
    ReaderBusy(u16),

    /// The channel was discarded while a reader was waiting.
    #[error("channel {0:#06x} closed while waiting for a frame")]
    ChannelClosed(u16),
}

impl FrameError {
    /// The device status code, for [`FrameError::Status`].
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FrameError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
