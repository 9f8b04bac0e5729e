use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::status;

/// Longest command payload: its length travels in a single byte.
pub const MAX_PAYLOAD: usize = 255;

/// `cla`, `ins`, `p1`, `p2`, `lc`.
pub const APDU_HEADER_SIZE: usize = 5;

/// A logical command for the device.
///
/// The payload length is checked at construction, so a `Command` can always
/// be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    payload: Bytes,
}

impl Command {
    /// Build a command, rejecting payloads longer than [`MAX_PAYLOAD`].
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            payload,
        })
    }

    /// Build a command with an empty payload.
    pub fn header_only(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            payload: Bytes::new(),
        }
    }

    pub fn cla(&self) -> u8 {
        self.cla
    }

    pub fn ins(&self) -> u8 {
        self.ins
    }

    pub fn p1(&self) -> u8 {
        self.p1
    }

    pub fn p2(&self) -> u8 {
        self.p2
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Length of the APDU produced by [`Command::to_apdu`].
    pub fn apdu_len(&self) -> usize {
        APDU_HEADER_SIZE + self.payload.len()
    }

    /// Serialize as `cla, ins, p1, p2, lc, payload`.
    pub fn to_apdu(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.apdu_len());
        self.write_apdu(&mut dst);
        dst.freeze()
    }

    /// Append the APDU bytes to `dst`.
    pub fn write_apdu(&self, dst: &mut BytesMut) {
        dst.reserve(self.apdu_len());
        dst.put_slice(&[self.cla, self.ins, self.p1, self.p2]);
        // Length checked in `new`.
        dst.put_u8(self.payload.len() as u8);
        dst.put_slice(&self.payload);
    }

    /// Parse an APDU as produced by [`Command::to_apdu`].
    pub fn parse_apdu(apdu: &[u8]) -> Result<Self> {
        if apdu.len() < APDU_HEADER_SIZE {
            return Err(FrameError::Truncated {
                len: apdu.len(),
                min: APDU_HEADER_SIZE,
            });
        }
        let lc = apdu[4] as usize;
        let end = APDU_HEADER_SIZE + lc;
        if apdu.len() < end {
            return Err(FrameError::Truncated {
                len: apdu.len(),
                min: end,
            });
        }
        Ok(Self {
            cla: apdu[0],
            ins: apdu[1],
            p1: apdu[2],
            p2: apdu[3],
            payload: Bytes::copy_from_slice(&apdu[APDU_HEADER_SIZE..end]),
        })
    }
}

/// A decoded device response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Trailing 2-byte status code.
    pub status: u16,
    /// Response body without the status code.
    pub data: Bytes,
}

impl Response {
    pub fn new(status: u16, data: impl Into<Bytes>) -> Self {
        Self {
            status,
            data: data.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        status::is_success(self.status)
    }
}

/// Status codes a caller accepts as a successful answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet(Vec<u16>);

impl StatusSet {
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        let mut codes: Vec<u16> = codes.into_iter().collect();
        codes.sort_unstable();
        codes.dedup();
        Self(codes)
    }

    /// A set holding a single code.
    pub fn only(code: u16) -> Self {
        Self(vec![code])
    }

    pub fn contains(&self, code: u16) -> bool {
        self.0.binary_search(&code).is_ok()
    }

    pub fn codes(&self) -> &[u16] {
        &self.0
    }
}

impl Default for StatusSet {
    fn default() -> Self {
        Self::only(status::OK)
    }
}

impl From<&[u16]> for StatusSet {
    fn from(codes: &[u16]) -> Self {
        Self::new(codes.iter().copied())
    }
}

impl<const N: usize> From<[u16; N]> for StatusSet {
    fn from(codes: [u16; N]) -> Self {
        Self::new(codes)
    }
}

impl FromIterator<u16> for StatusSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self::new(iter)
    }
}
