//! Serialized command/response sessions with a packet-framed secure element.
//!
//! A [`Transport`] owns one device handle. Commands are queued, sent one at a
//! time in submission order and answered through a [`ResponseHandle`].
//!
//! ```no_run
//! # async fn run() -> apdulink_session::Result<()> {
//! use std::sync::Arc;
//!
//! use apdulink_session::{Transport, TransportConfig};
//! use apdulink_transport::UnixFrameDevice;
//!
//! let device = Arc::new(UnixFrameDevice::new("/tmp/nano.sock", 64));
//! let transport = Transport::new(device, TransportConfig::default())?;
//! let response = transport.send(0xe0, 0x01, 0x00, 0x00, Vec::<u8>::new(), [0x9000]).await?;
//! println!("{:04x}", response.status);
//! transport.close().await
//! # }
//! ```

mod dispatcher;
mod queue;

pub mod config;
pub mod error;
pub mod handle;
pub mod transport;

pub use config::{TransportConfig, DEFAULT_RESPONSE_TIMEOUT};
pub use error::{Result, SessionError};
pub use handle::ResponseHandle;
pub use queue::SubmissionId;
pub use transport::Transport;
