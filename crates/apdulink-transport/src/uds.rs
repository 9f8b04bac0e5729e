use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};
use tokio_util::codec::{Framed, FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::codec::PacketCodec;
use crate::device::{DeviceId, FrameDevice};
use crate::error::{Result, TransportError};

/// Device side of a socket link: a stream of fixed-size packets.
pub type PacketStream = Framed<UnixStream, PacketCodec>;

/// Unix domain socket listener handing out packet streams.
///
/// This is where a device emulator sits. The socket file is created at
/// bind time and removed again on drop, unless something else has replaced
/// it in the meantime.
pub struct UnixFrameListener {
    listener: UnixListener,
    path: PathBuf,
    packet_size: usize,
    created_inode: Option<(u64, u64)>,
    /// Whether the path should be removed on drop.
    cleanup_on_drop: bool,
}

impl UnixFrameListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// If the path already exists and is a socket it is removed first
    /// (stale socket cleanup). Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>, packet_size: usize) -> Result<Self> {
        Self::bind_with_mode(path, packet_size, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind with an explicit permission mode for the socket file.
    pub fn bind_with_mode(path: impl AsRef<Path>, packet_size: usize, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created_metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;
        let created_inode = Some((created_metadata.dev(), created_metadata.ino()));

        info!(?path, packet_size, "device socket listening");

        Ok(Self {
            listener,
            path,
            packet_size,
            created_inode,
            cleanup_on_drop: true,
        })
    }

    /// Accept the next host connection.
    pub async fn accept(&self) -> Result<PacketStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted host connection");
        Ok(Framed::new(stream, PacketCodec::new(self.packet_size)))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }
}

impl Drop for UnixFrameListener {
    fn drop(&mut self) {
        if !self.cleanup_on_drop {
            return;
        }
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

/// Host-side packet device reached over a Unix domain socket.
///
/// The connection is made by [`FrameDevice::open`], so constructing the
/// handle is free. When the far end hangs up the handle falls back to closed
/// and a pending [`FrameDevice::read_frame`] keeps waiting for the next open.
#[derive(Debug)]
pub struct UnixFrameDevice {
    id: DeviceId,
    path: PathBuf,
    packet_size: usize,
    opened: watch::Sender<bool>,
    writer: Mutex<Option<FramedWrite<OwnedWriteHalf, PacketCodec>>>,
    reader: Mutex<Option<FramedRead<OwnedReadHalf, PacketCodec>>>,
}

impl UnixFrameDevice {
    pub fn new(path: impl AsRef<Path>, packet_size: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        let (opened, _) = watch::channel(false);
        Self {
            id: DeviceId::new(path.display().to_string()),
            path,
            packet_size,
            opened,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn mark_closed(&self) {
        self.opened.send_replace(false);
        self.writer.lock().await.take();
    }
}

#[async_trait]
impl FrameDevice for UnixFrameDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn is_open(&self) -> bool {
        *self.opened.borrow()
    }

    async fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|source| TransportError::Connect {
                path: self.path.clone(),
                source,
            })?;
        let (read_half, write_half) = stream.into_split();
        let codec = PacketCodec::new(self.packet_size);

        *self.reader.lock().await = Some(FramedRead::new(read_half, codec));
        *self.writer.lock().await = Some(FramedWrite::new(write_half, codec));
        self.opened.send_replace(true);

        debug!(device = %self.id, "socket device opened");
        Ok(())
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| TransportError::NotOpen(self.id.clone()))?;
        sink.send(Bytes::copy_from_slice(frame)).await
    }

    async fn read_frame(&self) -> Result<Bytes> {
        let mut state = self.opened.subscribe();
        loop {
            if state.wait_for(|open| *open).await.is_err() {
                return Err(TransportError::Closed);
            }

            let mut reader = self.reader.lock().await;
            let Some(framed) = reader.as_mut() else {
                drop(reader);
                tokio::task::yield_now().await;
                continue;
            };

            tokio::select! {
                next = framed.next() => match next {
                    Some(packet) => return packet,
                    None => {
                        warn!(device = %self.id, "device hung up");
                        reader.take();
                        drop(reader);
                        self.mark_closed().await;
                    }
                },
                // Closed underneath us; release the reader for close().
                _ = async { let _ = state.wait_for(|open| !*open).await; } => {}
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.opened.send_replace(false);
        if let Some(mut sink) = self.writer.lock().await.take() {
            if let Err(err) = SinkExt::<Bytes>::close(&mut sink).await {
                debug!(device = %self.id, error = %err, "socket shutdown failed");
            }
        }
        self.reader.lock().await.take();
        debug!(device = %self.id, "socket device closed");
        Ok(())
    }
}
