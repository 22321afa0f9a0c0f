//! Dedicated writer task for outgoing frames.
//!
//! Every request goes through one task that owns the socket's write half, so
//! a frame (header, payload and ancillary descriptors) reaches the socket
//! whole, with no other writer interleaving. Descriptors travel with the
//! frame's first bytes.
//!
//! # Architecture
//!
//! ```text
//! Proxy 1 ─┐
//! Proxy 2 ─┼─► mpsc::Sender<WriteRequest> ─► Writer Task ─► sendmsg(SCM_RIGHTS)
//! Proxy N ─┘              ▲                        │
//!                         └──── oneshot result ◄───┘
//! ```
//!
//! Each caller waits on a oneshot for the outcome of its own write, so a
//! failed write is reported to the request that caused it.

use std::io::{self, IoSlice};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use bytes::{BufMut, Bytes, BytesMut};
use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
use tokio::io::Interest;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::connection::wait_closed;
use crate::error::{Result, WaylandError};
use crate::protocol::{Header, HEADER_SIZE};

/// Default capacity of the request queue in front of the writer task.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: MsgFlags = MsgFlags::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: MsgFlags = MsgFlags::empty();

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    bytes: Bytes,
    fds: Vec<OwnedFd>,
}

impl OutboundFrame {
    /// Create a new outbound frame from a header, payload and descriptors.
    pub fn new(header: &Header, payload: &[u8], fds: Vec<OwnedFd>) -> Self {
        let mut bytes = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        bytes.put_slice(&header.encode());
        bytes.put_slice(payload);
        Self {
            bytes: bytes.freeze(),
            fds,
        }
    }

    /// Header and payload, contiguous.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Number of descriptors travelling with this frame.
    #[inline]
    pub fn fd_count(&self) -> usize {
        self.fds.len()
    }
}

struct WriteRequest {
    frame: OutboundFrame,
    done: oneshot::Sender<Result<()>>,
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteRequest>,
}

impl WriterHandle {
    /// Queue a frame and wait until it has been written.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the writer task has stopped
    /// - the write error itself if this frame could not be written whole
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let (done, outcome) = oneshot::channel();
        self.tx
            .send(WriteRequest { frame, done })
            .await
            .map_err(|_| WaylandError::ConnectionClosed)?;
        outcome.await.map_err(|_| WaylandError::ConnectionClosed)?
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task stops when `close` flips to `true`, when every handle is dropped,
/// or after the first failed write; the write half is dropped with it. A
/// frame still being written when `close` flips is abandoned.
pub fn spawn_writer_task(
    writer: OwnedWriteHalf,
    capacity: usize,
    close: watch::Receiver<bool>,
    span: tracing::Span,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer, close).instrument(span));
    (WriterHandle { tx }, task)
}

async fn writer_loop(
    mut rx: mpsc::Receiver<WriteRequest>,
    writer: OwnedWriteHalf,
    mut close: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let request = tokio::select! {
            biased;
            _ = wait_closed(&mut close) => {
                tracing::debug!("writer stopping on close");
                return Ok(());
            }
            request = rx.recv() => match request {
                Some(request) => request,
                None => return Ok(()),
            },
        };

        let result = tokio::select! {
            biased;
            _ = wait_closed(&mut close) => {
                // A frame cut short by close is never completed.
                tracing::debug!("writer stopping on close, dropping pending frame");
                let _ = request.done.send(Err(WaylandError::ConnectionClosed));
                return Ok(());
            }
            result = write_frame(writer.as_ref(), &request.frame) => result,
        };
        let failed = result.as_ref().err().map(ToString::to_string);
        let _ = request.done.send(result);

        if let Some(reason) = failed {
            // A partial frame leaves the stream unusable.
            tracing::error!("write failed, stopping writer: {}", reason);
            return Err(WaylandError::Connection(reason));
        }
    }
}

/// Write one whole frame.
///
/// The descriptors go with the first `sendmsg`; if the socket buffer takes
/// only part of the bytes, the rest follows in further writes. Only the
/// writer task writes, so the frame stays contiguous on the stream. A write
/// that makes no progress is fatal.
pub(crate) async fn write_frame(stream: &UnixStream, frame: &OutboundFrame) -> Result<()> {
    let raw_fds: Vec<RawFd> = frame.fds.iter().map(AsRawFd::as_raw_fd).collect();
    let socket = stream.as_raw_fd();
    let mut written = 0;

    while written < frame.size() {
        let rest = &frame.bytes[written..];
        let attach = written == 0 && !raw_fds.is_empty();
        let n = stream
            .async_io(Interest::WRITABLE, || {
                let iov = [IoSlice::new(rest)];
                let rights = [ControlMessage::ScmRights(&raw_fds)];
                let cmsgs: &[ControlMessage<'_>] = if attach { &rights } else { &[] };
                sendmsg::<()>(socket, &iov, cmsgs, SEND_FLAGS, None).map_err(io::Error::from)
            })
            .await?;

        if n == 0 {
            return Err(WaylandError::Connection(format!(
                "socket accepted no bytes after {written} of {}",
                frame.size()
            )));
        }
        written += n;
    }
    tracing::trace!(bytes = written, fds = raw_fds.len(), "frame written");
    Ok(())
}
