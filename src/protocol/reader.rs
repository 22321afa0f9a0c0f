//! Framed reads from the socket, capturing `SCM_RIGHTS` descriptors.
//!
//! A message is read in two exact steps: the 8-byte header, then
//! `size - 8` payload bytes. Every `recvmsg` drains the control data that
//! arrived with its bytes into the message's descriptor queue.

use std::collections::VecDeque;
use std::io::{self, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use bytes::Bytes;
use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags};
use tokio::io::Interest;
use tokio::net::UnixStream;

use super::message::Message;
use super::wire_format::{Header, HEADER_SIZE, MAX_FDS_PER_MESSAGE};
use crate::error::{Result, WaylandError};

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: MsgFlags = MsgFlags::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: MsgFlags = MsgFlags::empty();

/// Read one complete message.
///
/// # Errors
///
/// - `Connection` if the peer closed the socket or a read came up short
/// - `Protocol` if the header is malformed (size below 8, object id 0)
/// - `Io` for socket faults; `Interrupted` before the first header byte is
///   the only transient case
pub async fn read_message(stream: &UnixStream) -> Result<Message> {
    let mut fds = VecDeque::new();

    let mut head = [0u8; HEADER_SIZE];
    recv_exact(stream, &mut head, &mut fds, true).await?;
    let header = Header::decode(&head)
        .ok_or_else(|| WaylandError::protocol("unable to decode message header"))?;
    header.validate()?;

    let mut payload = vec![0u8; header.payload_len()];
    recv_exact(stream, &mut payload, &mut fds, false).await?;

    Message::new(header, Bytes::from(payload), fds)
}

/// Whether a read error leaves the stream intact and can be retried.
pub fn is_transient(err: &WaylandError) -> bool {
    matches!(
        err,
        WaylandError::Io(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
    )
}

async fn recv_exact(
    stream: &UnixStream,
    buf: &mut [u8],
    fds: &mut VecDeque<OwnedFd>,
    frame_start: bool,
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let raw = stream.as_raw_fd();
        let chunk = &mut buf[filled..];
        let received = stream
            .async_io(Interest::READABLE, || recv_chunk(raw, chunk, fds))
            .await;

        match received {
            Ok(0) => {
                return Err(WaylandError::Connection(format!(
                    "socket closed after {filled} of {} bytes",
                    buf.len()
                )))
            }
            Ok(n) => filled += n,
            // Once part of a frame is in, the rest must follow or the stream
            // is desynchronised.
            Err(e) if e.kind() == io::ErrorKind::Interrupted && !(frame_start && filled == 0) => {
                continue
            }
            Err(e) => return Err(WaylandError::Io(e)),
        }
    }
    Ok(())
}

fn recv_chunk(fd: RawFd, buf: &mut [u8], fds: &mut VecDeque<OwnedFd>) -> io::Result<usize> {
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; MAX_FDS_PER_MESSAGE]);
    let mut iov = [IoSliceMut::new(buf)];

    let msg = recvmsg::<()>(fd, &mut iov, Some(&mut cmsg_buffer), RECV_FLAGS)?;
    let received = msg.bytes;
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::ScmRights(raw_fds) = cmsg {
            for raw in raw_fds {
                // SAFETY: the kernel just installed `raw` in our descriptor
                // table for this message; nothing else owns it.
                fds.push_back(unsafe { OwnedFd::from_raw_fd(raw) });
            }
        }
    }
    Ok(received)
}
