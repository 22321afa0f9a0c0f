//! Outgoing and incoming messages.
//!
//! A [`MessageBuilder`] accumulates the arguments of one request on a private
//! buffer; nothing is shared until [`MessageBuilder::finish`] hands a complete
//! frame to the writer. A [`Message`] is one received event: its payload is a
//! consume-once cursor and its descriptors a FIFO queue.
//!
//! # Example
//!
//! ```
//! use wayland_wire::codec::Argument;
//! use wayland_wire::object::ProxyId;
//! use wayland_wire::protocol::{MessageBuilder, HEADER_SIZE};
//!
//! let mut builder = MessageBuilder::new(ProxyId::DISPLAY, 0);
//! builder.put(Argument::Uint(2)).unwrap();
//! let frame = builder.finish().unwrap();
//! assert_eq!(frame.size(), HEADER_SIZE + 4);
//! ```

use std::collections::VecDeque;
use std::os::fd::OwnedFd;

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE, MAX_FDS_PER_MESSAGE, MAX_MESSAGE_SIZE};
use crate::codec::{Argument, Fixed, WireCodec};
use crate::error::{Result, WaylandError};
use crate::object::ProxyId;
use crate::writer::OutboundFrame;

/// Builder for one outgoing request.
#[derive(Debug)]
pub struct MessageBuilder {
    target: ProxyId,
    opcode: u16,
    payload: BytesMut,
    fds: Vec<OwnedFd>,
}

impl MessageBuilder {
    /// Start a request for `opcode` on `target`.
    pub fn new(target: ProxyId, opcode: u16) -> Self {
        Self {
            target,
            opcode,
            payload: BytesMut::with_capacity(64),
            fds: Vec::new(),
        }
    }

    /// Encode one argument.
    pub fn put(&mut self, arg: Argument) -> Result<()> {
        match arg {
            Argument::Int(v) => WireCodec::put_int(&mut self.payload, v),
            Argument::Uint(v) => WireCodec::put_uint(&mut self.payload, v),
            Argument::Fixed(v) => WireCodec::put_fixed(&mut self.payload, v),
            Argument::String(s) => WireCodec::put_string(&mut self.payload, &s)?,
            Argument::Array(a) => WireCodec::put_array(&mut self.payload, &a)?,
            Argument::Object(id) => {
                WireCodec::put_uint(&mut self.payload, id.map_or(0, ProxyId::get))
            }
            Argument::NewId(id) => WireCodec::put_uint(&mut self.payload, id.get()),
            Argument::Fd(fd) => self.put_fd(fd)?,
        }
        Ok(())
    }

    /// Queue a descriptor for the ancillary data.
    pub fn put_fd(&mut self, fd: OwnedFd) -> Result<()> {
        if self.fds.len() >= MAX_FDS_PER_MESSAGE {
            return Err(WaylandError::Protocol(format!(
                "more than {MAX_FDS_PER_MESSAGE} descriptors in one message"
            )));
        }
        self.fds.push(fd);
        Ok(())
    }

    /// Payload bytes encoded so far.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Descriptors queued so far.
    #[inline]
    pub fn fd_count(&self) -> usize {
        self.fds.len()
    }

    /// Compute the header and produce the contiguous frame.
    pub fn finish(self) -> Result<OutboundFrame> {
        let total = HEADER_SIZE + self.payload.len();
        if total > MAX_MESSAGE_SIZE {
            return Err(WaylandError::Protocol(format!(
                "message size {total} exceeds maximum {MAX_MESSAGE_SIZE}"
            )));
        }
        let header = Header::new(self.target.get(), self.opcode, total as u16);
        Ok(OutboundFrame::new(&header, &self.payload, self.fds))
    }
}

/// One received event.
#[derive(Debug)]
pub struct Message {
    header: Header,
    target: ProxyId,
    payload: Bytes,
    fds: VecDeque<OwnedFd>,
}

impl Message {
    /// Wrap a validated header, its payload and the descriptors read with it.
    pub fn new(header: Header, payload: Bytes, fds: VecDeque<OwnedFd>) -> Result<Self> {
        let target = header.validate()?;
        if payload.len() != header.payload_len() {
            return Err(WaylandError::Protocol(format!(
                "payload is {} bytes, header declares {}",
                payload.len(),
                header.payload_len()
            )));
        }
        Ok(Self {
            header,
            target,
            payload,
            fds,
        })
    }

    /// Decoded header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Target object.
    #[inline]
    pub fn target(&self) -> ProxyId {
        self.target
    }

    /// Event opcode.
    #[inline]
    pub fn opcode(&self) -> u16 {
        self.header.opcode
    }

    /// Payload bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.payload.len()
    }

    /// Descriptors not yet consumed.
    #[inline]
    pub fn fd_count(&self) -> usize {
        self.fds.len()
    }

    /// Read an `int` argument.
    pub fn get_int(&mut self) -> Result<i32> {
        WireCodec::get_int(&mut self.payload)
    }

    /// Read a `uint` argument.
    pub fn get_uint(&mut self) -> Result<u32> {
        WireCodec::get_uint(&mut self.payload)
    }

    /// Read a `fixed` argument.
    pub fn get_fixed(&mut self) -> Result<Fixed> {
        WireCodec::get_fixed(&mut self.payload)
    }

    /// Read a `string` argument.
    pub fn get_string(&mut self) -> Result<String> {
        WireCodec::get_string(&mut self.payload)
    }

    /// Read an `array` argument.
    pub fn get_array(&mut self) -> Result<Vec<u32>> {
        WireCodec::get_array(&mut self.payload)
    }

    /// Read an `object` argument. Id 0 is `None`.
    pub fn get_object_id(&mut self) -> Result<Option<ProxyId>> {
        Ok(ProxyId::new(self.get_uint()?))
    }

    /// Read a `new_id` argument.
    pub fn get_new_id(&mut self) -> Result<ProxyId> {
        ProxyId::new(self.get_uint()?)
            .ok_or_else(|| WaylandError::protocol("new_id argument is 0"))
    }

    /// Pop the next descriptor in arrival order.
    ///
    /// Running out means the declared signature and the ancillary data
    /// disagree, which cannot be recovered from.
    pub fn get_fd(&mut self) -> Result<OwnedFd> {
        self.fds.pop_front().ok_or_else(|| {
            WaylandError::Protocol(format!(
                "opcode {} on object {} expects a file descriptor but none remain",
                self.header.opcode, self.target
            ))
        })
    }
}
