//! Protocol module - wire format, message framing, and framed reads.
//!
//! This module implements the message layer of the wire protocol:
//! - 8-byte header encoding/decoding
//! - Outgoing message builder and incoming message cursor
//! - Exact-length socket reads that collect passed descriptors

mod message;
mod reader;
mod wire_format;

pub use message::{Message, MessageBuilder};
pub use reader::{is_transient, read_message};
pub use wire_format::{Header, HEADER_SIZE, MAX_FDS_PER_MESSAGE, MAX_MESSAGE_SIZE};
