//! Wire format encoding and decoding.
//!
//! Implements the 8-byte message header:
//! ```text
//! ┌───────────┬──────────┬──────────┐
//! │ Object ID │ Opcode   │ Size     │
//! │ 4 bytes   │ 2 bytes  │ 2 bytes  │
//! │ uint32 LE │ uint16 LE│ uint16 LE│
//! └───────────┴──────────┴──────────┘
//! ```
//!
//! Size counts the whole message, header included. Read as one little-endian
//! word, bytes 4..8 are `size << 16 | opcode`.

use crate::error::{Result, WaylandError};
use crate::object::ProxyId;

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Largest message the 16-bit size field can describe.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Most descriptors one outgoing message may carry.
pub const MAX_FDS_PER_MESSAGE: usize = 28;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Target object id (0 is never valid on the wire).
    pub object_id: u32,
    /// Request or event discriminant within the target's interface.
    pub opcode: u16,
    /// Total message length in bytes, header included.
    pub size: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(object_id: u32, opcode: u16, size: u16) -> Self {
        Self {
            object_id,
            opcode,
            size,
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use wayland_wire::protocol::Header;
    ///
    /// let header = Header::new(1, 0, 12);
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [1, 0, 0, 0, 0, 0, 12, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        let word = (u32::from(self.size) << 16) | u32::from(self.opcode);
        buf[0..4].copy_from_slice(&self.object_id.to_le_bytes());
        buf[4..8].copy_from_slice(&word.to_le_bytes());
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let object_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let word = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Some(Self {
            object_id,
            opcode: (word & 0xffff) as u16,
            size: (word >> 16) as u16,
        })
    }

    /// Validate an incoming header.
    ///
    /// Checks:
    /// - Object id is not 0
    /// - Size covers at least the header itself
    ///
    /// Both are fatal: reading on would misparse the rest of the stream.
    pub fn validate(&self) -> Result<ProxyId> {
        if usize::from(self.size) < HEADER_SIZE {
            return Err(WaylandError::Protocol(format!(
                "message size {} is smaller than the {HEADER_SIZE}-byte header",
                self.size
            )));
        }
        ProxyId::new(self.object_id)
            .ok_or_else(|| WaylandError::protocol("message targets reserved object id 0"))
    }

    /// Number of payload bytes following the header.
    #[inline]
    pub fn payload_len(&self) -> usize {
        usize::from(self.size).saturating_sub(HEADER_SIZE)
    }
}
