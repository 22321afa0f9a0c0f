//! Codec module - the Wayland wire argument encoding.
//!
//! - [`Fixed`] - 24.8 fixed-point numbers
//! - [`WireCodec`] - put/get primitives for payload arguments
//! - [`Argument`] / [`ArgKind`] - request values and signature entries
//!
//! # Design
//!
//! The codec is a marker struct with static methods. Decoding consumes a `bytes::Bytes` cursor strictly in wire
//! order; there is no random access.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use wayland_wire::codec::WireCodec;
//!
//! let mut buf = BytesMut::new();
//! WireCodec::put_string(&mut buf, "wl_compositor").unwrap();
//! WireCodec::put_uint(&mut buf, 4);
//!
//! let mut cursor = buf.freeze();
//! assert_eq!(WireCodec::get_string(&mut cursor).unwrap(), "wl_compositor");
//! assert_eq!(WireCodec::get_uint(&mut cursor).unwrap(), 4);
//! ```

mod argument;
mod fixed;
mod wire;

pub use argument::{ArgKind, Argument};
pub use fixed::Fixed;
pub use wire::{padded_len, WireCodec, WORD_SIZE};
