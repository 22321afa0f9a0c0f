//! Request arguments and event signatures.

use std::fmt;
use std::os::fd::{AsFd, OwnedFd};

use super::Fixed;
use crate::error::Result;
use crate::object::ProxyId;

/// Kind of one argument slot in a message signature.
///
/// Event signatures are declared as `&'static [ArgKind]` tables; the dispatch
/// loop walks the table to pick the matching decode primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    Uint,
    /// 24.8 fixed-point number.
    Fixed,
    /// NUL-terminated UTF-8 string.
    String,
    /// Reference to an existing object (0 = none).
    Object,
    /// Id of an object created by this message.
    NewId,
    /// Array of 32-bit elements.
    Array,
    /// File descriptor carried as ancillary data.
    Fd,
}

/// A single encoded request argument.
pub enum Argument {
    /// Signed 32-bit integer.
    Int(i32),
    /// Unsigned 32-bit integer.
    Uint(u32),
    /// Fixed-point number.
    Fixed(Fixed),
    /// UTF-8 string without interior NULs.
    String(String),
    /// Array of 32-bit elements.
    Array(Vec<u32>),
    /// Object reference, `None` encodes as id 0.
    Object(Option<ProxyId>),
    /// Freshly registered object id.
    NewId(ProxyId),
    /// Descriptor to transfer. Closed locally once the message is written.
    Fd(OwnedFd),
}

impl Argument {
    /// Duplicate `fd` into an argument, leaving the caller's descriptor open.
    pub fn fd(fd: impl AsFd) -> Result<Self> {
        Ok(Argument::Fd(fd.as_fd().try_clone_to_owned()?))
    }

    /// Kind of this argument.
    pub fn kind(&self) -> ArgKind {
        match self {
            Argument::Int(_) => ArgKind::Int,
            Argument::Uint(_) => ArgKind::Uint,
            Argument::Fixed(_) => ArgKind::Fixed,
            Argument::String(_) => ArgKind::String,
            Argument::Array(_) => ArgKind::Array,
            Argument::Object(_) => ArgKind::Object,
            Argument::NewId(_) => ArgKind::NewId,
            Argument::Fd(_) => ArgKind::Fd,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Int(v) => write!(f, "Int({v})"),
            Argument::Uint(v) => write!(f, "Uint({v})"),
            Argument::Fixed(v) => write!(f, "Fixed({v})"),
            Argument::String(v) => write!(f, "String({v:?})"),
            Argument::Array(v) => write!(f, "Array({} elements)", v.len()),
            Argument::Object(Some(id)) => write!(f, "Object({id})"),
            Argument::Object(None) => write!(f, "Object(nil)"),
            Argument::NewId(id) => write!(f, "NewId({id})"),
            Argument::Fd(fd) => write!(f, "Fd({fd:?})"),
        }
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Argument::Int(value)
    }
}

impl From<u32> for Argument {
    fn from(value: u32) -> Self {
        Argument::Uint(value)
    }
}

impl From<Fixed> for Argument {
    fn from(value: Fixed) -> Self {
        Argument::Fixed(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::String(value.to_string())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::String(value)
    }
}
