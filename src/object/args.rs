//! Decoded event arguments.

use std::collections::VecDeque;
use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use super::{Proxy, ProxyId};
use crate::codec::{ArgKind, Fixed};
use crate::error::{Result, WaylandError};

/// One decoded event argument.
pub enum EventArg {
    /// Signed 32-bit integer.
    Int(i32),
    /// Unsigned 32-bit integer.
    Uint(u32),
    /// Fixed-point number.
    Fixed(Fixed),
    /// UTF-8 string.
    String(String),
    /// Array of 32-bit elements.
    Array(Vec<u32>),
    /// Referenced object, `None` for id 0 or an id no longer registered.
    Object(Option<Arc<dyn Proxy>>),
    /// Id the peer allocated for a new object.
    NewId(ProxyId),
    /// Descriptor received as ancillary data.
    Fd(OwnedFd),
}

impl EventArg {
    /// Kind of this argument.
    pub fn kind(&self) -> ArgKind {
        match self {
            EventArg::Int(_) => ArgKind::Int,
            EventArg::Uint(_) => ArgKind::Uint,
            EventArg::Fixed(_) => ArgKind::Fixed,
            EventArg::String(_) => ArgKind::String,
            EventArg::Array(_) => ArgKind::Array,
            EventArg::Object(_) => ArgKind::Object,
            EventArg::NewId(_) => ArgKind::NewId,
            EventArg::Fd(_) => ArgKind::Fd,
        }
    }
}

impl fmt::Debug for EventArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventArg::Int(v) => write!(f, "Int({v})"),
            EventArg::Uint(v) => write!(f, "Uint({v})"),
            EventArg::Fixed(v) => write!(f, "Fixed({v})"),
            EventArg::String(v) => write!(f, "String({v:?})"),
            EventArg::Array(v) => write!(f, "Array({} words)", v.len()),
            EventArg::Object(Some(p)) => write!(f, "Object({}@{})", p.interface(), p.id()),
            EventArg::Object(None) => write!(f, "Object(null)"),
            EventArg::NewId(id) => write!(f, "NewId({id})"),
            EventArg::Fd(fd) => write!(f, "Fd({fd:?})"),
        }
    }
}

/// Arguments of one event, consumed front to back in wire order.
#[derive(Debug)]
pub struct EventArgs {
    opcode: u16,
    args: VecDeque<EventArg>,
}

macro_rules! taker {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&mut self) -> Result<$ty> {
            match self.next()? {
                EventArg::$variant(v) => Ok(v),
                other => Err(self.mismatch(ArgKind::$variant, other.kind())),
            }
        }
    };
}

impl EventArgs {
    pub(crate) fn new(opcode: u16, args: Vec<EventArg>) -> Self {
        Self {
            opcode,
            args: args.into(),
        }
    }

    /// Opcode of the event these arguments belong to.
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Arguments not yet taken.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether every argument has been taken.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    taker!(
        /// Take a signed integer.
        int, Int, i32
    );
    taker!(
        /// Take an unsigned integer.
        uint, Uint, u32
    );
    taker!(
        /// Take a fixed-point number.
        fixed, Fixed, Fixed
    );
    taker!(
        /// Take a string.
        string, String, String
    );
    taker!(
        /// Take an array.
        array, Array, Vec<u32>
    );
    taker!(
        /// Take an object reference.
        object, Object, Option<Arc<dyn Proxy>>
    );
    taker!(
        /// Take a peer-allocated id.
        new_id, NewId, ProxyId
    );
    taker!(
        /// Take a received descriptor.
        fd, Fd, OwnedFd
    );

    fn next(&mut self) -> Result<EventArg> {
        self.args.pop_front().ok_or_else(|| {
            WaylandError::protocol(format!("event {} has fewer arguments than read", self.opcode))
        })
    }

    fn mismatch(&self, expected: ArgKind, found: ArgKind) -> WaylandError {
        WaylandError::protocol(format!(
            "event {} argument: expected {expected:?}, found {found:?}",
            self.opcode
        ))
    }
}
