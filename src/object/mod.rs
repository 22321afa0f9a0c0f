//! Object module - the proxy capability and the object registry.
//!
//! Provides:
//! - [`ProxyId`] - connection-scoped object identity
//! - [`Proxy`] - what every protocol object implements to receive events
//! - [`ProxyCore`] - id plus non-owning connection back-reference
//! - [`ObjectRegistry`] - maps ids to live proxies
//! - [`EventSlot`] - per-event delivery queue
//! - [`EventArgs`] - decoded event arguments in wire order
//!
//! # Example
//!
//! ```ignore
//! use wayland_wire::codec::ArgKind;
//! use wayland_wire::object::{EventArgs, EventSlot, Proxy, ProxyCore};
//!
//! struct Buffer {
//!     core: ProxyCore,
//!     release: EventSlot<()>,
//! }
//!
//! impl Proxy for Buffer {
//!     fn core(&self) -> &ProxyCore { &self.core }
//!     fn interface(&self) -> &'static str { "wl_buffer" }
//!     fn event_signature(&self, opcode: u16) -> Option<&'static [ArgKind]> {
//!         (opcode == 0).then_some(&[][..])
//!     }
//!     fn dispatch_event(&self, _opcode: u16, _args: EventArgs) -> wayland_wire::Result<()> {
//!         self.release.publish(());
//!         Ok(())
//!     }
//! }
//! ```

mod args;
mod registry;
mod slot;

pub use args::{EventArg, EventArgs};
pub use registry::{ObjectRegistry, FIRST_SERVER_ID};
pub use slot::EventSlot;

use std::fmt;

use crate::codec::{ArgKind, Argument};
use crate::connection::{Connection, WeakConnection};
use crate::error::Result;

/// Identity of an object within one connection. Never 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(u32);

impl ProxyId {
    /// The display object, registered when the connection is established.
    pub const DISPLAY: ProxyId = ProxyId(1);

    /// Wrap a raw id. Returns `None` for the reserved id 0.
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The raw id.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State shared by every proxy: its id and its owning connection.
///
/// The connection reference is weak. The registry owns the proxy, never the
/// other way round.
#[derive(Clone)]
pub struct ProxyCore {
    id: ProxyId,
    connection: WeakConnection,
}

impl ProxyCore {
    pub(crate) fn new(id: ProxyId, connection: WeakConnection) -> Self {
        Self { id, connection }
    }

    /// Assigned id.
    #[inline]
    pub fn id(&self) -> ProxyId {
        self.id
    }

    /// Owning connection.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` once the connection has been dropped.
    pub fn connection(&self) -> Result<Connection> {
        self.connection.upgrade()
    }

    /// Send a request targeting this object.
    pub async fn send_request(&self, opcode: u16, args: Vec<Argument>) -> Result<()> {
        self.connection()?.send_request(self.id, opcode, args).await
    }

    /// Remove this object from its connection's registry.
    ///
    /// Idempotent; does nothing once the connection is gone.
    pub fn unregister(&self) {
        if let Ok(connection) = self.connection() {
            connection.unregister(self.id);
        }
    }
}

impl fmt::Debug for ProxyCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCore").field("id", &self.id).finish()
    }
}

/// Capability every protocol object implements to plug into a connection.
///
/// Generated per-interface types hold a [`ProxyCore`], declare one argument
/// table per event opcode, and turn decoded [`EventArgs`] into typed events
/// published on their [`EventSlot`]s.
///
/// Objects stay in the registry until unregistered, either by a destructor
/// request the implementation sends or by the display's `delete_id` event.
pub trait Proxy: Send + Sync + 'static {
    /// Id and connection of this object.
    fn core(&self) -> &ProxyCore;

    /// Protocol interface name, e.g. `wl_callback`.
    fn interface(&self) -> &'static str;

    /// Argument kinds of event `opcode`, in wire order.
    ///
    /// `None` means the interface has no such event.
    fn event_signature(&self, opcode: u16) -> Option<&'static [ArgKind]>;

    /// Deliver one decoded event.
    fn dispatch_event(&self, opcode: u16, args: EventArgs) -> Result<()>;

    /// Assigned id.
    fn id(&self) -> ProxyId {
        self.core().id()
    }

    /// Owning connection.
    fn connection(&self) -> Result<Connection> {
        self.core().connection()
    }
}
