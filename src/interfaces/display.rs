//! `wl_display`, the root object of every connection.

use std::sync::Arc;

use super::{Callback, Registry};
use crate::codec::{ArgKind, Argument};
use crate::error::{Result, WaylandError};
use crate::object::{EventArgs, EventSlot, Proxy, ProxyCore, ProxyId};

// Requests.
const SYNC: u16 = 0;
const GET_REGISTRY: u16 = 1;

// Events.
const ERROR: u16 = 0;
const DELETE_ID: u16 = 1;

const EVENTS: &[&[ArgKind]] = &[
    // error(object_id: object, code: uint, message: string)
    &[ArgKind::Object, ArgKind::Uint, ArgKind::String],
    // delete_id(id: uint)
    &[ArgKind::Uint],
];

/// A fatal error reported by the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayError {
    /// Object the error is about, if it is still registered.
    pub object_id: Option<ProxyId>,
    /// Interface of that object.
    pub interface: Option<&'static str>,
    /// Interface-specific error code.
    pub code: u32,
    /// Human-readable description.
    pub message: String,
}

/// The display object, registered as id 1 when the connection opens.
pub struct Display {
    core: ProxyCore,
    errors: EventSlot<DisplayError>,
    deleted: EventSlot<ProxyId>,
}

impl Display {
    pub(crate) fn new(core: ProxyCore) -> Self {
        Self {
            core,
            errors: EventSlot::new(),
            deleted: EventSlot::new(),
        }
    }

    /// Ask the compositor for a callback once it has processed every request
    /// sent so far.
    pub async fn sync(&self) -> Result<Arc<Callback>> {
        let connection = self.connection()?;
        let callback = connection.register(Callback::new)?;
        if let Err(e) = self
            .core
            .send_request(SYNC, vec![Argument::NewId(callback.id())])
            .await
        {
            connection.unregister(callback.id());
            return Err(e);
        }
        Ok(callback)
    }

    /// Create a registry object, which announces the compositor's globals.
    pub async fn get_registry(&self) -> Result<Arc<Registry>> {
        let connection = self.connection()?;
        let registry = connection.register(Registry::new)?;
        if let Err(e) = self
            .core
            .send_request(GET_REGISTRY, vec![Argument::NewId(registry.id())])
            .await
        {
            connection.unregister(registry.id());
            return Err(e);
        }
        Ok(registry)
    }

    /// Errors reported by the compositor. The compositor disconnects after
    /// sending one.
    pub fn errors(&self) -> &EventSlot<DisplayError> {
        &self.errors
    }

    /// Ids whose destruction the compositor has acknowledged.
    pub fn deleted_ids(&self) -> &EventSlot<ProxyId> {
        &self.deleted
    }
}

impl Proxy for Display {
    fn core(&self) -> &ProxyCore {
        &self.core
    }

    fn interface(&self) -> &'static str {
        "wl_display"
    }

    fn event_signature(&self, opcode: u16) -> Option<&'static [ArgKind]> {
        EVENTS.get(usize::from(opcode)).copied()
    }

    fn dispatch_event(&self, opcode: u16, mut args: EventArgs) -> Result<()> {
        match opcode {
            ERROR => {
                let object = args.object()?;
                let error = DisplayError {
                    object_id: object.as_ref().map(|p| p.id()),
                    interface: object.as_ref().map(|p| p.interface()),
                    code: args.uint()?,
                    message: args.string()?,
                };
                tracing::error!(
                    object = ?error.object_id,
                    code = error.code,
                    "compositor error: {}",
                    error.message
                );
                self.errors.publish(error);
                Ok(())
            }
            DELETE_ID => {
                let raw = args.uint()?;
                let id = ProxyId::new(raw)
                    .ok_or_else(|| WaylandError::protocol("delete_id for object 0"))?;
                if let Ok(connection) = self.connection() {
                    connection.unregister(id);
                }
                self.deleted.publish(id);
                Ok(())
            }
            _ => Err(WaylandError::UnknownOpcode {
                interface: self.interface(),
                id: self.id().get(),
                opcode,
            }),
        }
    }
}
