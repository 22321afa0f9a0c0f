//! `wl_registry`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::codec::{ArgKind, Argument};
use crate::error::{Result, WaylandError};
use crate::object::{EventArgs, EventSlot, Proxy, ProxyCore};

const BIND: u16 = 0;

const GLOBAL: u16 = 0;
const GLOBAL_REMOVE: u16 = 1;

const EVENTS: &[&[ArgKind]] = &[
    // global(name: uint, interface: string, version: uint)
    &[ArgKind::Uint, ArgKind::String, ArgKind::Uint],
    // global_remove(name: uint)
    &[ArgKind::Uint],
];

/// A global object announced by the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Numeric name used to bind it.
    pub name: u32,
    /// Interface it implements.
    pub interface: String,
    /// Highest version the compositor supports.
    pub version: u32,
}

/// The global registry.
///
/// Keeps the set of currently announced globals and publishes every
/// announcement and removal.
pub struct Registry {
    core: ProxyCore,
    globals: Mutex<BTreeMap<u32, Global>>,
    announced: EventSlot<Global>,
    removed: EventSlot<u32>,
}

impl Registry {
    pub(crate) fn new(core: ProxyCore) -> Self {
        Self {
            core,
            globals: Mutex::new(BTreeMap::new()),
            announced: EventSlot::new(),
            removed: EventSlot::new(),
        }
    }

    /// Globals announced and not removed, ordered by name.
    pub fn globals(&self) -> Vec<Global> {
        self.lock().values().cloned().collect()
    }

    /// First live global implementing `interface`.
    pub fn find(&self, interface: &str) -> Option<Global> {
        self.lock()
            .values()
            .find(|global| global.interface == interface)
            .cloned()
    }

    /// Announcements, in arrival order.
    pub fn announced(&self) -> &EventSlot<Global> {
        &self.announced
    }

    /// Names of removed globals.
    pub fn removed(&self) -> &EventSlot<u32> {
        &self.removed
    }

    /// Bind global `name` to a new object built by `build`.
    ///
    /// `interface` and `version` must describe what `build` returns.
    pub async fn bind<P, F>(&self, name: u32, interface: &str, version: u32, build: F) -> Result<Arc<P>>
    where
        P: Proxy,
        F: FnOnce(ProxyCore) -> P,
    {
        let connection = self.connection()?;
        let proxy = connection.register(build)?;
        let args = vec![
            Argument::Uint(name),
            Argument::from(interface),
            Argument::Uint(version),
            Argument::NewId(proxy.id()),
        ];
        if let Err(e) = self.core.send_request(BIND, args).await {
            connection.unregister(proxy.id());
            return Err(e);
        }
        tracing::debug!(name, interface, version, id = %proxy.id(), "bound global");
        Ok(proxy)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u32, Global>> {
        self.globals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Proxy for Registry {
    fn core(&self) -> &ProxyCore {
        &self.core
    }

    fn interface(&self) -> &'static str {
        "wl_registry"
    }

    fn event_signature(&self, opcode: u16) -> Option<&'static [ArgKind]> {
        EVENTS.get(usize::from(opcode)).copied()
    }

    fn dispatch_event(&self, opcode: u16, mut args: EventArgs) -> Result<()> {
        match opcode {
            GLOBAL => {
                let global = Global {
                    name: args.uint()?,
                    interface: args.string()?,
                    version: args.uint()?,
                };
                tracing::trace!(name = global.name, interface = %global.interface, "global announced");
                self.lock().insert(global.name, global.clone());
                self.announced.publish(global);
                Ok(())
            }
            GLOBAL_REMOVE => {
                let name = args.uint()?;
                self.lock().remove(&name);
                self.removed.publish(name);
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
