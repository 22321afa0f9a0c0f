//! `wl_callback`.

use crate::codec::ArgKind;
use crate::error::{Result, WaylandError};
use crate::object::{EventArgs, EventSlot, Proxy, ProxyCore};

const DONE: u16 = 0;

const EVENTS: &[&[ArgKind]] = &[
    // done(callback_data: uint)
    &[ArgKind::Uint],
];

/// One-shot notification, e.g. the reply to `wl_display.sync`.
///
/// The compositor destroys the object right after `done` and acknowledges
/// with `wl_display.delete_id`, which removes it from the registry.
pub struct Callback {
    core: ProxyCore,
    done: EventSlot<u32>,
}

impl Callback {
    pub(crate) fn new(core: ProxyCore) -> Self {
        Self {
            core,
            done: EventSlot::new(),
        }
    }

    /// Receives the callback data once the request is done.
    pub fn done(&self) -> &EventSlot<u32> {
        &self.done
    }
}

impl Proxy for Callback {
    fn core(&self) -> &ProxyCore {
        &self.core
    }

    fn interface(&self) -> &'static str {
        "wl_callback"
    }

    fn event_signature(&self, opcode: u16) -> Option<&'static [ArgKind]> {
        EVENTS.get(usize::from(opcode)).copied()
    }

    fn dispatch_event(&self, opcode: u16, mut args: EventArgs) -> Result<()> {
        match opcode {
            DONE => {
                self.done.publish(args.uint()?);
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
