//! Object registry mapping ids to live proxies.
//!
//! Ids are assigned sequentially starting from 1 (0 is reserved) and are
//! never reused while the registry lives, so a late event for a destroyed
//! object can never reach a newer one.
//!
//! The registry itself is not synchronised. The connection keeps it behind
//! a single mutex that covers both id allocation and the mapping.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Proxy, ProxyId};
use crate::error::{Result, WaylandError};

/// First id of the server-allocated range. Client ids stay below it.
pub const FIRST_SERVER_ID: u32 = 0xFF00_0000;

/// Registry mapping object ids to proxies.
pub struct ObjectRegistry {
    /// Last id handed out.
    current_id: u32,
    /// Live objects by id.
    objects: HashMap<ProxyId, Arc<dyn Proxy>>,
}

impl ObjectRegistry {
    /// Create an empty registry with the id counter at 0.
    pub fn new() -> Self {
        Self {
            current_id: 0,
            objects: HashMap::new(),
        }
    }

    /// Reserve the next id.
    ///
    /// # Errors
    ///
    /// `IdSpaceExhausted` once the client range is used up.
    pub fn allocate(&mut self) -> Result<ProxyId> {
        let next = self.current_id + 1;
        if next >= FIRST_SERVER_ID {
            return Err(WaylandError::IdSpaceExhausted);
        }
        self.current_id = next;
        ProxyId::new(next).ok_or(WaylandError::IdSpaceExhausted)
    }

    /// Allocate an id, build the proxy for it and insert it.
    pub fn register<P, F>(&mut self, build: F) -> Result<Arc<P>>
    where
        P: Proxy,
        F: FnOnce(ProxyId) -> P,
    {
        let id = self.allocate()?;
        let proxy = Arc::new(build(id));
        self.objects.insert(id, proxy.clone());
        Ok(proxy)
    }

    /// Insert a proxy under its own id.
    ///
    /// Used for objects whose id was fixed up front, like the display. The
    /// counter moves past the id so it is never handed out again.
    pub fn insert(&mut self, proxy: Arc<dyn Proxy>) {
        let id = proxy.id();
        self.current_id = self.current_id.max(id.get());
        self.objects.insert(id, proxy);
    }

    /// Remove an object. Removing an absent id is a no-op.
    pub fn unregister(&mut self, id: ProxyId) -> Option<Arc<dyn Proxy>> {
        self.objects.remove(&id)
    }

    /// Look up a live object.
    pub fn resolve(&self, id: ProxyId) -> Option<Arc<dyn Proxy>> {
        self.objects.get(&id).cloned()
    }

    /// Check if an id is live.
    pub fn contains(&self, id: ProxyId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no object is live.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Last id handed out.
    pub fn current_id(&self) -> u32 {
        self.current_id
    }

    /// Drop every object. Called once the connection is closed.
    pub(crate) fn clear(&mut self) {
        self.objects.clear();
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::WeakConnection;
    use crate::object::testing::RecordingProxy;
    use crate::object::ProxyCore;

    fn detached(id: ProxyId) -> RecordingProxy {
        RecordingProxy::new(ProxyCore::new(id, WeakConnection::default()))
    }

    #[test]
    fn test_registry_ids_start_at_one() {
        let mut registry = ObjectRegistry::new();
        let first = registry.register(detached).unwrap();
        let second = registry.register(detached).unwrap();
        assert_eq!(first.id().get(), 1);
        assert_eq!(second.id().get(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_insert_moves_counter_past_fixed_id() {
        let mut registry = ObjectRegistry::new();
        registry.insert(Arc::new(detached(ProxyId::DISPLAY)));
        assert_eq!(registry.current_id(), 1);

        let next = registry.register(detached).unwrap();
        assert_eq!(next.id().get(), 2);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut registry = ObjectRegistry::new();
        let a = registry.register(detached).unwrap();
        registry.unregister(a.id());
        let b = registry.register(detached).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_resolve_stale_and_unknown() {
        let mut registry = ObjectRegistry::new();
        let proxy = registry.register(detached).unwrap();
        let id = proxy.id();
        assert!(registry.resolve(id).is_some());

        assert!(registry.unregister(id).is_some());
        assert!(registry.resolve(id).is_none());
        assert!(!registry.contains(id));
        assert!(registry.resolve(ProxyId::new(999).unwrap()).is_none());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = ObjectRegistry::new();
        let proxy = registry.register(detached).unwrap();
        assert!(registry.unregister(proxy.id()).is_some());
        assert!(registry.unregister(proxy.id()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_id_space_exhausted() {
        let mut registry = ObjectRegistry::new();
        registry.current_id = FIRST_SERVER_ID - 2;
        assert_eq!(registry.allocate().unwrap().get(), FIRST_SERVER_ID - 1);

        let err = registry.allocate().unwrap_err();
        assert!(matches!(err, WaylandError::IdSpaceExhausted));
        assert_eq!(registry.current_id(), FIRST_SERVER_ID - 1);
    }
}
