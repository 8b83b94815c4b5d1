//! # Live Component Registry
//!
//! Explicit registry of the shared objects currently live in one room
//! session. Consumers such as the region culling pass walk it to find
//! interactive content; it is an owned object passed by reference, scoped
//! to the session, never a process-wide singleton.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::net::NetId;
use crate::scene::{NodeHandle, NodeId};

/// One live shared object, as seen by room-level subsystems.
#[derive(Debug, Clone)]
pub struct LiveComponent {
    pub host: NodeHandle,
    pub kind: &'static str,
    /// Set for networked objects once their entity resolved.
    pub net_id: Option<NetId>,
}

/// Registry of live components for one room session.
#[derive(Default)]
pub struct ComponentRegistry {
    inner: Mutex<HashMap<NodeId, LiveComponent>>,
}

impl ComponentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(&self, entry: LiveComponent) {
        self.inner.lock().unwrap().insert(entry.host.id(), entry);
    }

    pub(crate) fn deregister(&self, host: NodeId) {
        self.inner.lock().unwrap().remove(&host);
    }

    pub fn contains(&self, host: NodeId) -> bool {
        self.inner.lock().unwrap().contains_key(&host)
    }

    pub fn get(&self, host: NodeId) -> Option<LiveComponent> {
        self.inner.lock().unwrap().get(&host).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Snapshot of every live component, in no particular order.
    pub fn snapshot(&self) -> Vec<LiveComponent> {
        self.inner.lock().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_deregister_round_trip() {
        let registry = ComponentRegistry::new();
        let host = NodeHandle::new("widget");
        registry.register(LiveComponent {
            host: host.clone(),
            kind: "cube",
            net_id: Some("room-cube".to_string()),
        });
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(host.id()));
        assert_eq!(registry.get(host.id()).unwrap().kind, "cube");
        registry.deregister(host.id());
        assert!(registry.is_empty());
    }
}
