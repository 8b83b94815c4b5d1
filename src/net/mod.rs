//! # Networking Runtime
//!
//! The surface the framework consumes from the room's networking layer:
//! connection state, client identity, entity lookup/create deduplicated by
//! id, the ownership marker, and per-entity attribute change notifications.
//!
//! `SimRuntime` is an in-process implementation over a shared [`RoomHub`].
//! Several sim clients can attach to one hub, which routes every attribute
//! write (echoes included) to every attached client. It is both the
//! reference semantics for the trait and the multi-client test harness.

pub mod entity;
pub mod ownership;
pub mod sync;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info};

/// Opaque identity of one connected client.
pub type ClientId = u64;

/// Stable identifier of a network entity within a room.
pub type NetId = String;

/// State of the connection to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Replication record backing one shared object.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub net_id: NetId,
    /// Client currently allowed to mutate state; `None` means scene-owned.
    pub owner_id: Option<ClientId>,
    pub persistent: bool,
    /// Last-known encoded state string.
    pub serialized: String,
}

/// Result of a create-or-attach call.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    /// The surviving record for the id, whether or not we created it.
    pub record: EntityRecord,
    /// True only for the client whose creation actually won.
    pub created: bool,
}

/// Callback invoked whenever an entity's replicated attribute changes,
/// including echoes of local writes.
pub type AttributeCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// One-shot callback fired when the runtime reaches `Connected`.
pub type ConnectedCallback = Box<dyn FnOnce() + Send + 'static>;

/// What the framework needs from the networking runtime.
pub trait NetworkRuntime: Send + Sync {
    fn connection_state(&self) -> ConnectionState;

    fn client_id(&self) -> ClientId;

    /// Subscribe a one-shot connect callback. Fired immediately if the
    /// runtime is already connected.
    fn on_connected(&self, callback: ConnectedCallback);

    fn entity(&self, net_id: &str) -> Option<EntityRecord>;

    /// Create an entity, deduplicated by id: if a record for `seed.net_id`
    /// already exists the seed is ignored and the existing record returned.
    fn create_entity(&self, seed: EntityRecord) -> CreateOutcome;

    fn remove_entity(&self, net_id: &str);

    fn owner_of(&self, net_id: &str) -> Option<ClientId>;

    /// Optimistically claim ownership of an entity. Broadcasts the claim and
    /// returns true immediately; a later claim from another client wins.
    fn take_ownership(&self, net_id: &str) -> bool;

    /// Write the replicated attribute. Refused while disconnected or for an
    /// unknown entity.
    fn set_attribute(&self, net_id: &str, value: &str) -> bool;

    /// Register an attribute change callback for one entity.
    fn on_attribute_changed(&self, net_id: &str, callback: AttributeCallback);

    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }
}

struct HubInner {
    entities: HashMap<NetId, EntityRecord>,
    subscribers: HashMap<NetId, Vec<AttributeCallback>>,
    next_client_seq: u64,
}

/// Shared in-process room state the sim clients attach to.
pub struct RoomHub {
    inner: Mutex<HubInner>,
}

impl RoomHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(HubInner {
                entities: HashMap::new(),
                subscribers: HashMap::new(),
                next_client_seq: 1,
            }),
        })
    }

    fn allocate_client_id(&self) -> ClientId {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_client_seq;
        inner.next_client_seq += 1;
        // Sequence in the low bits for uniqueness, random high bits so ids
        // are not guessable across sessions.
        ((rand::random::<u32>() as u64) << 32) | seq
    }

    fn entity(&self, net_id: &str) -> Option<EntityRecord> {
        self.inner.lock().unwrap().entities.get(net_id).cloned()
    }

    fn create_entity(&self, seed: EntityRecord) -> CreateOutcome {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.entities.get(&seed.net_id) {
            debug!(
                "entity {} already exists, creation treated as attach",
                seed.net_id
            );
            return CreateOutcome {
                record: existing.clone(),
                created: false,
            };
        }
        info!("created entity {}", seed.net_id);
        inner
            .entities
            .insert(seed.net_id.clone(), seed.clone());
        CreateOutcome {
            record: seed,
            created: true,
        }
    }

    fn remove_entity(&self, net_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entities.remove(net_id).is_some() {
            debug!("removed entity {net_id}");
        }
        inner.subscribers.remove(net_id);
    }

    fn owner_of(&self, net_id: &str) -> Option<ClientId> {
        self.inner
            .lock()
            .unwrap()
            .entities
            .get(net_id)
            .and_then(|record| record.owner_id)
    }

    fn take_ownership(&self, net_id: &str, claimant: ClientId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.entities.get_mut(net_id) {
            Some(record) => {
                record.owner_id = Some(claimant);
                true
            }
            None => false,
        }
    }

    fn set_attribute(&self, net_id: &str, value: &str) -> bool {
        let callbacks = {
            let mut inner = self.inner.lock().unwrap();
            let Some(record) = inner.entities.get_mut(net_id) else {
                return false;
            };
            record.serialized = value.to_string();
            inner
                .subscribers
                .get(net_id)
                .map(|subs| subs.to_vec())
                .unwrap_or_default()
        };
        // Broadcast outside the lock; callbacks may inspect channel state.
        for callback in callbacks {
            callback(value);
        }
        true
    }

    fn subscribe(&self, net_id: &str, callback: AttributeCallback) {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .entry(net_id.to_string())
            .or_default()
            .push(callback);
    }
}

/// In-process networking runtime attached to a [`RoomHub`].
pub struct SimRuntime {
    hub: Arc<RoomHub>,
    client_id: ClientId,
    state: Mutex<ConnectionState>,
    pending_connect: Mutex<Vec<ConnectedCallback>>,
}

impl SimRuntime {
    /// Attach to a hub already connected.
    pub fn join(hub: &Arc<RoomHub>) -> Arc<Self> {
        let runtime = Self::joining(hub);
        runtime.connect();
        runtime
    }

    /// Attach to a hub in the `Connecting` state; `connect` completes it.
    pub fn joining(hub: &Arc<RoomHub>) -> Arc<Self> {
        Arc::new(Self {
            hub: Arc::clone(hub),
            client_id: hub.allocate_client_id(),
            state: Mutex::new(ConnectionState::Connecting),
            pending_connect: Mutex::new(Vec::new()),
        })
    }

    /// Complete the connection, firing any queued connect callbacks.
    pub fn connect(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Connected {
                return;
            }
            *state = ConnectionState::Connected;
        }
        info!("client {:016x} connected to room", self.client_id);
        let pending = std::mem::take(&mut *self.pending_connect.lock().unwrap());
        for callback in pending {
            callback();
        }
    }
}

impl NetworkRuntime for SimRuntime {
    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn on_connected(&self, callback: ConnectedCallback) {
        let connected = self.is_connected();
        if connected {
            callback();
        } else {
            self.pending_connect.lock().unwrap().push(callback);
        }
    }

    fn entity(&self, net_id: &str) -> Option<EntityRecord> {
        self.hub.entity(net_id)
    }

    fn create_entity(&self, seed: EntityRecord) -> CreateOutcome {
        self.hub.create_entity(seed)
    }

    fn remove_entity(&self, net_id: &str) {
        self.hub.remove_entity(net_id);
    }

    fn owner_of(&self, net_id: &str) -> Option<ClientId> {
        self.hub.owner_of(net_id)
    }

    fn take_ownership(&self, net_id: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.hub.take_ownership(net_id, self.client_id)
    }

    fn set_attribute(&self, net_id: &str, value: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.hub.set_attribute(net_id, value)
    }

    fn on_attribute_changed(&self, net_id: &str, callback: AttributeCallback) {
        self.hub.subscribe(net_id, callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn record(net_id: &str) -> EntityRecord {
        EntityRecord {
            net_id: net_id.to_string(),
            owner_id: None,
            persistent: true,
            serialized: String::new(),
        }
    }

    #[test]
    fn connect_callback_fires_immediately_when_connected() {
        let hub = RoomHub::new();
        let runtime = SimRuntime::join(&hub);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        runtime.on_connected(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn connect_callback_is_deferred_until_connected() {
        let hub = RoomHub::new();
        let runtime = SimRuntime::joining(&hub);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        runtime.on_connected(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(!fired.load(Ordering::SeqCst));
        runtime.connect();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn create_entity_deduplicates_by_id() {
        let hub = RoomHub::new();
        let a = SimRuntime::join(&hub);
        let b = SimRuntime::join(&hub);
        let mut seed_a = record("room-42-widget");
        seed_a.serialized = "from-a".to_string();
        let mut seed_b = record("room-42-widget");
        seed_b.serialized = "from-b".to_string();
        let first = a.create_entity(seed_a);
        let second = b.create_entity(seed_b);
        assert!(first.created);
        assert!(!second.created);
        // The late creator attaches to the surviving record.
        assert_eq!(second.record.serialized, "from-a");
        assert_eq!(a.entity("room-42-widget"), b.entity("room-42-widget"));
    }

    #[test]
    fn attribute_writes_broadcast_to_all_clients_including_sender() {
        let hub = RoomHub::new();
        let a = SimRuntime::join(&hub);
        let b = SimRuntime::join(&hub);
        a.create_entity(record("room-cube"));
        let seen = Arc::new(AtomicUsize::new(0));
        for runtime in [&a, &b] {
            let seen = Arc::clone(&seen);
            runtime.on_attribute_changed(
                "room-cube",
                Arc::new(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        assert!(a.set_attribute("room-cube", "payload"));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(b.entity("room-cube").unwrap().serialized, "payload");
    }

    #[test]
    fn ownership_claims_are_last_writer_wins() {
        let hub = RoomHub::new();
        let a = SimRuntime::join(&hub);
        let b = SimRuntime::join(&hub);
        a.create_entity(record("room-cube"));
        assert!(a.take_ownership("room-cube"));
        assert_eq!(a.owner_of("room-cube"), Some(a.client_id()));
        assert!(b.take_ownership("room-cube"));
        assert_eq!(a.owner_of("room-cube"), Some(b.client_id()));
    }

    #[test]
    fn writes_refused_while_disconnected() {
        let hub = RoomHub::new();
        let runtime = SimRuntime::joining(&hub);
        assert!(!runtime.take_ownership("room-cube"));
        assert!(!runtime.set_attribute("room-cube", "x"));
    }
}
