//! # Component Lifecycle Template
//!
//! Orchestrates the life of any "shared interactive object": wait for the
//! host node to load, load component data, build visuals, normalize scale
//! against the host surface, wire interactivity, attach to the network, then
//! run per-frame until teardown. Concrete components plug in through the
//! [`SharedBehavior`] hooks; the template owns the drag engine, the
//! replication channel and the registry entry.

pub mod cube;
pub mod panel;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use glam::Vec3;
use log::{debug, info, warn};

use crate::codec::{self, StateObject};
use crate::error::{RoomError, RoomResult};
use crate::interact::{DragDelta, DragEngine, HandSide, InteractorState};
use crate::net::entity::{self, NetworkEntity};
use crate::net::sync::StateChannel;
use crate::net::NetworkRuntime;
use crate::scene::{Container, InteractionTags, NodeHandle};
use registry::{ComponentRegistry, LiveComponent};

/// Lifecycle phase of a shared object. Linear with one fan-out: the network
/// attachment step only runs for networked objects. A failure before `Live`
/// leaves the object permanently inert at the failing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingHostLoad,
    LoadingData,
    BuildingVisuals,
    NormalizingScale,
    WiringInteractivity,
    AttachingNetwork,
    Live,
    Disposed,
}

/// Immutable capabilities of a shared object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedObjectFlags {
    pub networked: bool,
    pub interactive: bool,
    pub draggable: bool,
}

/// A controller hit against one sub-object of the container.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Interaction tag of the sub-object the hit struck.
    pub target: String,
    pub side: HandSide,
}

/// Domain hooks a concrete shared-interactive-object component supplies.
#[async_trait]
pub trait SharedBehavior: Send {
    /// Component kind, used as the suffix of the derived entity id.
    fn kind(&self) -> &'static str;

    fn flags(&self) -> SharedObjectFlags;

    /// Logical-unit-to-host-surface size ratio, fixed at construction.
    fn relative_size(&self) -> f32 {
        1.0
    }

    /// Async data load. A failure is fatal for this one object only.
    async fn load_data(&mut self) -> RoomResult<()> {
        Ok(())
    }

    /// Populate the container with renderable content.
    fn initialize_data(&mut self, container: &mut Container);

    /// Per-frame domain tick.
    fn tick(&mut self, _container: &mut Container) {}

    /// Hands currently hovering the object, for non-dragging hover effects.
    fn hover(&mut self, _hovering: &[HandSide]) {}

    fn clicked(&mut self, _hit: &Hit) {}

    fn drag_start(&mut self, _hit: &Hit) {}

    fn drag(&mut self, _delta: DragDelta) {}

    fn drag_end(&mut self) {}

    /// Current local state to replicate.
    fn get_shared_data(&self) -> StateObject {
        StateObject::new()
    }

    /// Apply inbound replicated state.
    fn update_shared_data(&mut self, _state: &StateObject) {}

    /// Teardown hook, called before the container is disposed.
    fn remove(&mut self) {}
}

/// Per-room context shared objects are spawned into: the networking runtime
/// (absent for offline rooms) and the registry of live components.
pub struct RoomSession {
    runtime: Option<Arc<dyn NetworkRuntime>>,
    registry: Arc<ComponentRegistry>,
}

impl RoomSession {
    pub fn offline() -> Self {
        Self {
            runtime: None,
            registry: ComponentRegistry::new(),
        }
    }

    pub fn networked(runtime: Arc<dyn NetworkRuntime>) -> Self {
        Self {
            runtime: Some(runtime),
            registry: ComponentRegistry::new(),
        }
    }

    pub fn runtime(&self) -> Option<&Arc<dyn NetworkRuntime>> {
        self.runtime.as_ref()
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }
}

struct NetAttachment {
    runtime: Arc<dyn NetworkRuntime>,
    entity: NetworkEntity,
    channel: StateChannel,
}

/// A locally-rendered, optionally networked, optionally interactive scene
/// object: a behavior plus its container, replication bindings and drag
/// engine, driven through the lifecycle phases.
pub struct SharedObject<B: SharedBehavior> {
    behavior: B,
    host: NodeHandle,
    container: Container,
    kind: &'static str,
    flags: SharedObjectFlags,
    relative_size: f32,
    phase: Phase,
    normalized_for: Option<(f32, f32)>,
    drag: DragEngine,
    net: Option<NetAttachment>,
    runtime: Option<Arc<dyn NetworkRuntime>>,
    registry: Arc<ComponentRegistry>,
}

impl<B: SharedBehavior> SharedObject<B> {
    /// Create the object in `Idle`; [`boot`](Self::boot) drives it to `Live`.
    pub fn new(behavior: B, host: NodeHandle, session: &RoomSession) -> Self {
        let kind = behavior.kind();
        let flags = behavior.flags();
        let relative_size = behavior.relative_size();
        let root = NodeHandle::new(&format!("{}-{}-container", host.name(), kind));
        Self {
            behavior,
            host,
            container: Container::new(root),
            kind,
            flags,
            relative_size,
            phase: Phase::Idle,
            normalized_for: None,
            drag: DragEngine::new(),
            net: None,
            runtime: session.runtime().cloned(),
            registry: Arc::clone(session.registry()),
        }
    }

    /// Convenience: construct and boot in one call.
    pub async fn spawn(behavior: B, host: NodeHandle, session: &RoomSession) -> RoomResult<Self> {
        let mut object = Self::new(behavior, host, session);
        object.boot().await?;
        Ok(object)
    }

    /// Drive the lifecycle to `Live`. On error the object stays at the
    /// failing phase, permanently inert; no retry is attempted.
    pub async fn boot(&mut self) -> RoomResult<()> {
        self.phase = Phase::AwaitingHostLoad;
        self.host.await_loaded().await;
        if self.host.is_removed() {
            return Err(RoomError::NodeGone);
        }

        self.phase = Phase::LoadingData;
        self.behavior.load_data().await?;

        self.phase = Phase::BuildingVisuals;
        self.host.attach_child(self.container.root());
        self.behavior.initialize_data(&mut self.container);

        self.phase = Phase::NormalizingScale;
        self.normalize_scale();

        self.phase = Phase::WiringInteractivity;
        if self.flags.interactive {
            self.container.root().set_interaction(InteractionTags {
                hoverable: true,
                clickable: true,
                metadata: Some(self.interaction_tag()),
            });
        } else {
            self.host.clear_interaction();
        }

        if self.flags.networked {
            match self.runtime.clone() {
                Some(runtime) => {
                    self.phase = Phase::AttachingNetwork;
                    let initial = self.behavior.get_shared_data();
                    let seed = codec::encode(&initial).map_err(|e| {
                        warn!("{}: initial state not encodable", self.kind);
                        e
                    })?;
                    let resolved =
                        entity::resolve(Arc::clone(&runtime), &self.host, self.kind, &seed).await;
                    let channel = StateChannel::attach(Arc::clone(&runtime), &resolved, initial);
                    self.net = Some(NetAttachment {
                        runtime,
                        entity: resolved,
                        channel,
                    });
                }
                None => {
                    warn!(
                        "{}: networked flag set but the session has no runtime, staying local",
                        self.kind
                    );
                }
            }
        }

        self.phase = Phase::Live;
        self.registry.register(LiveComponent {
            host: self.host.clone(),
            kind: self.kind,
            net_id: self.net.as_ref().map(|net| net.entity.net_id.clone()),
        });
        info!("{} live on node {}", self.kind, self.host.name());
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut B {
        &mut self.behavior
    }

    pub fn net_entity(&self) -> Option<&NetworkEntity> {
        self.net.as_ref().map(|net| &net.entity)
    }

    /// Tag hit-testing reports for this object's container.
    pub fn interaction_tag(&self) -> String {
        self.container.root().name()
    }

    /// Size the container against the host surface and collapse the host's
    /// own scale so the container's is the single source of truth. Runs at
    /// most once per authored size.
    fn normalize_scale(&mut self) {
        let authored = self.host.authored_size();
        if self.normalized_for == Some(authored) {
            return;
        }
        let (width, height) = authored;
        let scale = (width * self.relative_size).min(height * self.relative_size);
        self.container.root().set_local_scale(Vec3::splat(scale));
        self.host.collapse_scale();
        self.normalized_for = Some(authored);
        debug!("{}: normalized scale to {scale}", self.kind);
    }

    /// Re-check authored properties. Renormalizes only if the authored host
    /// size actually changed.
    pub fn update(&mut self) {
        if self.phase == Phase::Live {
            self.normalize_scale();
        }
    }

    /// Per-frame tick: behavior tick, then inbound replication, then
    /// hover/drag polling. No-op unless `Live`.
    pub fn tick(&mut self, interactors: &[InteractorState]) {
        if self.phase != Phase::Live {
            return;
        }
        self.behavior.tick(&mut self.container);

        if let Some(net) = &self.net {
            if let Some(state) = net.channel.take_changed() {
                self.behavior.update_shared_data(&state);
            }
        }

        if self.flags.interactive {
            if let Some(side) = self.drag.dragging_side() {
                if let Some(interactor) = interactors.iter().find(|i| i.side == side) {
                    if let Some(delta) = self.drag.drag(interactor) {
                        self.behavior.drag(delta);
                    }
                }
            }
            let tag = self.interaction_tag();
            let hovering: Vec<HandSide> = self
                .drag
                .hovering(interactors, &tag)
                .iter()
                .map(|i| i.side)
                .collect();
            self.behavior.hover(&hovering);
        }
    }

    /// Route a click from hit-testing to the behavior.
    pub fn handle_click(&mut self, side: HandSide, target: &str) {
        if self.phase != Phase::Live || !self.flags.interactive {
            return;
        }
        self.behavior.clicked(&Hit {
            target: target.to_string(),
            side,
        });
    }

    /// Start a drag against the sub-object `target`. Fails if the object is
    /// not draggable, a session is already active, or the ray misses the
    /// interaction plane.
    pub fn begin_drag(
        &mut self,
        interactor: &InteractorState,
        target: &str,
        viewer_pos: Vec3,
    ) -> bool {
        if self.phase != Phase::Live || !self.flags.interactive || !self.flags.draggable {
            return false;
        }
        let object_pos = self.container.root().world_transform().position;
        if self
            .drag
            .start_drag(interactor, target, object_pos, viewer_pos)
        {
            self.behavior.drag_start(&Hit {
                target: target.to_string(),
                side: interactor.side,
            });
            true
        } else {
            false
        }
    }

    /// End the active drag, if `side` is the hand that started it.
    pub fn finish_drag(&mut self, side: HandSide) {
        if self.drag.end_drag(side) {
            self.behavior.drag_end();
        }
    }

    /// Sub-object the active drag session is bound to.
    pub fn drag_target(&self) -> Option<&str> {
        self.drag.active_target()
    }

    /// Push the behavior's current state to the network. Returns whether the
    /// write was accepted; refusal is not an error, the next user gesture
    /// retries implicitly.
    pub fn set_shared_data(&mut self) -> bool {
        match &self.net {
            Some(net) => net.channel.set_state(&self.behavior.get_shared_data()),
            None => false,
        }
    }

    /// Tear the object down: behavior hook, container resources, scene node,
    /// and the entity if this client created it.
    pub fn dispose(&mut self) {
        if self.phase == Phase::Disposed {
            return;
        }
        self.registry.deregister(self.host.id());
        self.behavior.remove();
        self.container.dispose();
        self.container.root().remove();
        if let Some(net) = &self.net {
            if net.entity.created_locally {
                net.runtime.remove_entity(&net.entity.net_id);
            }
        }
        self.phase = Phase::Disposed;
        debug!("{} disposed", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{RoomHub, SimRuntime};
    use crate::types::Ray;

    /// Minimal behavior: neither networked nor interactive.
    struct Ornament {
        initialized: bool,
        removed: bool,
    }

    impl Ornament {
        fn new() -> Self {
            Self {
                initialized: false,
                removed: false,
            }
        }
    }

    #[async_trait]
    impl SharedBehavior for Ornament {
        fn kind(&self) -> &'static str {
            "ornament"
        }

        fn flags(&self) -> SharedObjectFlags {
            SharedObjectFlags {
                networked: false,
                interactive: false,
                draggable: false,
            }
        }

        fn relative_size(&self) -> f32 {
            0.5
        }

        fn initialize_data(&mut self, container: &mut Container) {
            container.add_geometry("ornament-mesh");
            self.initialized = true;
        }

        fn remove(&mut self) {
            self.removed = true;
        }
    }

    fn loaded_host(name: &str, width: f32, height: f32) -> NodeHandle {
        let host = NodeHandle::with_size(name, width, height);
        host.mark_loaded();
        host
    }

    #[tokio::test]
    async fn plain_object_reaches_live_without_network_or_wiring() {
        let session = RoomSession::offline();
        let host = loaded_host("shelf", 1.0, 1.0);
        // Host carries stale interactivity markers from a template.
        host.set_interaction(InteractionTags {
            hoverable: true,
            clickable: true,
            metadata: Some("stale".to_string()),
        });

        let object = SharedObject::spawn(Ornament::new(), host.clone(), &session)
            .await
            .unwrap();
        assert!(object.is_live());
        assert!(object.behavior().initialized);
        assert!(object.net_entity().is_none());
        // No hover/drag wiring on the container, and the host markers are
        // stripped for non-interactive objects.
        assert_eq!(object.container().root().interaction(), InteractionTags::default());
        assert_eq!(host.interaction(), InteractionTags::default());
        assert!(session.registry().contains(host.id()));
    }

    #[tokio::test]
    async fn scale_normalizes_once_until_the_authored_size_changes() {
        let session = RoomSession::offline();
        let host = loaded_host("wall", 2.0, 4.0);
        host.set_local_scale(Vec3::splat(3.0));

        let mut object = SharedObject::spawn(Ornament::new(), host.clone(), &session)
            .await
            .unwrap();
        // min(2.0, 4.0) * 0.5, with the host scale collapsed.
        assert_eq!(object.container().root().local_transform().scale, Vec3::splat(1.0));
        assert_eq!(host.local_transform().scale, Vec3::ONE);

        // Unchanged authored size: update must not re-trigger normalization.
        object.container().root().set_local_scale(Vec3::splat(9.0));
        object.update();
        assert_eq!(object.container().root().local_transform().scale, Vec3::splat(9.0));

        host.set_authored_size(4.0, 4.0);
        object.update();
        assert_eq!(object.container().root().local_transform().scale, Vec3::splat(2.0));
    }

    #[tokio::test]
    async fn boot_suspends_until_the_host_finishes_loading() {
        let session = RoomSession::offline();
        let host = NodeHandle::new("slow-shelf");
        let mut object = SharedObject::new(Ornament::new(), host.clone(), &session);
        let booting = async {
            object.boot().await.unwrap();
            object
        };
        let host_loader = async {
            tokio::task::yield_now().await;
            host.mark_loaded();
        };
        let (object, ()) = tokio::join!(booting, host_loader);
        assert!(object.is_live());
    }

    #[tokio::test]
    async fn dispose_releases_resources_and_the_created_entity() {
        let hub = RoomHub::new();
        let runtime: Arc<dyn NetworkRuntime> = SimRuntime::join(&hub);
        let session = RoomSession::networked(Arc::clone(&runtime));
        let host = loaded_host("pedestal", 1.0, 1.0);

        let mut object = SharedObject::spawn(cube::DemoCube::new(), host.clone(), &session)
            .await
            .unwrap();
        let net_id = object.net_entity().unwrap().net_id.clone();
        assert!(runtime.entity(&net_id).is_some());
        let resources: Vec<_> = object.container().resources().to_vec();
        assert!(!resources.is_empty());

        object.dispose();
        assert_eq!(object.phase(), Phase::Disposed);
        assert!(resources.iter().all(|r| r.is_disposed()));
        assert!(object.behavior().was_removed());
        assert!(runtime.entity(&net_id).is_none());
        assert!(!session.registry().contains(host.id()));
        assert!(host.children().is_empty());
    }

    #[tokio::test]
    async fn a_late_joiner_adopts_the_replicated_state() {
        let hub = RoomHub::new();
        let runtime_a: Arc<dyn NetworkRuntime> = SimRuntime::join(&hub);
        let runtime_b: Arc<dyn NetworkRuntime> = SimRuntime::join(&hub);
        let session_a = RoomSession::networked(Arc::clone(&runtime_a));
        let session_b = RoomSession::networked(Arc::clone(&runtime_b));

        // Both clients see the same host node name, hence the same net id.
        let mut a = SharedObject::spawn(
            cube::DemoCube::new(),
            loaded_host("pedestal", 1.0, 1.0),
            &session_a,
        )
        .await
        .unwrap();
        a.handle_click(HandSide::Right, &a.interaction_tag());
        assert!(a.set_shared_data());
        let color = a.behavior().color().to_string();

        let mut b = SharedObject::spawn(
            cube::DemoCube::new(),
            loaded_host("pedestal", 1.0, 1.0),
            &session_b,
        )
        .await
        .unwrap();
        assert!(!b.net_entity().unwrap().created_locally);
        b.tick(&[]);
        assert_eq!(b.behavior().color(), color);
    }

    #[tokio::test]
    async fn drag_events_route_through_the_behavior() {
        let session = RoomSession::offline();
        let host = loaded_host("pedestal", 1.0, 1.0);
        let mut object = SharedObject::spawn(cube::DemoCube::new(), host, &session)
            .await
            .unwrap();

        let viewer = Vec3::new(0.0, 0.0, 5.0);
        let object_pos = object.container().root().world_transform().position;
        let tag = object.interaction_tag();
        let mut pointer = InteractorState::new(
            HandSide::Right,
            Ray::new(Vec3::new(0.0, 0.0, 4.0), object_pos - Vec3::new(0.0, 0.0, 4.0)),
        );
        pointer.hovered.push(tag.clone());

        assert!(object.begin_drag(&pointer, &tag, viewer));
        assert_eq!(object.drag_target(), Some(tag.as_str()));
        // A second hand cannot steal the session.
        let left = InteractorState::new(HandSide::Left, pointer.ray);
        assert!(!object.begin_drag(&left, &tag, viewer));

        let yaw_before = object.behavior().yaw();
        let basis = crate::interact::billboard_basis(object_pos, viewer);
        let moved = InteractorState::new(
            HandSide::Right,
            Ray::new(
                Vec3::new(0.0, 0.0, 4.0),
                object_pos + basis.right * 0.5 - Vec3::new(0.0, 0.0, 4.0),
            ),
        );
        object.tick(&[moved]);
        assert!(object.behavior().yaw() > yaw_before);

        // The wrong hand cannot end the session.
        object.finish_drag(HandSide::Left);
        assert_eq!(object.drag_target(), Some(tag.as_str()));
        object.finish_drag(HandSide::Right);
        assert!(object.drag_target().is_none());
    }
}
