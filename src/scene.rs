//! # Scene-Graph Collaborator Model
//!
//! Client-side representation of the scene-graph nodes the rendering engine
//! owns: world transforms, a "finished loading" event, child attach/detach,
//! interaction tagging and the networked binding carried by room-level
//! ancestors. The framework only ever talks to the engine through this
//! surface, mirroring how the rest of the room client keeps a local shadow
//! of engine objects.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use glam::Vec3;
use tokio::sync::watch;

use crate::types::Transform;

/// Unique identifier for scene nodes within one client.
pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Hover/click markers plus the tag metadata hit-testing reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionTags {
    pub hoverable: bool,
    pub clickable: bool,
    pub metadata: Option<String>,
}

/// Network identity carried by a networked ancestor node.
#[derive(Debug, Clone, PartialEq)]
pub struct NetBinding {
    pub net_id: String,
    pub persistent: bool,
}

struct NodeInner {
    name: String,
    local: Transform,
    /// Authored width/height of the host surface, in room units.
    authored_size: (f32, f32),
    parent: Option<Weak<NodeShared>>,
    children: Vec<NodeHandle>,
    tags: InteractionTags,
    net: Option<NetBinding>,
    removed: bool,
}

struct NodeShared {
    id: NodeId,
    inner: Mutex<NodeInner>,
    loaded_tx: watch::Sender<bool>,
}

/// Shared handle to one scene node.
#[derive(Clone)]
pub struct NodeHandle(Arc<NodeShared>);

impl NodeHandle {
    pub fn new(name: &str) -> Self {
        Self::with_size(name, 1.0, 1.0)
    }

    pub fn with_size(name: &str, width: f32, height: f32) -> Self {
        let (loaded_tx, _) = watch::channel(false);
        Self(Arc::new(NodeShared {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(NodeInner {
                name: name.to_string(),
                local: Transform::identity(),
                authored_size: (width, height),
                parent: None,
                children: Vec::new(),
                tags: InteractionTags::default(),
                net: None,
                removed: false,
            }),
            loaded_tx,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn name(&self) -> String {
        self.0.inner.lock().unwrap().name.clone()
    }

    pub fn local_transform(&self) -> Transform {
        self.0.inner.lock().unwrap().local
    }

    pub fn set_local_transform(&self, transform: Transform) {
        self.0.inner.lock().unwrap().local = transform;
    }

    pub fn set_local_scale(&self, scale: Vec3) {
        self.0.inner.lock().unwrap().local.scale = scale;
    }

    /// Collapse this node's own scale to identity. Used once the container's
    /// normalized scale becomes the single source of truth.
    pub fn collapse_scale(&self) {
        self.set_local_scale(Vec3::ONE);
    }

    /// World transform, composed root-down through the parent chain.
    pub fn world_transform(&self) -> Transform {
        let (local, parent) = {
            let inner = self.0.inner.lock().unwrap();
            (inner.local, inner.parent.clone())
        };
        match parent.and_then(|weak| weak.upgrade()) {
            Some(parent) => NodeHandle(parent).world_transform().mul_transform(&local),
            None => local,
        }
    }

    pub fn authored_size(&self) -> (f32, f32) {
        self.0.inner.lock().unwrap().authored_size
    }

    pub fn set_authored_size(&self, width: f32, height: f32) {
        self.0.inner.lock().unwrap().authored_size = (width, height);
    }

    pub fn attach_child(&self, child: &NodeHandle) {
        child.0.inner.lock().unwrap().parent = Some(Arc::downgrade(&self.0));
        self.0.inner.lock().unwrap().children.push(child.clone());
    }

    pub fn detach_child(&self, id: NodeId) {
        let mut inner = self.0.inner.lock().unwrap();
        inner.children.retain(|c| c.id() != id);
    }

    pub fn children(&self) -> Vec<NodeHandle> {
        self.0.inner.lock().unwrap().children.clone()
    }

    pub fn interaction(&self) -> InteractionTags {
        self.0.inner.lock().unwrap().tags.clone()
    }

    pub fn set_interaction(&self, tags: InteractionTags) {
        self.0.inner.lock().unwrap().tags = tags;
    }

    /// Strip any inherited hover/click markers from this node.
    pub fn clear_interaction(&self) {
        self.set_interaction(InteractionTags::default());
    }

    pub fn net_binding(&self) -> Option<NetBinding> {
        self.0.inner.lock().unwrap().net.clone()
    }

    pub fn set_net_binding(&self, binding: NetBinding) {
        self.0.inner.lock().unwrap().net = Some(binding);
    }

    /// Nearest binding on this node or an ancestor, if any.
    pub fn networked_ancestor_binding(&self) -> Option<NetBinding> {
        let (net, parent) = {
            let inner = self.0.inner.lock().unwrap();
            (inner.net.clone(), inner.parent.clone())
        };
        if net.is_some() {
            return net;
        }
        parent
            .and_then(|weak| weak.upgrade())
            .and_then(|parent| NodeHandle(parent).networked_ancestor_binding())
    }

    pub fn is_loaded(&self) -> bool {
        *self.0.loaded_tx.borrow()
    }

    /// Signal that the engine finished loading this node, waking any waiter.
    pub fn mark_loaded(&self) {
        self.0.loaded_tx.send_replace(true);
    }

    /// Suspend until the node reports it finished loading. Returns
    /// immediately if it already has.
    pub async fn await_loaded(&self) {
        let mut rx = self.0.loaded_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_removed(&self) -> bool {
        self.0.inner.lock().unwrap().removed
    }

    /// Detach from the parent and mark the node gone.
    pub fn remove(&self) {
        let parent = {
            let mut inner = self.0.inner.lock().unwrap();
            inner.removed = true;
            inner.parent.take()
        };
        if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
            NodeHandle(parent).detach_child(self.id());
        }
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

/// Kind of GPU-side resource a container owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Geometry,
    Material,
}

/// Handle to an engine resource the container exclusively owns and must
/// dispose on teardown.
#[derive(Clone)]
pub struct GpuResource {
    kind: ResourceKind,
    label: String,
    disposed: Arc<AtomicBool>,
}

impl GpuResource {
    fn new(kind: ResourceKind, label: &str) -> Self {
        Self {
            kind,
            label: label.to_string(),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuResource")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// The visual subtree a shared object owns: a root node plus the geometry
/// and material resources created for it. Destroyed as a unit on teardown.
#[derive(Debug)]
pub struct Container {
    root: NodeHandle,
    resources: Vec<GpuResource>,
}

impl Container {
    pub fn new(root: NodeHandle) -> Self {
        Self {
            root,
            resources: Vec::new(),
        }
    }

    pub fn root(&self) -> &NodeHandle {
        &self.root
    }

    pub fn add_geometry(&mut self, label: &str) -> GpuResource {
        let resource = GpuResource::new(ResourceKind::Geometry, label);
        self.resources.push(resource.clone());
        resource
    }

    pub fn add_material(&mut self, label: &str) -> GpuResource {
        let resource = GpuResource::new(ResourceKind::Material, label);
        self.resources.push(resource.clone());
        resource
    }

    pub fn resources(&self) -> &[GpuResource] {
        &self.resources
    }

    /// Release everything the container owns.
    pub fn dispose(&mut self) {
        for resource in &self.resources {
            resource.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_transform_composes_through_parents() {
        let parent = NodeHandle::new("room");
        let child = NodeHandle::new("widget");
        parent.attach_child(&child);
        parent.set_local_transform(Transform::from_position(Vec3::new(0.0, 2.0, 0.0)));
        child.set_local_transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0)));
        let world = child.world_transform();
        assert!((world.position - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn networked_ancestor_binding_walks_upward() {
        let room = NodeHandle::new("room");
        room.set_net_binding(NetBinding {
            net_id: "room-42".to_string(),
            persistent: false,
        });
        let wall = NodeHandle::new("wall");
        let widget = NodeHandle::new("widget");
        room.attach_child(&wall);
        wall.attach_child(&widget);
        let binding = widget.networked_ancestor_binding().unwrap();
        assert_eq!(binding.net_id, "room-42");
        assert!(!binding.persistent);
        assert!(NodeHandle::new("orphan").networked_ancestor_binding().is_none());
    }

    #[tokio::test]
    async fn await_loaded_resumes_on_mark() {
        let node = NodeHandle::new("slow");
        let waiter = node.clone();
        let task = tokio::spawn(async move { waiter.await_loaded().await });
        assert!(!node.is_loaded());
        node.mark_loaded();
        task.await.unwrap();
        assert!(node.is_loaded());
        // Already-loaded nodes resume immediately.
        node.await_loaded().await;
    }

    #[test]
    fn remove_detaches_from_parent() {
        let parent = NodeHandle::new("room");
        let child = NodeHandle::new("widget");
        parent.attach_child(&child);
        assert_eq!(parent.children().len(), 1);
        child.remove();
        assert!(child.is_removed());
        assert!(parent.children().is_empty());
    }

    #[test]
    fn container_dispose_releases_all_resources() {
        let mut container = Container::new(NodeHandle::new("container"));
        let geometry = container.add_geometry("cube-mesh");
        let material = container.add_material("cube-material");
        container.dispose();
        assert!(geometry.is_disposed());
        assert!(material.is_disposed());
    }
}
