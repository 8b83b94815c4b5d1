//! # Drag/Hover Engine
//!
//! Per-object hit testing for the two hand controllers. A drag is measured
//! on a stabilized billboard plane: the plane passes through the object,
//! faces the viewer, and keeps its up axis locked to the world vertical so
//! camera roll does not twist the drag axes. One engine instance lives in
//! each shared object; at most one drag session is active per object.

use glam::Vec3;
use log::trace;

use crate::types::{Ray, WORLD_UP};

/// Which hand a controller pointer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandSide {
    Left,
    Right,
}

/// Per-frame snapshot of one controller pointer. Exactly two of these are
/// supplied every frame by the host application.
#[derive(Debug, Clone)]
pub struct InteractorState {
    pub side: HandSide,
    /// World-space cursor ray.
    pub ray: Ray,
    /// Interaction tags of the nodes the cursor currently hovers.
    pub hovered: Vec<String>,
    /// Set while the controller is committed to some drag.
    pub held: bool,
}

impl InteractorState {
    pub fn new(side: HandSide, ray: Ray) -> Self {
        Self {
            side,
            ray,
            hovered: Vec::new(),
            held: false,
        }
    }

    pub fn hovers(&self, tag: &str) -> bool {
        self.hovered.iter().any(|t| t == tag)
    }
}

/// Orthonormal basis of an interaction plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneBasis {
    pub origin: Vec3,
    pub normal: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

/// Build the stabilized billboard basis: normal toward the viewer, right
/// horizontal, up in the vertical plane containing the normal. Not a naive
/// camera basis, which would inherit the viewer's roll.
pub fn billboard_basis(origin: Vec3, viewer: Vec3) -> PlaneBasis {
    let to_viewer = viewer - origin;
    let normal = if to_viewer.length_squared() > 1e-10 {
        to_viewer.normalize()
    } else {
        Vec3::Z
    };
    let mut right = WORLD_UP.cross(normal);
    if right.length_squared() < 1e-10 {
        // Viewer straight above or below; any horizontal right works.
        right = Vec3::X;
    } else {
        right = right.normalize();
    }
    let up = normal.cross(right).normalize();
    PlaneBasis {
        origin,
        normal,
        right,
        up,
    }
}

/// Intersect a ray with a plane, in front of the origin only.
pub fn raycast_plane(ray: &Ray, plane: &PlaneBasis) -> Option<Vec3> {
    let denom = plane.normal.dot(ray.dir);
    if denom.abs() < 1e-8 {
        return None;
    }
    let t = plane.normal.dot(plane.origin - ray.origin) / denom;
    if t < 0.0 {
        return None;
    }
    Some(ray.origin + ray.dir * t)
}

/// 2D displacement of a drag, in the plane's right/up axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragDelta {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Debug, Clone)]
struct DragSession {
    side: HandSide,
    plane: PlaneBasis,
    initial_point: Vec3,
    /// Tag of the sub-object the initiating hit actually struck; all later
    /// drag/end events route against it.
    target: String,
}

/// Dual-controller drag state for one shared object.
#[derive(Debug, Default)]
pub struct DragEngine {
    session: Option<DragSession>,
}

impl DragEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    pub fn dragging_side(&self) -> Option<HandSide> {
        self.session.as_ref().map(|s| s.side)
    }

    /// Tag of the sub-object the active session is bound to.
    pub fn active_target(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.target.as_str())
    }

    /// The 0-2 interactors hovering `tag`, excluding any committed to a
    /// different drag. The interactor driving this object's own session
    /// still counts.
    pub fn hovering<'a>(
        &self,
        interactors: &'a [InteractorState],
        tag: &str,
    ) -> Vec<&'a InteractorState> {
        interactors
            .iter()
            .filter(|i| i.hovers(tag))
            .filter(|i| !i.held || self.dragging_side() == Some(i.side))
            .collect()
    }

    /// Begin a drag session. Fails if one is already active for this object
    /// or the interactor's ray misses the interaction plane.
    pub fn start_drag(
        &mut self,
        interactor: &InteractorState,
        target: &str,
        object_pos: Vec3,
        viewer_pos: Vec3,
    ) -> bool {
        if self.session.is_some() {
            trace!("drag on {target} rejected, session already active");
            return false;
        }
        let plane = billboard_basis(object_pos, viewer_pos);
        let Some(initial_point) = raycast_plane(&interactor.ray, &plane) else {
            return false;
        };
        self.session = Some(DragSession {
            side: interactor.side,
            plane,
            initial_point,
            target: target.to_string(),
        });
        true
    }

    /// Measure the current drag displacement against the session's static
    /// plane. A momentary miss returns `None` without cancelling the
    /// session; the anchor point is left untouched.
    pub fn drag(&self, interactor: &InteractorState) -> Option<DragDelta> {
        let session = self.session.as_ref()?;
        if session.side != interactor.side {
            return None;
        }
        let hit = raycast_plane(&interactor.ray, &session.plane)?;
        let offset = hit - session.initial_point;
        Some(DragDelta {
            dx: offset.dot(session.plane.right),
            dy: offset.dot(session.plane.up),
        })
    }

    /// End the session, but only for the interactor that started it. A stale
    /// event from the other controller leaves the session running.
    pub fn end_drag(&mut self, side: HandSide) -> bool {
        match &self.session {
            Some(session) if session.side == side => {
                self.session = None;
                true
            }
            _ => false,
        }
    }
}
