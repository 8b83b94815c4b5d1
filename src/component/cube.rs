//! # Demo Cube Component
//!
//! The reference shared object: a colored cube every participant can see,
//! click to recolor and drag to spin. Color and spin replicate through the
//! shared state object, so the cube doubles as the smoke test for the whole
//! networking path.

use glam::{EulerRot, Quat};
use log::debug;
use serde_json::{json, Value};

use super::{Hit, SharedBehavior, SharedObjectFlags};
use crate::codec::StateObject;
use crate::scene::Container;

/// Color names clicks cycle through. Names, not channel values, so the
/// replicated state stays human-readable.
pub const PALETTE: [&str; 5] = ["white", "red", "green", "blue", "yellow"];

/// Radians of spin per meter of drag on the interaction plane.
const SPIN_RATE: f32 = 2.5;

/// Pitch never passes the poles, so the cube cannot be flipped upside down.
const PITCH_LIMIT: f32 = 1.2;

/// A click-to-recolor, drag-to-spin cube.
pub struct DemoCube {
    color_index: usize,
    yaw: f32,
    pitch: f32,
    drag_base: Option<(f32, f32)>,
    hovered: bool,
    removed: bool,
}

impl DemoCube {
    pub fn new() -> Self {
        Self {
            color_index: 0,
            yaw: 0.0,
            pitch: 0.0,
            drag_base: None,
            hovered: false,
            removed: false,
        }
    }

    pub fn color(&self) -> &'static str {
        PALETTE[self.color_index]
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    pub fn was_removed(&self) -> bool {
        self.removed
    }

    fn set_color(&mut self, name: &str) {
        if let Some(index) = PALETTE.iter().position(|c| *c == name) {
            self.color_index = index;
        } else {
            debug!("unknown cube color {name:?}, keeping current");
        }
    }
}

impl Default for DemoCube {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SharedBehavior for DemoCube {
    fn kind(&self) -> &'static str {
        "cube"
    }

    fn flags(&self) -> SharedObjectFlags {
        SharedObjectFlags {
            networked: true,
            interactive: true,
            draggable: true,
        }
    }

    fn relative_size(&self) -> f32 {
        0.25
    }

    fn initialize_data(&mut self, container: &mut Container) {
        container.add_geometry("cube-mesh");
        container.add_material("cube-material");
    }

    fn tick(&mut self, container: &mut Container) {
        // The spin lives on the container root; position and scale are the
        // lifecycle's to manage.
        let mut transform = container.root().local_transform();
        transform.rotation = Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0);
        container.root().set_local_transform(transform);
    }

    fn hover(&mut self, hovering: &[super::HandSide]) {
        self.hovered = !hovering.is_empty();
    }

    fn clicked(&mut self, _hit: &Hit) {
        self.color_index = (self.color_index + 1) % PALETTE.len();
        debug!("cube recolored to {}", self.color());
    }

    fn drag_start(&mut self, _hit: &Hit) {
        self.drag_base = Some((self.yaw, self.pitch));
    }

    fn drag(&mut self, delta: crate::interact::DragDelta) {
        // Deltas measure from the drag anchor, so the spin is recomputed
        // from the orientation captured at drag start.
        let Some((base_yaw, base_pitch)) = self.drag_base else {
            return;
        };
        self.yaw = base_yaw + delta.dx * SPIN_RATE;
        self.pitch = (base_pitch - delta.dy * SPIN_RATE).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    fn drag_end(&mut self) {
        self.drag_base = None;
    }

    fn get_shared_data(&self) -> StateObject {
        let mut state = StateObject::new();
        state.insert("color".to_string(), json!(self.color()));
        state.insert("yaw".to_string(), json!(self.yaw));
        state.insert("pitch".to_string(), json!(self.pitch));
        state
    }

    fn update_shared_data(&mut self, state: &StateObject) {
        if let Some(Value::String(name)) = state.get("color") {
            self.set_color(name);
        }
        if let Some(yaw) = state.get("yaw").and_then(Value::as_f64) {
            self.yaw = yaw as f32;
        }
        if let Some(pitch) = state.get("pitch").and_then(Value::as_f64) {
            self.pitch = (pitch as f32).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
    }

    fn remove(&mut self) {
        self.removed = true;
    }
}
