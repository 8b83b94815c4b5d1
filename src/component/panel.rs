//! # Shared Panel Component
//!
//! A flat content panel with two draggable sub-objects: the surface, which
//! scrolls its content, and the handle below it, which repositions the whole
//! panel. The two are told apart by the interaction tag of the sub-object
//! the initiating hit struck, and the panel's position and scroll replicate
//! so every participant reads the same page.

use glam::Vec3;
use log::debug;
use serde_json::{json, Value};

use super::{Hit, SharedBehavior, SharedObjectFlags};
use crate::codec::StateObject;
use crate::error::{RoomError, RoomResult};
use crate::interact::DragDelta;
use crate::scene::{Container, InteractionTags, NodeHandle};

/// Interaction tag of the scrollable content surface.
pub const SURFACE: &str = "panel-surface";
/// Interaction tag of the move handle under the surface.
pub const HANDLE: &str = "panel-handle";

/// Recorded at drag start so deltas apply against a fixed base.
#[derive(Debug, Clone)]
struct PanelDrag {
    target: String,
    base_offset: (f32, f32),
    base_scroll: f32,
}

/// A movable, scrollable content panel.
pub struct SharedPanel {
    url: String,
    loaded: bool,
    offset: (f32, f32),
    scroll: f32,
    drag: Option<PanelDrag>,
    removed: bool,
}

impl SharedPanel {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            loaded: false,
            offset: (0.0, 0.0),
            scroll: 0.0,
            drag: None,
            removed: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn offset(&self) -> (f32, f32) {
        self.offset
    }

    pub fn scroll(&self) -> f32 {
        self.scroll
    }

    pub fn was_removed(&self) -> bool {
        self.removed
    }
}

#[async_trait::async_trait]
impl SharedBehavior for SharedPanel {
    fn kind(&self) -> &'static str {
        "panel"
    }

    fn flags(&self) -> SharedObjectFlags {
        SharedObjectFlags {
            networked: true,
            interactive: true,
            draggable: true,
        }
    }

    fn relative_size(&self) -> f32 {
        0.8
    }

    async fn load_data(&mut self) -> RoomResult<()> {
        if self.url.is_empty() {
            return Err(RoomError::Load("panel content url not configured".to_string()));
        }
        // Content fetch is the engine's job; this side only records that the
        // panel has something to show.
        self.loaded = true;
        debug!("panel content ready from {}", self.url);
        Ok(())
    }

    fn initialize_data(&mut self, container: &mut Container) {
        let surface = NodeHandle::new(SURFACE);
        surface.set_interaction(InteractionTags {
            hoverable: true,
            clickable: true,
            metadata: Some(SURFACE.to_string()),
        });
        let handle = NodeHandle::new(HANDLE);
        handle.set_local_transform(crate::types::Transform::from_position(Vec3::new(
            0.0, -0.6, 0.0,
        )));
        handle.set_interaction(InteractionTags {
            hoverable: true,
            clickable: false,
            metadata: Some(HANDLE.to_string()),
        });
        container.root().attach_child(&surface);
        container.root().attach_child(&handle);

        container.add_geometry("panel-surface-mesh");
        container.add_geometry("panel-handle-mesh");
        container.add_material("panel-material");
    }

    fn tick(&mut self, container: &mut Container) {
        let mut transform = container.root().local_transform();
        transform.position = Vec3::new(self.offset.0, self.offset.1, transform.position.z);
        container.root().set_local_transform(transform);
    }

    fn drag_start(&mut self, hit: &Hit) {
        self.drag = Some(PanelDrag {
            target: hit.target.clone(),
            base_offset: self.offset,
            base_scroll: self.scroll,
        });
    }

    fn drag(&mut self, delta: DragDelta) {
        let Some(drag) = &self.drag else {
            return;
        };
        // Route by the sub-object the initiating hit struck, not by whatever
        // the cursor happens to cross mid-drag.
        match drag.target.as_str() {
            HANDLE => {
                self.offset = (
                    drag.base_offset.0 + delta.dx,
                    drag.base_offset.1 + delta.dy,
                );
            }
            SURFACE => {
                self.scroll = (drag.base_scroll - delta.dy).max(0.0);
            }
            other => debug!("drag on unknown panel target {other:?} ignored"),
        }
    }

    fn drag_end(&mut self) {
        self.drag = None;
    }

    fn get_shared_data(&self) -> StateObject {
        let mut state = StateObject::new();
        state.insert("x".to_string(), json!(self.offset.0));
        state.insert("y".to_string(), json!(self.offset.1));
        state.insert("scroll".to_string(), json!(self.scroll));
        state
    }

    fn update_shared_data(&mut self, state: &StateObject) {
        if let Some(x) = state.get("x").and_then(Value::as_f64) {
            self.offset.0 = x as f32;
        }
        if let Some(y) = state.get("y").and_then(Value::as_f64) {
            self.offset.1 = y as f32;
        }
        if let Some(scroll) = state.get("scroll").and_then(Value::as_f64) {
            self.scroll = (scroll as f32).max(0.0);
        }
    }

    fn remove(&mut self) {
        self.removed = true;
    }
}
