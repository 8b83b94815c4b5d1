//! # Common Types
//!
//! Math and color types shared across the crate. Vector and quaternion math
//! is backed by `glam`; the composite types mirror what the rendering side
//! hands us for scene nodes.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// World vertical, used to stabilize interaction planes against camera roll.
pub const WORLD_UP: Vec3 = Vec3::Y;

/// Position, rotation and scale of a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Compose a child transform under this one (this acting as the parent).
    pub fn mul_transform(&self, child: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale * child.position),
            rotation: self.rotation * child.rotation,
            scale: self.scale * child.scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// RGBA color, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }
}

/// A world-space ray, as reported by a hand controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Build a ray, normalizing the direction. A zero direction is kept as-is
    /// and will simply never hit anything.
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        let dir = if dir.length_squared() > 1e-12 {
            dir.normalize()
        } else {
            dir
        };
        Self { origin, dir }
    }
}
