/*
 * Camera Module
 *
 * Perspective projection from the cube onto the window. The eye follows the
 * viewer pose published by the primary, pulled back by a dolly distance.
 * Zoom scales the image and dragging pans it, like a 2D camera layered over
 * the 3D view.
 */

use glam::{Vec2, Vec3};

use crate::boid::Pose;

// Points closer to the eye than this are not drawn
pub const NEAR_PLANE: f32 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projected {
    // Window coordinates, origin at the window center
    pub screen: Vec2,
    pub depth: f32,
    // Pixels per world unit at this depth
    pub scale: f32,
}

pub struct Camera {
    pub offset: Vec2,
    pub zoom: f32,
    pub dolly: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub is_dragging: bool,
    pub last_cursor_pos: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            dolly: 30.0,
            min_zoom: 0.1,
            max_zoom: 5.0,
            is_dragging: false,
            last_cursor_pos: Vec2::ZERO,
        }
    }

    pub fn eye(&self, viewer: &Pose) -> Vec3 {
        viewer.position - viewer.forward() * self.dolly
    }

    pub fn project(&self, viewer: &Pose, point: Vec3, focal: f32) -> Option<Projected> {
        let local = viewer.orientation.inverse() * (point - self.eye(viewer));
        let depth = -local.z;
        if !(depth > NEAR_PLANE) {
            return None;
        }
        let scale = focal * self.zoom / depth;
        Some(Projected {
            screen: Vec2::new(local.x, local.y) * scale + self.offset,
            depth,
            scale,
        })
    }

    // Mouse wheel zoom around the window center
    pub fn zoom(&mut self, scroll: f32) {
        let factor = 1.0 + scroll * 0.1;
        let before = self.zoom;
        self.zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        self.offset *= self.zoom / before;
    }

    pub fn start_drag(&mut self, position: Vec2) {
        self.last_cursor_pos = position;
        self.is_dragging = true;
    }

    pub fn drag(&mut self, position: Vec2) {
        if self.is_dragging {
            let delta = position - self.last_cursor_pos;
            if delta.length_squared() > 0.0 {
                self.offset += delta;
                self.last_cursor_pos = position;
            }
        }
    }

    pub fn end_drag(&mut self) {
        self.is_dragging = false;
    }

    pub fn reset(&mut self) {
        *self = Self {
            dolly: self.dolly,
            ..Self::new()
        };
    }
}
