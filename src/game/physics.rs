//! Rigid body integration shared by every entity kind

use super::geometry::{Rect, Vec2};
use super::EntityId;

/// Physics state common to players and projectiles
#[derive(Debug, Clone)]
pub struct Body {
    pub id: EntityId,
    pub width: f32,
    pub height: f32,
    /// Derived from the footprint, always > 0
    mass: f32,
    /// 1 / mass
    responsiveness: f32,
    position: Vec2,
    pub velocity: Vec2,
    /// Forces accumulated since the last integration step
    force: Vec2,
    bounds: Rect,
    bounds_dirty: bool,
}

impl Body {
    /// Create a body at rest. Panics on a non-positive footprint.
    pub fn new(id: EntityId, position: Vec2, width: f32, height: f32) -> Self {
        assert!(
            width > 0.0 && height > 0.0,
            "entity footprint must be positive, got {width}x{height}"
        );
        let mass = width * height;
        Self {
            id,
            width,
            height,
            mass,
            responsiveness: 1.0 / mass,
            position,
            velocity: Vec2::ZERO,
            force: Vec2::ZERO,
            bounds: Rect::default(),
            bounds_dirty: true,
        }
    }

    #[cfg(test)]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn responsiveness(&self) -> f32 {
        self.responsiveness
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.bounds_dirty = true;
    }

    #[cfg(test)]
    pub fn force(&self) -> Vec2 {
        self.force
    }

    /// Accumulate a force; takes effect on the next `integrate`.
    pub fn apply_force(&mut self, dx: f32, dy: f32) {
        self.force.add(dx, dy);
    }

    /// Change velocity directly, ignoring mass.
    pub fn apply_impulse(&mut self, dx: f32, dy: f32) {
        self.velocity.add(dx, dy);
    }

    /// Semi-implicit Euler step: force updates velocity, then the new
    /// velocity moves the position. Clears the force accumulator.
    pub fn integrate(&mut self, dt: f32) {
        let mut dv = self.force;
        dv.scale(self.responsiveness * dt);
        self.velocity.add(dv.x, dv.y);

        if self.velocity != Vec2::ZERO && dt != 0.0 {
            self.position.add(self.velocity.x * dt, self.velocity.y * dt);
            self.bounds_dirty = true;
        }

        self.force = Vec2::ZERO;
        debug_assert!(self.position.is_finite(), "body {} left finite space", self.id);
    }

    /// Toroidal wraparound: a coordinate beyond `half_extent` jumps to the
    /// opposite edge. Returns whether the body moved.
    pub fn wrap(&mut self, half_extent: f32) -> bool {
        let mut p = self.position;
        let mut wrapped = false;

        if p.x > half_extent {
            p.x = -half_extent;
            wrapped = true;
        } else if p.x < -half_extent {
            p.x = half_extent;
            wrapped = true;
        }

        if p.y > half_extent {
            p.y = -half_extent;
            wrapped = true;
        } else if p.y < -half_extent {
            p.y = half_extent;
            wrapped = true;
        }

        if wrapped {
            self.set_position(p);
        }
        wrapped
    }

    /// Force the bounding rect to be rebuilt on next access.
    pub fn invalidate_bounds(&mut self) {
        self.bounds_dirty = true;
    }

    #[cfg(test)]
    pub fn bounds_dirty(&self) -> bool {
        self.bounds_dirty
    }

    /// Return the cached bounds, rebuilding them with `build` if dirty.
    pub fn cached_bounds(&mut self, build: impl FnOnce(&Body) -> Rect) -> Rect {
        if self.bounds_dirty {
            self.bounds = build(self);
            self.bounds_dirty = false;
        }
        self.bounds
    }

    /// Axis-aligned footprint centred on the position
    pub fn bounding_rect(&mut self) -> Rect {
        self.cached_bounds(Body::footprint)
    }

    pub fn footprint(&self) -> Rect {
        Rect::centered(self.position, self.width, self.height)
    }
}
