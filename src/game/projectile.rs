//! Short-lived projectiles fired by players

use crate::ws::protocol::{BulletState, EntityKind, EntityState};

use super::geometry::{Rect, Vec2};
use super::physics::Body;
use super::snapshot::SendMode;
use super::timers::TimerId;
use super::EntityId;

/// Projectile footprint (square)
pub const PROJECTILE_SIZE: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct Projectile {
    pub body: Body,
    /// Player that fired it; never damaged by it
    pub owner_id: EntityId,
    /// Self-despawn deadline, armed on spawn
    pub expiry: Option<TimerId>,
    /// Position before the latest integration step; the spawn point until
    /// the first one
    previous: Vec2,
}

impl Projectile {
    pub fn new(id: EntityId, owner_id: EntityId, position: Vec2, velocity: Vec2) -> Self {
        let mut body = Body::new(id, position, PROJECTILE_SIZE, PROJECTILE_SIZE);
        body.apply_impulse(velocity.x, velocity.y);
        Self {
            body,
            owner_id,
            expiry: None,
            previous: position,
        }
    }

    pub fn integrate(&mut self, dt: f32) {
        self.previous = self.body.position();
        self.body.integrate(dt);
    }

    /// Toroidal wrap. A wrapped projectile restarts its trail at the new
    /// edge instead of spanning the whole world.
    pub fn wrap(&mut self, half_extent: f32) -> bool {
        let wrapped = self.body.wrap(half_extent);
        if wrapped {
            self.previous = self.body.position();
        }
        wrapped
    }

    /// Segment travelled in the latest integration step, from where the
    /// projectile was to where it is now. Not yet moved (or at rest) this
    /// degenerates to a point.
    pub fn swept_rect(&self) -> Rect {
        Rect::spanning(self.previous, self.body.position())
    }

    /// Projectiles are only described in snapshots; clients extrapolate
    /// their straight-line motion in between.
    pub fn send(&self, mode: SendMode) -> Option<EntityState> {
        if !mode.is_snapshot() {
            return None;
        }
        Some(EntityState::Bullet(BulletState {
            kind: EntityKind::Bullet,
            id: self.body.id,
            owner_id: self.owner_id,
            pos: self.body.position().into(),
            vel: self.body.velocity.into(),
        }))
    }
}
