//! Input-driven player bodies

use std::f32::consts::TAU;

use crate::ws::channel::ClientChannel;
use crate::ws::protocol::{EntityKind, EntityState, InputState, Key, PlayerState};

use super::combat::{WeaponStats, MAX_HEALTH};
use super::geometry::{Rect, Vec2};
use super::physics::Body;
use super::snapshot::{round, OutboundQueue, SendMode};
use super::timers::TimerId;
use super::EntityId;

/// Player movement tuning
#[derive(Debug, Clone, Copy)]
pub struct PlayerStats {
    pub width: f32,
    pub height: f32,
    /// Forward force while `up` is held
    pub thrust: f32,
    /// Forward force while `up` and `sprint` are held
    pub sprint_thrust: f32,
    /// Backward force while `down` is held
    pub reverse_thrust: f32,
    /// Rotational force added per tick while `left`/`right` is held
    pub turn_force: f32,
    /// Velocity multiplier applied every tick
    pub linear_damping: f32,
    /// Rotational velocity multiplier applied every tick
    pub angular_damping: f32,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            width: 25.0,
            height: 60.0,
            thrust: 2.0e6,
            sprint_thrust: 5.0e6,
            reverse_thrust: 2.0e6,
            turn_force: 3.0e4,
            linear_damping: 0.9,
            angular_damping: 0.8,
        }
    }
}

/// Projectile launch parameters produced by a successful shot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug)]
pub struct Player {
    pub body: Body,
    /// Facing in radians, kept in [0, 2π)
    pub rotation: f32,
    pub rotational_velocity: f32,
    rotational_force: f32,
    pub health: i32,
    pub input: InputState,
    /// Cleared on fire, set again when the cooldown timer fires
    pub can_fire: bool,
    pub cooldown: Option<TimerId>,
    pub regen: Option<TimerId>,
    pub name: String,
    /// Token of the connection that owns this player
    pub session: u64,
    pub client: ClientChannel,
    pub outbound: OutboundQueue,
    stats: PlayerStats,
}

impl Player {
    pub fn new(id: EntityId, position: Vec2, client: ClientChannel, stats: PlayerStats) -> Self {
        Self {
            body: Body::new(id, position, stats.width, stats.height),
            rotation: 0.0,
            rotational_velocity: 0.0,
            rotational_force: 0.0,
            health: MAX_HEALTH,
            input: InputState::default(),
            can_fire: true,
            cooldown: None,
            regen: None,
            name: String::new(),
            session: 0,
            client,
            outbound: OutboundQueue::new(),
            stats,
        }
    }

    pub fn set_key(&mut self, key: Key, held: bool) {
        self.input.set(key, held);
    }

    pub fn apply_rotational_force(&mut self, force: f32) {
        self.rotational_force += force;
    }

    /// Linear step plus the same semi-implicit step for the angle.
    pub fn integrate(&mut self, dt: f32) {
        self.body.integrate(dt);

        let torque = self.rotational_force * self.body.responsiveness() * dt;
        self.rotational_velocity += torque;
        if self.rotational_velocity != 0.0 {
            self.rotation = wrap_angle(self.rotation + self.rotational_velocity * dt);
            self.body.invalidate_bounds();
        }
        self.rotational_force = 0.0;
    }

    /// Per-tick behaviour after integration: turn held keys into forces,
    /// fire if allowed, damp, and rebuild the oriented bounds. Returns the
    /// shot to spawn, if any.
    pub fn update(&mut self, weapon: &WeaponStats) -> Option<Shot> {
        let mut thrust = Vec2::ZERO;
        if self.input.up {
            let forward = if self.input.sprint {
                self.stats.sprint_thrust
            } else {
                self.stats.thrust
            };
            thrust.set(0.0, -forward);
        }
        if self.input.down {
            thrust.set(0.0, self.stats.reverse_thrust);
        }
        if self.input.left {
            self.apply_rotational_force(-self.stats.turn_force);
        }
        if self.input.right {
            self.apply_rotational_force(self.stats.turn_force);
        }

        let shot = if self.input.shoot {
            self.try_fire(weapon)
        } else {
            None
        };

        thrust.rotate(self.rotation);
        self.body.apply_force(thrust.x, thrust.y);

        self.body.velocity.scale(self.stats.linear_damping);
        self.rotational_velocity *= self.stats.angular_damping;

        self.body.invalidate_bounds();
        self.bounding_rect();

        shot
    }

    /// Fire from the muzzle if the weapon is armed. The projectile inherits
    /// the player's velocity. Disarms the weapon; the caller owns the
    /// cooldown timer.
    pub fn try_fire(&mut self, weapon: &WeaponStats) -> Option<Shot> {
        if !self.can_fire {
            return None;
        }
        self.can_fire = false;

        let own = self.body.velocity;
        let mut velocity = Vec2::new(0.0, -weapon.muzzle_speed);
        velocity.rotate(self.rotation).add(own.x, own.y);

        let mut muzzle = Vec2::new(0.0, -self.body.height / 2.0);
        muzzle.rotate(self.rotation);
        let mut position = self.body.position();
        position.add(muzzle.x, muzzle.y);

        Some(Shot { position, velocity })
    }

    /// Axis-aligned envelope of the rotated body, cached until invalidated
    pub fn bounding_rect(&mut self) -> Rect {
        let rotation = self.rotation;
        self.body.cached_bounds(|body| oriented_envelope(body, rotation))
    }

    pub fn send(&self, mode: SendMode) -> EntityState {
        let snapshot = mode.is_snapshot();
        EntityState::Player(PlayerState {
            kind: snapshot.then_some(EntityKind::Player),
            id: self.body.id,
            pos: self.body.position().into(),
            vel: self.body.velocity.into(),
            rot: round(self.rotation),
            rot_vel: round(self.rotational_velocity),
            keys: self.input,
            health: self.health,
            name: snapshot.then(|| self.name.clone()),
        })
    }
}

/// Rotate the four body-space corners and take their min/max.
fn oriented_envelope(body: &Body, rotation: f32) -> Rect {
    let (hw, hh) = (body.width / 2.0, body.height / 2.0);
    let corners = [
        Vec2::new(-hw, -hh),
        Vec2::new(hw, -hh),
        Vec2::new(hw, hh),
        Vec2::new(-hw, hh),
    ];

    let mut min = Vec2::new(f32::INFINITY, f32::INFINITY);
    let mut max = Vec2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
    for mut corner in corners {
        corner.rotate(rotation);
        min.set(min.x.min(corner.x), min.y.min(corner.y));
        max.set(max.x.max(corner.x), max.y.max(corner.y));
    }

    let center = body.position();
    Rect::new(center.x + min.x, center.y + min.y, max.x - min.x, max.y - min.y)
}

fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}
