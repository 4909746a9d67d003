//! Closed set of entity kinds sharing the physics body interface

use crate::ws::protocol::EntityState;

use super::combat::WeaponStats;
use super::geometry::Rect;
use super::physics::Body;
use super::player::{Player, Shot};
use super::projectile::Projectile;
use super::snapshot::SendMode;
use super::timers::TimerId;
use super::EntityId;

#[derive(Debug)]
pub enum Entity {
    Player(Box<Player>),
    Projectile(Projectile),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        self.body().id
    }

    pub fn body(&self) -> &Body {
        match self {
            Entity::Player(p) => &p.body,
            Entity::Projectile(p) => &p.body,
        }
    }

    pub fn body_mut(&mut self) -> &mut Body {
        match self {
            Entity::Player(p) => &mut p.body,
            Entity::Projectile(p) => &mut p.body,
        }
    }

    pub fn as_player(&self) -> Option<&Player> {
        match self {
            Entity::Player(p) => Some(&**p),
            Entity::Projectile(_) => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut Player> {
        match self {
            Entity::Player(p) => Some(&mut **p),
            Entity::Projectile(_) => None,
        }
    }

    pub fn as_projectile(&self) -> Option<&Projectile> {
        match self {
            Entity::Projectile(p) => Some(p),
            Entity::Player(_) => None,
        }
    }

    pub fn integrate(&mut self, dt: f32) {
        match self {
            Entity::Player(p) => p.integrate(dt),
            Entity::Projectile(p) => p.integrate(dt),
        }
    }

    /// Toroidal wrap at `half_extent`; returns whether the entity moved.
    pub fn wrap(&mut self, half_extent: f32) -> bool {
        match self {
            Entity::Player(p) => p.body.wrap(half_extent),
            Entity::Projectile(p) => p.wrap(half_extent),
        }
    }

    /// Kind-specific behaviour after integration. Projectiles are inert.
    pub fn update(&mut self, weapon: &WeaponStats) -> Option<Shot> {
        match self {
            Entity::Player(p) => p.update(weapon),
            Entity::Projectile(_) => None,
        }
    }

    pub fn bounding_rect(&mut self) -> Rect {
        match self {
            Entity::Player(p) => p.bounding_rect(),
            Entity::Projectile(p) => p.body.bounding_rect(),
        }
    }

    pub fn send(&self, mode: SendMode) -> Option<EntityState> {
        match self {
            Entity::Player(p) => Some(p.send(mode)),
            Entity::Projectile(p) => p.send(mode),
        }
    }

    /// Timers that must be cancelled when this entity goes away
    pub fn owned_timers(&self) -> Vec<TimerId> {
        match self {
            Entity::Player(p) => p.cooldown.into_iter().chain(p.regen).collect(),
            Entity::Projectile(p) => p.expiry.into_iter().collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Player(_) => "player",
            Entity::Projectile(_) => "projectile",
        }
    }
}

impl From<Player> for Entity {
    fn from(player: Player) -> Self {
        Entity::Player(Box::new(player))
    }
}

impl From<Projectile> for Entity {
    fn from(projectile: Projectile) -> Self {
        Entity::Projectile(projectile)
    }
}
