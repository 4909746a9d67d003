//! Combat rules - weapon tuning, damage, hit detection

use super::geometry::Rect;
use super::EntityId;

/// Maximum (and starting) player health
pub const MAX_HEALTH: i32 = 100;

/// Weapon tuning shared by every player
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: i32,
    /// Projectile speed relative to the shooter, px/s
    pub muzzle_speed: f32,
}

impl Default for WeaponStats {
    fn default() -> Self {
        Self {
            damage: 20,
            muzzle_speed: 1000.0,
        }
    }
}

/// Combat system for hit tests and damage
pub struct CombatSystem;

impl CombatSystem {
    /// A projectile hits a target unless it belongs to the target.
    pub fn is_hit(
        target_id: EntityId,
        target_bounds: &Rect,
        owner_id: EntityId,
        swept: &Rect,
    ) -> bool {
        owner_id != target_id && target_bounds.intersects(swept)
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: i32, damage: i32) -> (i32, bool) {
        let new_health = (current_health - damage).max(0);
        (new_health, new_health <= 0)
    }

    /// One regeneration step, capped at [`MAX_HEALTH`]
    pub fn regenerate(current_health: i32) -> i32 {
        (current_health + 1).min(MAX_HEALTH)
    }
}
