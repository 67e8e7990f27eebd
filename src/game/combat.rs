//! Combat system - bullets, cooldowns, damage

use uuid::Uuid;

use super::physics::PhysicsSystem;
use super::rules::{
    BULLET_ARMING_BOUNCES, BULLET_DAMAGE, BULLET_MAX_BOUNCES, BULLET_RADIUS, PLAYER_SHOOT_COOLDOWN,
};
use super::vector::Vec2;

/// Active bullet in the arena
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub position: Vec2,
    /// Unit direction (zero when fired with no aim)
    pub direction: Vec2,
    pub radius: f32,
    pub bounces: u32,
}

impl Bullet {
    /// Fire a bullet from `origin` toward `target`
    pub fn fire(owner_id: Uuid, origin: Vec2, target: Vec2) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            position: origin,
            direction: target.sub(origin).normalize(),
            radius: BULLET_RADIUS,
            bounces: 0,
        }
    }

    /// Move the bullet one tick, counting a wall bounce if one happened
    pub fn update(&mut self, dt: f32) {
        let step = PhysicsSystem::advance_bullet(self.position, self.direction, self.radius, dt);
        self.position = step.position;
        self.direction = step.direction;
        if step.bounced {
            self.bounces += 1;
        }
    }

    /// Bullets only hurt after ricocheting off a wall
    pub fn is_armed(&self) -> bool {
        self.bounces >= BULLET_ARMING_BOUNCES
    }

    pub fn is_spent(&self) -> bool {
        self.bounces > BULLET_MAX_BOUNCES
    }

    /// Check collision with a player's box
    pub fn overlaps(&self, box_origin: Vec2, width: f32, height: f32) -> bool {
        PhysicsSystem::circle_overlaps_box(self.position, self.radius, box_origin, width, height)
    }
}

/// Combat system for managing cooldowns and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a player can fire (cooldown check)
    pub fn can_fire(cooldown: f32) -> bool {
        cooldown <= 0.0
    }

    /// Tick a cooldown down, never below zero
    pub fn update_cooldown(cooldown: f32, dt: f32) -> f32 {
        (cooldown - dt).max(0.0)
    }

    /// Get cooldown to set after firing
    pub fn fire_cooldown() -> f32 {
        PLAYER_SHOOT_COOLDOWN
    }

    /// Apply bullet damage to health, returns (new_health, is_dead)
    pub fn apply_hit(current_hp: i32) -> (i32, bool) {
        let new_hp = current_hp - BULLET_DAMAGE;
        (new_hp, new_hp <= 0)
    }
}

/// A bullet striking a player during a tick
#[derive(Debug, Clone)]
pub struct HitResult {
    pub bullet_id: Uuid,
    pub shooter_id: Uuid,
    pub target_id: Uuid,
    pub target_killed: bool,
}
