//! Player movement, bullet travel and arena collision

use super::rules::{
    ARENA_HEIGHT, ARENA_WIDTH, BULLET_SPEED, PLAYER_ACCELERATION, PLAYER_FRICTION,
    PLAYER_MAX_VELOCITY, VELOCITY_SNAP,
};
use super::vector::Vec2;

/// Result of moving a bullet for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletStep {
    pub position: Vec2,
    pub direction: Vec2,
    /// Whether any arena edge was hit this tick
    pub bounced: bool,
}

/// Physics system for player and bullet motion
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Apply input acceleration or friction to a velocity.
    ///
    /// With input held the velocity gains `input * acceleration * dt` and is
    /// clamped to the max speed without changing direction. With no input it
    /// decays by the friction factor scaled to the tick length, and each
    /// component under the snap threshold becomes exactly zero.
    pub fn integrate_velocity(velocity: Vec2, input: Vec2, dt: f32) -> Vec2 {
        if !input.is_zero() {
            let accelerated = velocity.add(input.scale(PLAYER_ACCELERATION * dt));
            let speed = accelerated.magnitude();
            if speed > PLAYER_MAX_VELOCITY {
                accelerated.scale(PLAYER_MAX_VELOCITY / speed)
            } else {
                accelerated
            }
        } else {
            let decay = 1.0 - (1.0 - PLAYER_FRICTION) * dt * 60.0;
            let mut decayed = velocity.scale(decay);
            if decayed.x.abs() < VELOCITY_SNAP {
                decayed.x = 0.0;
            }
            if decayed.y.abs() < VELOCITY_SNAP {
                decayed.y = 0.0;
            }
            decayed
        }
    }

    /// Keep a box of the given size inside the arena.
    /// Returns (position, velocity) with the clamped velocity components zeroed.
    pub fn confine_box(position: Vec2, velocity: Vec2, width: f32, height: f32) -> (Vec2, Vec2) {
        let mut pos = position;
        let mut vel = velocity;

        if pos.x < 0.0 {
            pos.x = 0.0;
            vel.x = 0.0;
        }
        if pos.y < 0.0 {
            pos.y = 0.0;
            vel.y = 0.0;
        }
        if pos.x + width > ARENA_WIDTH {
            pos.x = ARENA_WIDTH - width;
            vel.x = 0.0;
        }
        if pos.y + height > ARENA_HEIGHT {
            pos.y = ARENA_HEIGHT - height;
            vel.y = 0.0;
        }

        (pos, vel)
    }

    /// Move a bullet along its direction, reflecting off arena edges.
    /// Hitting one or both axes in the same tick counts as a single bounce.
    pub fn advance_bullet(position: Vec2, direction: Vec2, radius: f32, dt: f32) -> BulletStep {
        let mut pos = position.add(direction.scale(BULLET_SPEED * dt));
        let mut dir = direction;
        let mut bounced = false;

        if pos.x - radius < 0.0 {
            pos.x = radius;
            dir.x = -dir.x;
            bounced = true;
        } else if pos.x + radius > ARENA_WIDTH {
            pos.x = ARENA_WIDTH - radius;
            dir.x = -dir.x;
            bounced = true;
        }

        if pos.y - radius < 0.0 {
            pos.y = radius;
            dir.y = -dir.y;
            bounced = true;
        } else if pos.y + radius > ARENA_HEIGHT {
            pos.y = ARENA_HEIGHT - radius;
            dir.y = -dir.y;
            bounced = true;
        }

        BulletStep {
            position: pos,
            direction: dir,
            bounced,
        }
    }

    /// Squared distance from a point to the nearest point of an axis-aligned box
    pub fn distance_sq_to_box(point: Vec2, box_origin: Vec2, width: f32, height: f32) -> f32 {
        let closest_x = point.x.min(box_origin.x + width).max(box_origin.x);
        let closest_y = point.y.min(box_origin.y + height).max(box_origin.y);
        let dx = point.x - closest_x;
        let dy = point.y - closest_y;
        dx * dx + dy * dy
    }

    /// Check overlap between a circle and an axis-aligned box
    pub fn circle_overlaps_box(
        center: Vec2,
        radius: f32,
        box_origin: Vec2,
        width: f32,
        height: f32,
    ) -> bool {
        Self::distance_sq_to_box(center, box_origin, width, height) < radius * radius
    }
}
