//! 2D vector math used by the arena simulation

use serde::{Deserialize, Serialize};

/// Immutable 2D vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(self, scalar: f32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }

    pub fn magnitude(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector in the same direction. The zero vector normalizes to zero,
    /// as does anything non-finite.
    pub fn normalize(self) -> Vec2 {
        // Pre-scale so squaring cannot overflow for large components
        let largest = self.x.abs().max(self.y.abs());
        if !(largest > 0.0 && largest.is_finite()) {
            return Vec2::ZERO;
        }
        let scaled = self.scale(1.0 / largest);
        scaled.scale(1.0 / scaled.magnitude())
    }

    /// Shorten to at most `max` length, keeping direction
    pub fn clamp_length(self, max: f32) -> Vec2 {
        if self.magnitude() > max {
            self.normalize().scale(max)
        } else {
            self
        }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}
