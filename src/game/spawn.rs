//! Randomness for spawn points and player colors

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::rules::{ARENA_HEIGHT, ARENA_WIDTH, PLAYER_COLORS, PLAYER_HEIGHT, PLAYER_WIDTH};
use super::vector::Vec2;

/// Source of spawn positions and cosmetic colors for a room
pub trait SpawnSource: Send {
    /// Top-left corner of a player box fully inside the arena
    fn spawn_point(&mut self) -> Vec2;

    fn color(&mut self) -> &'static str;
}

/// Seeded source used by live rooms
pub struct SeededSpawns {
    rng: ChaCha8Rng,
}

impl SeededSpawns {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl SpawnSource for SeededSpawns {
    fn spawn_point(&mut self) -> Vec2 {
        Vec2::new(
            self.rng.gen_range(0.0..ARENA_WIDTH - PLAYER_WIDTH),
            self.rng.gen_range(0.0..ARENA_HEIGHT - PLAYER_HEIGHT),
        )
    }

    fn color(&mut self) -> &'static str {
        PLAYER_COLORS[self.rng.gen_range(0..PLAYER_COLORS.len())]
    }
}

/// Replays a fixed list of spawn points, cycling when exhausted
#[cfg(test)]
pub struct FixedSpawns {
    points: Vec<Vec2>,
    next: usize,
}

#[cfg(test)]
impl FixedSpawns {
    pub fn new(points: Vec<Vec2>) -> Self {
        Self { points, next: 0 }
    }
}

#[cfg(test)]
impl SpawnSource for FixedSpawns {
    fn spawn_point(&mut self) -> Vec2 {
        let point = self.points[self.next % self.points.len()];
        self.next += 1;
        point
    }

    fn color(&mut self) -> &'static str {
        PLAYER_COLORS[0]
    }
}
