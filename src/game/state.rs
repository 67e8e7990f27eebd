//! Authoritative room state and the match state machine
//!
//! Everything here is synchronous and owned by a single room task; the actor
//! in `room.rs` feeds commands and ticks into it one at a time.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::combat::{Bullet, CombatSystem, HitResult};
use super::physics::PhysicsSystem;
use super::rules::{PLAYER_HEIGHT, PLAYER_MAX_HP, PLAYER_WIDTH};
use super::spawn::SpawnSource;
use super::vector::Vec2;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Waiting for every player to ready up
    Waiting,
    /// Match in progress
    InProgress,
    /// A player died; waiting for ready or restart
    GameOver,
}

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: Uuid,
    /// Top-left corner of the player box
    pub position: Vec2,
    pub width: f32,
    pub height: f32,
    pub velocity: Vec2,
    /// Latest movement input, overwritten by each command
    pub input: Vec2,
    pub color: &'static str,
    pub hp: i32,
    pub max_hp: i32,
    pub shoot_cooldown: f32,
}

impl PlayerState {
    pub fn new(id: Uuid, position: Vec2, color: &'static str) -> Self {
        Self {
            id,
            position,
            width: PLAYER_WIDTH,
            height: PLAYER_HEIGHT,
            velocity: Vec2::ZERO,
            input: Vec2::ZERO,
            color,
            hp: PLAYER_MAX_HP,
            max_hp: PLAYER_MAX_HP,
            shoot_cooldown: 0.0,
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            self.position.x + self.width / 2.0,
            self.position.y + self.height / 2.0,
        )
    }

    /// Restore spawn defaults at a new position
    fn respawn(&mut self, position: Vec2) {
        self.position = position;
        self.velocity = Vec2::ZERO;
        self.input = Vec2::ZERO;
        self.hp = self.max_hp;
        self.shoot_cooldown = 0.0;
    }
}

/// Room state (owned by the room task)
pub struct RoomState {
    pub id: Uuid,
    pub phase: MatchPhase,
    pub winner_id: Option<Uuid>,
    pub players: HashMap<Uuid, PlayerState>,
    pub bullets: HashMap<Uuid, Bullet>,
    pub ready: HashSet<Uuid>,
    spawns: Box<dyn SpawnSource>,
}

impl RoomState {
    pub fn new(id: Uuid, spawns: Box<dyn SpawnSource>) -> Self {
        Self {
            id,
            phase: MatchPhase::Waiting,
            winner_id: None,
            players: HashMap::new(),
            bullets: HashMap::new(),
            ready: HashSet::new(),
            spawns,
        }
    }

    /// Create a player at a random spawn point with full HP
    pub fn add_player(&mut self, id: Uuid) -> &PlayerState {
        let position = self.spawns.spawn_point();
        let color = self.spawns.color();
        self.players
            .entry(id)
            .or_insert_with(|| PlayerState::new(id, position, color))
    }

    /// Remove a player. A departure that leaves fewer than two players in a
    /// running or finished match resets the room to `Waiting`.
    /// Returns false if the player was unknown.
    pub fn remove_player(&mut self, id: Uuid) -> bool {
        if self.players.remove(&id).is_none() {
            return false;
        }
        self.ready.remove(&id);

        let match_active = matches!(self.phase, MatchPhase::InProgress | MatchPhase::GameOver);
        if match_active && self.players.len() < 2 {
            info!(room_id = %self.id, "Player left mid-game, resetting room to waiting");
            self.reset_game();
        }
        true
    }

    /// Overwrite a player's pending input. Ignored unless the match is running.
    pub fn set_input(&mut self, id: Uuid, input: Vec2) {
        if self.phase != MatchPhase::InProgress {
            return;
        }
        if let Some(player) = self.players.get_mut(&id) {
            player.input = input.clamp_length(1.0);
        }
    }

    /// Fire from the player's center toward `target` if the cooldown allows.
    /// Returns the new bullet id.
    pub fn shoot(&mut self, id: Uuid, target: Vec2) -> Option<Uuid> {
        if self.phase != MatchPhase::InProgress {
            return None;
        }
        let player = self.players.get_mut(&id)?;
        if !CombatSystem::can_fire(player.shoot_cooldown) {
            return None;
        }

        let bullet = Bullet::fire(player.id, player.center(), target);
        let bullet_id = bullet.id;
        player.shoot_cooldown = CombatSystem::fire_cooldown();
        self.bullets.insert(bullet_id, bullet);

        debug!(room_id = %self.id, player_id = %id, bullet_id = %bullet_id, "Player shot");
        Some(bullet_id)
    }

    /// Mark a player ready. Starts the match once every player (two or more)
    /// is ready. Returns true if the match started.
    pub fn mark_ready(&mut self, id: Uuid) -> bool {
        if !matches!(self.phase, MatchPhase::Waiting | MatchPhase::GameOver) {
            return false;
        }
        if !self.players.contains_key(&id) {
            return false;
        }

        self.ready.insert(id);
        info!(room_id = %self.id, player_id = %id, "Player is ready");

        if self.all_ready() {
            info!(room_id = %self.id, "All players ready, starting match");
            self.start_game();
            return true;
        }
        false
    }

    /// Vote to restart after a finished match. Once every player has voted
    /// the room goes back to a fresh `Waiting` state.
    /// Returns true if the room was reset.
    pub fn mark_restart(&mut self, id: Uuid) -> bool {
        if self.phase != MatchPhase::GameOver || !self.players.contains_key(&id) {
            return false;
        }

        self.ready.insert(id);
        info!(room_id = %self.id, player_id = %id, "Player wants to restart");

        if !self.players.is_empty() && self.ready.len() == self.players.len() {
            info!(room_id = %self.id, "All players agreed to restart, resetting room");
            self.reset_game();
            return true;
        }
        false
    }

    fn all_ready(&self) -> bool {
        self.players.len() >= 2 && self.ready.len() == self.players.len()
    }

    /// Enter `InProgress` with fresh players and no bullets
    pub fn start_game(&mut self) {
        self.phase = MatchPhase::InProgress;
        self.winner_id = None;
        self.bullets.clear();
        for player in self.players.values_mut() {
            player.respawn(self.spawns.spawn_point());
        }
    }

    /// Back to a fresh `Waiting` state
    pub fn reset_game(&mut self) {
        self.phase = MatchPhase::Waiting;
        self.winner_id = None;
        self.ready.clear();
        self.bullets.clear();
        for player in self.players.values_mut() {
            player.respawn(self.spawns.spawn_point());
        }
    }

    /// Advance the simulation by one tick. Does nothing unless in progress.
    /// Returns the hits that dealt damage this tick.
    pub fn step(&mut self, dt: f32) -> Vec<HitResult> {
        if self.phase != MatchPhase::InProgress {
            return Vec::new();
        }

        self.update_players(dt);
        let hits = self.update_bullets(dt);
        self.check_deaths(&hits);
        hits
    }

    fn update_players(&mut self, dt: f32) {
        for player in self.players.values_mut() {
            let velocity = PhysicsSystem::integrate_velocity(player.velocity, player.input, dt);
            let moved = player.position.add(velocity.scale(dt));
            let (position, velocity) =
                PhysicsSystem::confine_box(moved, velocity, player.width, player.height);

            player.position = position;
            player.velocity = velocity;
            player.shoot_cooldown = CombatSystem::update_cooldown(player.shoot_cooldown, dt);
        }
    }

    fn update_bullets(&mut self, dt: f32) -> Vec<HitResult> {
        let mut hits = Vec::new();

        for bullet in self.bullets.values_mut() {
            bullet.update(dt);

            // First overlapping player ends the check for this bullet
            let struck = self
                .players
                .values()
                .find(|p| bullet.overlaps(p.position, p.width, p.height));

            if let Some(player) = struck {
                if bullet.is_armed() {
                    hits.push(HitResult {
                        bullet_id: bullet.id,
                        shooter_id: bullet.owner_id,
                        target_id: player.id,
                        target_killed: false,
                    });
                }
            }
        }

        for hit in hits.iter_mut() {
            self.bullets.remove(&hit.bullet_id);
            if let Some(target) = self.players.get_mut(&hit.target_id) {
                let (hp, killed) = CombatSystem::apply_hit(target.hp);
                target.hp = hp;
                hit.target_killed = killed;
                debug!(
                    room_id = %self.id,
                    bullet_id = %hit.bullet_id,
                    target_id = %hit.target_id,
                    hp,
                    "Bullet hit player"
                );
            }
        }

        self.bullets.retain(|_, b| !b.is_spent());
        hits
    }

    fn check_deaths(&mut self, hits: &[HitResult]) {
        let Some(loser) = hits.iter().find(|h| h.target_killed).map(|h| h.target_id) else {
            return;
        };

        self.phase = MatchPhase::GameOver;
        self.ready.clear();
        self.winner_id = self
            .players
            .values()
            .filter(|p| p.id != loser)
            .max_by_key(|p| p.hp > 0)
            .map(|p| p.id);

        info!(
            room_id = %self.id,
            loser_id = %loser,
            winner_id = ?self.winner_id,
            "Player died, match over"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rules::{ARENA_WIDTH, BULLET_DAMAGE, BULLET_MAX_BOUNCES, PLAYER_MAX_VELOCITY};
    use assert_approx_eq::assert_approx_eq;
    use crate::game::spawn::FixedSpawns;

    const DT: f32 = 1.0 / 60.0;

    fn room_with(points: Vec<Vec2>) -> RoomState {
        RoomState::new(Uuid::new_v4(), Box::new(FixedSpawns::new(points)))
    }

    /// Two players at fixed spots, match already running
    fn running_duel() -> (RoomState, Uuid, Uuid) {
        let mut room = room_with(vec![Vec2::new(100.0, 300.0), Vec2::new(600.0, 300.0)]);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        room.add_player(a);
        room.add_player(b);
        room.mark_ready(a);
        room.mark_ready(b);
        assert_eq!(room.phase, MatchPhase::InProgress);
        room.players.get_mut(&a).unwrap().position = Vec2::new(100.0, 300.0);
        room.players.get_mut(&b).unwrap().position = Vec2::new(600.0, 300.0);
        (room, a, b)
    }

    fn armed_bullet_at(owner: Uuid, position: Vec2, direction: Vec2) -> Bullet {
        Bullet {
            id: Uuid::new_v4(),
            owner_id: owner,
            position,
            direction,
            radius: 5.0,
            bounces: 1,
        }
    }

    #[test]
    fn test_new_room_is_waiting() {
        let room = room_with(vec![Vec2::ZERO]);
        assert_eq!(room.phase, MatchPhase::Waiting);
        assert!(room.winner_id.is_none());
        assert!(room.players.is_empty());
    }

    #[test]
    fn test_add_player_defaults() {
        let mut room = room_with(vec![Vec2::new(10.0, 20.0)]);
        let id = Uuid::new_v4();
        let player = room.add_player(id);
        assert_eq!(player.position, Vec2::new(10.0, 20.0));
        assert_eq!(player.hp, PLAYER_MAX_HP);
        assert_eq!(player.max_hp, 10);
        assert_eq!(player.shoot_cooldown, 0.0);
    }

    #[test]
    fn test_single_player_ready_does_not_start() {
        let mut room = room_with(vec![Vec2::ZERO]);
        let a = Uuid::new_v4();
        room.add_player(a);
        assert!(!room.mark_ready(a));
        assert_eq!(room.phase, MatchPhase::Waiting);
    }

    #[test]
    fn test_start_requires_every_player_ready() {
        let mut room = room_with(vec![Vec2::ZERO]);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        room.add_player(a);
        room.add_player(b);

        assert!(!room.mark_ready(a));
        assert!(!room.mark_ready(a));
        assert_eq!(room.phase, MatchPhase::Waiting);

        assert!(room.mark_ready(b));
        assert_eq!(room.phase, MatchPhase::InProgress);
        assert!(room.bullets.is_empty());
        assert!(room.players.values().all(|p| p.hp == 10));
    }

    #[test]
    fn test_unknown_player_ready_is_ignored() {
        let mut room = room_with(vec![Vec2::ZERO]);
        room.add_player(Uuid::new_v4());
        assert!(!room.mark_ready(Uuid::new_v4()));
        assert!(room.ready.is_empty());
    }

    #[test]
    fn test_input_ignored_while_waiting() {
        let mut room = room_with(vec![Vec2::ZERO]);
        let a = Uuid::new_v4();
        room.add_player(a);
        room.set_input(a, Vec2::new(1.0, 0.0));
        assert_eq!(room.players[&a].input, Vec2::ZERO);
    }

    #[test]
    fn test_input_latest_wins() {
        let (mut room, a, _) = running_duel();
        room.set_input(a, Vec2::new(1.0, 0.0));
        room.set_input(a, Vec2::new(0.0, -1.0));
        assert_eq!(room.players[&a].input, Vec2::new(0.0, -1.0));

        room.step(DT);
        assert!(room.players[&a].velocity.y < 0.0);
        assert_eq!(room.players[&a].velocity.x, 0.0);
    }

    #[test]
    fn test_oversized_input_is_clamped() {
        let (mut room, a, _) = running_duel();
        room.set_input(a, Vec2::new(3.0e38, 3.0e38));
        assert_approx_eq!(room.players[&a].input.magnitude(), 1.0, 1e-6);

        for _ in 0..30 {
            room.step(DT);
        }
        let player = &room.players[&a];
        assert!(player.position.x.is_finite() && player.position.y.is_finite());
        assert!(player.velocity.magnitude() <= PLAYER_MAX_VELOCITY + 1e-3);
    }

    #[test]
    fn test_shoot_respects_cooldown() {
        let (mut room, a, _) = running_duel();
        assert!(room.shoot(a, Vec2::new(1000.0, 325.0)).is_some());
        assert_eq!(room.players[&a].shoot_cooldown, 2.0);
        assert!(room.shoot(a, Vec2::new(1000.0, 325.0)).is_none());
        assert_eq!(room.bullets.len(), 1);

        for _ in 0..121 {
            room.step(DT);
        }
        assert_eq!(room.players[&a].shoot_cooldown, 0.0);
        assert!(room.shoot(a, Vec2::new(1000.0, 325.0)).is_some());
    }

    #[test]
    fn test_shoot_spawns_from_center() {
        let (mut room, a, _) = running_duel();
        let bullet_id = room.shoot(a, Vec2::new(125.0, 0.0)).unwrap();
        let bullet = &room.bullets[&bullet_id];
        assert_eq!(bullet.position, Vec2::new(125.0, 325.0));
        assert_eq!(bullet.direction, Vec2::new(0.0, -1.0));
        assert_eq!(bullet.owner_id, a);
    }

    #[test]
    fn test_shoot_zero_aim_does_not_fail() {
        let (mut room, a, _) = running_duel();
        let bullet_id = room.shoot(a, Vec2::new(125.0, 325.0)).unwrap();
        assert_eq!(room.bullets[&bullet_id].direction, Vec2::ZERO);
    }

    #[test]
    fn test_shoot_ignored_while_waiting() {
        let mut room = room_with(vec![Vec2::ZERO]);
        let a = Uuid::new_v4();
        room.add_player(a);
        assert!(room.shoot(a, Vec2::new(10.0, 10.0)).is_none());
        assert!(room.bullets.is_empty());
    }

    #[test]
    fn test_unbounced_bullet_passes_through() {
        let (mut room, a, b) = running_duel();
        room.shoot(a, Vec2::new(625.0, 325.0)).unwrap();

        // Travel until the bullet is inside B's box
        let mut overlapped = false;
        for _ in 0..40 {
            room.step(DT);
            let bullet = room.bullets.values().next().expect("bullet removed early");
            let target = &room.players[&b];
            if bullet.overlaps(target.position, target.width, target.height) {
                overlapped = true;
                break;
            }
        }

        assert!(overlapped);
        assert_eq!(room.players[&b].hp, 10);
        assert_eq!(room.bullets.len(), 1);
        assert_eq!(room.bullets.values().next().unwrap().bounces, 0);
    }

    #[test]
    fn test_armed_bullet_damages_and_is_removed() {
        let (mut room, a, b) = running_duel();
        let bullet = armed_bullet_at(a, Vec2::new(590.0, 325.0), Vec2::new(1.0, 0.0));
        room.bullets.insert(bullet.id, bullet);

        let hits = room.step(DT);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target_id, b);
        assert_eq!(room.players[&b].hp, 10 - BULLET_DAMAGE);
        assert!(room.bullets.is_empty());
        assert_eq!(room.phase, MatchPhase::InProgress);
    }

    #[test]
    fn test_bullet_expires_after_max_bounces() {
        let (mut room, a, _) = running_duel();
        // Vertical lane far from both players
        let mut bullet = armed_bullet_at(a, Vec2::new(1000.0, 300.0), Vec2::new(0.0, 1.0));
        bullet.bounces = 0;
        let id = bullet.id;
        room.bullets.insert(id, bullet);

        let mut last_bounces = 0;
        for _ in 0..600 {
            room.step(DT);
            match room.bullets.get(&id) {
                Some(b) => {
                    assert!(b.bounces >= last_bounces);
                    assert!(b.bounces <= BULLET_MAX_BOUNCES);
                    last_bounces = b.bounces;
                }
                None => break,
            }
        }

        assert!(!room.bullets.contains_key(&id));
        assert_eq!(last_bounces, BULLET_MAX_BOUNCES);
    }

    #[test]
    fn test_death_ends_match_with_winner() {
        let (mut room, a, b) = running_duel();
        room.players.get_mut(&b).unwrap().hp = 2;
        let bullet = armed_bullet_at(a, Vec2::new(590.0, 325.0), Vec2::new(1.0, 0.0));
        room.bullets.insert(bullet.id, bullet);

        room.step(DT);
        assert_eq!(room.players[&b].hp, 0);
        assert_eq!(room.phase, MatchPhase::GameOver);
        assert_eq!(room.winner_id, Some(a));
        assert!(room.ready.is_empty());

        // No simulation after the match ends
        room.set_input(a, Vec2::new(1.0, 0.0));
        let before = room.players[&a].position;
        room.step(DT);
        assert_eq!(room.players[&a].position, before);
    }

    #[test]
    fn test_restart_after_game_over_resets_to_waiting() {
        let (mut room, a, b) = running_duel();
        room.players.get_mut(&b).unwrap().hp = 1;
        let bullet = armed_bullet_at(a, Vec2::new(590.0, 325.0), Vec2::new(1.0, 0.0));
        room.bullets.insert(bullet.id, bullet);
        room.step(DT);
        assert_eq!(room.phase, MatchPhase::GameOver);

        assert!(!room.mark_restart(a));
        assert_eq!(room.phase, MatchPhase::GameOver);
        assert!(room.mark_restart(b));

        assert_eq!(room.phase, MatchPhase::Waiting);
        assert!(room.winner_id.is_none());
        assert!(room.ready.is_empty());
        assert!(room.bullets.is_empty());
        assert!(room.players.values().all(|p| p.hp == p.max_hp));
    }

    #[test]
    fn test_restart_ignored_outside_game_over() {
        let (mut room, a, _) = running_duel();
        assert!(!room.mark_restart(a));
        assert_eq!(room.phase, MatchPhase::InProgress);
    }

    #[test]
    fn test_ready_after_game_over_starts_new_match() {
        let (mut room, a, b) = running_duel();
        room.phase = MatchPhase::GameOver;
        room.ready.clear();
        room.players.get_mut(&b).unwrap().hp = 0;

        room.mark_ready(a);
        assert!(room.mark_ready(b));
        assert_eq!(room.phase, MatchPhase::InProgress);
        assert_eq!(room.players[&b].hp, 10);
    }

    #[test]
    fn test_leave_mid_match_resets_room() {
        let (mut room, a, b) = running_duel();
        room.shoot(a, Vec2::new(0.0, 0.0));
        room.players.get_mut(&a).unwrap().hp = 4;

        assert!(room.remove_player(b));
        assert_eq!(room.phase, MatchPhase::Waiting);
        assert!(room.bullets.is_empty());
        assert!(room.ready.is_empty());
        assert_eq!(room.players[&a].hp, 10);
        assert!(!room.remove_player(b));
    }

    #[test]
    fn test_leave_while_waiting_keeps_ready_of_others() {
        let mut room = room_with(vec![Vec2::ZERO]);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        room.add_player(a);
        room.add_player(b);
        room.mark_ready(a);
        room.remove_player(b);
        assert_eq!(room.phase, MatchPhase::Waiting);
        assert!(room.ready.contains(&a));
    }

    #[test]
    fn test_player_stays_inside_arena() {
        let (mut room, a, _) = running_duel();
        room.set_input(a, Vec2::new(1.0, 0.0));
        for _ in 0..600 {
            room.step(DT);
        }
        let player = &room.players[&a];
        assert_eq!(player.position.x, ARENA_WIDTH - player.width);
        assert_eq!(player.velocity.x, 0.0);
    }
}
