//! Snapshot building for network transmission

use crate::ws::protocol::{BulletView, GameStateView, PlayerView, ServerMsg};

use super::combat::Bullet;
use super::state::{MatchPhase, PlayerState, RoomState};

/// Builds the client-facing view of a room.
///
/// Only fields meant for clients are copied; velocity and pending input
/// never leave the room.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn build(state: &RoomState) -> GameStateView {
        let players = state
            .players
            .iter()
            .map(|(id, p)| (*id, Self::player_view(p)))
            .collect();

        let bullets = if state.phase == MatchPhase::InProgress {
            state
                .bullets
                .iter()
                .map(|(id, b)| (*id, Self::bullet_view(b)))
                .collect()
        } else {
            Default::default()
        };

        let ready_players = state.ready.iter().map(|id| (*id, true)).collect();

        GameStateView {
            players,
            bullets,
            state: state.phase,
            winner_id: state.winner_id.map(|id| id.to_string()).unwrap_or_default(),
            ready_players,
        }
    }

    /// Wrap a snapshot in its wire message
    pub fn message(state: &RoomState) -> ServerMsg {
        ServerMsg::GameState(Self::build(state))
    }

    fn player_view(player: &PlayerState) -> PlayerView {
        PlayerView {
            id: player.id,
            x: player.position.x,
            y: player.position.y,
            width: player.width,
            height: player.height,
            color: player.color.to_string(),
            current_hp: player.hp,
            max_hp: player.max_hp,
            shooting_cooldown: player.shoot_cooldown,
        }
    }

    fn bullet_view(bullet: &Bullet) -> BulletView {
        BulletView {
            id: bullet.id,
            owner_id: bullet.owner_id,
            x: bullet.position.x,
            y: bullet.position.y,
            dir_x: bullet.direction.x,
            dir_y: bullet.direction.y,
            radius: bullet.radius,
            times_collided_wall: bullet.bounces,
        }
    }
}
