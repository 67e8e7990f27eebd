//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON envelope `{"type": <kind>, "payload": <kind-specific>}`
//! in both directions.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::game::state::MatchPhase;
use crate::game::vector::Vec2;

/// Raw envelope before the payload is interpreted
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    /// Create a room and join it
    CreateRoom,
    /// Join an existing room by id
    JoinRoom { room_id: String },
    /// Return to the lobby
    LeaveRoom,
    /// Movement input vector
    Input(Vec2),
    /// Fire toward a point in arena coordinates
    Shoot(Vec2),
    /// Ready up for the next match
    Ready,
    /// Vote to restart after a finished match
    Restart,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomPayload {
    room_id: String,
}

#[derive(Debug, Deserialize)]
struct PointPayload {
    x: f64,
    y: f64,
}

impl PointPayload {
    /// Narrow to arena precision. Values outside the f32 range are rejected.
    fn into_vec2(self) -> Option<Vec2> {
        let (x, y) = (self.x as f32, self.y as f32);
        (x.is_finite() && y.is_finite()).then_some(Vec2::new(x, y))
    }
}

impl ClientMsg {
    /// Parse a text frame. Payloads of kinds that carry none are ignored.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

        let msg = match envelope.kind.as_str() {
            "create_room" => ClientMsg::CreateRoom,
            "leave_room" => ClientMsg::LeaveRoom,
            "ready" => ClientMsg::Ready,
            "restart" => ClientMsg::Restart,
            "join_room" => {
                let payload: JoinRoomPayload = payload_of(&envelope)?;
                ClientMsg::JoinRoom {
                    room_id: payload.room_id,
                }
            }
            "input" => ClientMsg::Input(point_of(&envelope)?),
            "shoot" => ClientMsg::Shoot(point_of(&envelope)?),
            other => return Err(ProtocolError::UnknownKind(other.to_string())),
        };

        Ok(msg)
    }

    /// Kind tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMsg::CreateRoom => "create_room",
            ClientMsg::JoinRoom { .. } => "join_room",
            ClientMsg::LeaveRoom => "leave_room",
            ClientMsg::Input(_) => "input",
            ClientMsg::Shoot(_) => "shoot",
            ClientMsg::Ready => "ready",
            ClientMsg::Restart => "restart",
        }
    }
}

fn payload_of<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, ProtocolError> {
    serde_json::from_value(envelope.payload.clone()).map_err(|source| ProtocolError::InvalidPayload {
        kind: envelope.kind.clone(),
        source,
    })
}

fn point_of(envelope: &Envelope) -> Result<Vec2, ProtocolError> {
    let payload: PointPayload = payload_of(envelope)?;
    payload.into_vec2().ok_or_else(|| ProtocolError::InvalidPayload {
        kind: envelope.kind.clone(),
        source: serde::de::Error::custom("coordinates out of range"),
    })
}

/// Client message parse failures
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMsg {
    /// Sent once right after connecting
    #[serde(rename = "welcome")]
    Welcome(WelcomePayload),

    /// Lobby view of open rooms
    #[serde(rename = "room_list")]
    RoomList(Vec<RoomInfo>),

    /// Full room snapshot, sent every tick
    #[serde(rename = "gameState")]
    GameState(GameStateView),

    /// Human-readable failure, e.g. "Room not found"
    #[serde(rename = "error")]
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub player_id: Uuid,
}

/// Room entry in the lobby list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: Uuid,
    pub name: String,
    pub player_count: usize,
    pub max_players: usize,
}

/// Room snapshot as seen by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub players: HashMap<Uuid, PlayerView>,
    /// Empty unless the match is in progress
    pub bullets: HashMap<Uuid, BulletView>,
    pub state: MatchPhase,
    /// Empty string until a winner is decided
    pub winner_id: String,
    pub ready_players: HashMap<Uuid, bool>,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: String,
    #[serde(rename = "currentHP")]
    pub current_hp: i32,
    #[serde(rename = "maxHP")]
    pub max_hp: i32,
    pub shooting_cooldown: f32,
}

/// Bullet state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub radius: f32,
    pub times_collided_wall: u32,
}
