//! Registry of live rooms, owned by the hub

use std::collections::HashMap;

use uuid::Uuid;

use crate::game::rules::MAX_PLAYERS_PER_ROOM;
use crate::game::RoomHandle;
use crate::ws::protocol::RoomInfo;

/// Why a join was refused. The display text is what the client sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejection {
    #[error("Room not found")]
    NotFound,

    #[error("Room is full")]
    Full,
}

/// Hub-side bookkeeping for one room
struct RoomEntry {
    handle: RoomHandle,
    /// Member ids in join order
    members: Vec<Uuid>,
    /// Creation order, for a stable lobby listing
    seq: u64,
}

impl RoomEntry {
    fn label(&self) -> String {
        match self.members.first() {
            Some(id) => format!("Room by {}", &id.to_string()[..6]),
            None => "Empty".to_string(),
        }
    }
}

/// Registry of all live rooms.
///
/// Member counts are tracked here as the hub hands connections off and as
/// rooms report departures, so fullness checks never reach into a room.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: HashMap<Uuid, RoomEntry>,
    next_seq: u64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: RoomHandle) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.rooms.insert(
            handle.id,
            RoomEntry {
                handle,
                members: Vec::new(),
                seq,
            },
        );
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.remove(id).map(|entry| entry.handle)
    }

    pub fn add_member(&mut self, room_id: &Uuid, player_id: Uuid) {
        if let Some(entry) = self.rooms.get_mut(room_id) {
            if !entry.members.contains(&player_id) {
                entry.members.push(player_id);
            }
        }
    }

    /// Returns true if the player was counted as a member
    pub fn remove_member(&mut self, room_id: &Uuid, player_id: &Uuid) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(entry) => {
                let before = entry.members.len();
                entry.members.retain(|id| id != player_id);
                entry.members.len() != before
            }
            None => false,
        }
    }

    pub fn member_count(&self, room_id: &Uuid) -> usize {
        self.rooms.get(room_id).map(|e| e.members.len()).unwrap_or(0)
    }

    /// Look up a room a new player may join.
    /// Rooms with no members are about to retire and count as missing.
    pub fn find_joinable(&self, room_id: &str) -> Result<RoomHandle, JoinRejection> {
        let entry = Uuid::parse_str(room_id)
            .ok()
            .and_then(|id| self.rooms.get(&id))
            .filter(|entry| !entry.members.is_empty())
            .ok_or(JoinRejection::NotFound)?;

        if entry.members.len() >= MAX_PLAYERS_PER_ROOM {
            return Err(JoinRejection::Full);
        }

        Ok(entry.handle.clone())
    }

    /// Lobby listing in creation order, without retiring rooms
    pub fn room_infos(&self) -> Vec<RoomInfo> {
        let mut entries: Vec<&RoomEntry> = self
            .rooms
            .values()
            .filter(|e| !e.members.is_empty())
            .collect();
        entries.sort_by_key(|e| e.seq);

        entries
            .into_iter()
            .map(|e| RoomInfo {
                id: e.handle.id,
                name: e.label(),
                player_count: e.members.len(),
                max_players: MAX_PLAYERS_PER_ROOM,
            })
            .collect()
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.values().map(|e| e.members.len()).sum()
    }
}
