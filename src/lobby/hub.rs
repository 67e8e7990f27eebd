//! Hub actor: owns the lobby and the room registry
//!
//! Every connection starts in the lobby. The hub creates rooms, hands
//! connections to them, takes them back on leave, and drops rooms once they
//! report they are empty. All of this happens on one task, so the lobby and
//! the registry need no locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::spawn::SeededSpawns;
use crate::game::{DepartureReason, Room, RoomEvent, RoomHandle};
use crate::ws::connection::Connection;
use crate::ws::protocol::ServerMsg;

use super::registry::{JoinRejection, RoomRegistry};

/// Pending hub commands
pub const HUB_COMMAND_CAPACITY: usize = 256;

/// How long a lobby listing may wait for queue space
const ROOM_LIST_SEND_BOUND: Duration = Duration::from_secs(5);
/// How long an error reply may wait for queue space
const ERROR_SEND_BOUND: Duration = Duration::from_secs(1);

/// Commands accepted by the hub
pub enum HubCommand {
    Connect(Arc<Connection>),
    Disconnect(Arc<Connection>),
    CreateRoom(Arc<Connection>),
    JoinRoom {
        conn: Arc<Connection>,
        room_id: String,
    },
    LeaveRoom(Arc<Connection>),
    Stats(oneshot::Sender<HubStats>),
}

/// Point-in-time counts for health reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub lobby_connections: usize,
    pub active_rooms: usize,
    pub players_in_rooms: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub has stopped")]
    Stopped,

    #[error("hub command queue is full")]
    Busy,
}

impl<T> From<mpsc::error::TrySendError<T>> for HubError {
    fn from(e: mpsc::error::TrySendError<T>) -> Self {
        match e {
            mpsc::error::TrySendError::Full(_) => HubError::Busy,
            mpsc::error::TrySendError::Closed(_) => HubError::Stopped,
        }
    }
}

/// Cloneable handle used by sockets and the HTTP layer
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a new connection in the lobby. Never dropped.
    pub async fn connect(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Connect(conn))
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Forget a closed connection. Never dropped.
    pub async fn disconnect(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Disconnect(conn))
            .await
            .map_err(|_| HubError::Stopped)
    }

    pub fn create_room(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        Ok(self.commands.try_send(HubCommand::CreateRoom(conn))?)
    }

    pub fn join_room(&self, conn: Arc<Connection>, room_id: String) -> Result<(), HubError> {
        Ok(self.commands.try_send(HubCommand::JoinRoom { conn, room_id })?)
    }

    pub fn leave_room(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        Ok(self.commands.try_send(HubCommand::LeaveRoom(conn))?)
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Stats(tx))
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }
}

/// The lobby director
pub struct Hub {
    /// Connections not in any room
    lobby: HashMap<Uuid, Arc<Connection>>,
    rooms: RoomRegistry,
    commands: mpsc::Receiver<HubCommand>,
    events_tx: mpsc::UnboundedSender<RoomEvent>,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    /// Seeds each room's spawn source
    seeds: ChaCha8Rng,
}

impl Hub {
    /// Create the hub. A fixed seed makes spawn points reproducible.
    pub fn new(seed: Option<u64>) -> (Self, HubHandle) {
        let (commands_tx, commands) = mpsc::channel(HUB_COMMAND_CAPACITY);
        let (events_tx, events) = mpsc::unbounded_channel();

        let seeds = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let hub = Self {
            lobby: HashMap::new(),
            rooms: RoomRegistry::new(),
            commands,
            events_tx,
            events,
            seeds,
        };

        (hub, HubHandle { commands: commands_tx })
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(event) = self.events.recv() => self.handle_event(event),
            }
        }

        info!(
            lobby_connections = self.lobby.len(),
            active_rooms = self.rooms.active_rooms(),
            "Hub stopped"
        );
    }

    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect(conn) => self.connect(conn),
            HubCommand::Disconnect(conn) => self.disconnect(conn),
            HubCommand::CreateRoom(conn) => self.create_room(conn).await,
            HubCommand::JoinRoom { conn, room_id } => self.join_room(conn, room_id).await,
            HubCommand::LeaveRoom(conn) => self.leave_room(conn).await,
            HubCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Departed { room_id, player_id } => {
                // Leaves were already counted when the hub took the player back
                if self.rooms.remove_member(&room_id, &player_id)
                    && self.rooms.member_count(&room_id) > 0
                {
                    self.broadcast_room_list(None);
                }
            }
            RoomEvent::Bounced { room_id, conn } => {
                self.rooms.remove_member(&room_id, &conn.id);
                if conn.leave_room().is_some() {
                    info!(room_id = %room_id, player_id = %conn.id, "Join raced room retirement, back to lobby");
                    self.return_to_lobby(&conn);
                    conn.push_within(
                        ServerMsg::Error(JoinRejection::NotFound.to_string()),
                        ERROR_SEND_BOUND,
                    );
                }
            }
            RoomEvent::Retired { room_id } => {
                if self.rooms.remove(&room_id).is_some() {
                    info!(room_id = %room_id, active_rooms = self.rooms.active_rooms(), "Room removed");
                    self.broadcast_room_list(None);
                }
            }
        }
    }

    fn connect(&mut self, conn: Arc<Connection>) {
        info!(player_id = %conn.id, lobby_size = self.lobby.len() + 1, "Client connected to lobby");
        self.lobby.insert(conn.id, conn.clone());
        conn.push_within(ServerMsg::RoomList(self.rooms.room_infos()), ROOM_LIST_SEND_BOUND);
    }

    fn disconnect(&mut self, conn: Arc<Connection>) {
        if self.lobby.remove(&conn.id).is_some() {
            info!(player_id = %conn.id, lobby_size = self.lobby.len(), "Client left lobby");
        } else {
            debug!(player_id = %conn.id, "Disconnect for client not in lobby");
        }
    }

    async fn create_room(&mut self, creator: Arc<Connection>) {
        if !self.lobby.contains_key(&creator.id) {
            warn!(player_id = %creator.id, "Create room from client outside lobby");
            return;
        }

        let room_id = Uuid::new_v4();
        let spawns = SeededSpawns::new(self.seeds.gen());
        let (room, handle) = Room::new(room_id, Box::new(spawns), self.events_tx.clone());
        tokio::spawn(room.run());
        self.rooms.insert(handle.clone());

        info!(room_id = %room_id, player_id = %creator.id, "Room created");

        if self.hand_off(&creator, &handle).await {
            self.broadcast_room_list(None);
        } else {
            // Dropping the last handles stops the room task
            self.rooms.remove(&room_id);
        }
    }

    async fn join_room(&mut self, conn: Arc<Connection>, room_id: String) {
        if !self.lobby.contains_key(&conn.id) {
            warn!(player_id = %conn.id, "Join room from client outside lobby");
            return;
        }

        let handle = match self.rooms.find_joinable(&room_id) {
            Ok(handle) => handle,
            Err(rejection) => {
                info!(player_id = %conn.id, room_id = %room_id, reason = %rejection, "Join rejected");
                conn.push_within(ServerMsg::Error(rejection.to_string()), ERROR_SEND_BOUND);
                return;
            }
        };

        if self.hand_off(&conn, &handle).await {
            self.broadcast_room_list(None);
        }
    }

    /// Move a lobby connection into a room. Returns false if it did not land.
    async fn hand_off(&mut self, conn: &Arc<Connection>, room: &RoomHandle) -> bool {
        self.lobby.remove(&conn.id);

        if !conn.enter_room(room.clone()) {
            debug!(player_id = %conn.id, "Client closed before hand-off");
            return false;
        }

        if let Err(e) = room.admit(conn.clone()).await {
            warn!(player_id = %conn.id, error = %e, "Room refused admit");
            conn.leave_room();
            self.return_to_lobby(conn);
            conn.push_within(
                ServerMsg::Error(JoinRejection::NotFound.to_string()),
                ERROR_SEND_BOUND,
            );
            return false;
        }

        self.rooms.add_member(&room.id, conn.id);
        true
    }

    async fn leave_room(&mut self, conn: Arc<Connection>) {
        let Some(room) = conn.leave_room() else {
            debug!(player_id = %conn.id, "Leave from client not in a room");
            return;
        };

        if let Err(e) = room.remove(conn.id, DepartureReason::Left).await {
            debug!(player_id = %conn.id, error = %e, "Room already closed on leave");
        }
        self.rooms.remove_member(&room.id, &conn.id);

        info!(room_id = %room.id, player_id = %conn.id, "Client returned to lobby");
        self.return_to_lobby(&conn);

        // An emptied room is announced once it retires
        if self.rooms.member_count(&room.id) > 0 {
            self.broadcast_room_list(Some(conn.id));
        }
    }

    /// Put a connection back in the lobby and send it a fresh listing
    fn return_to_lobby(&mut self, conn: &Arc<Connection>) {
        self.lobby.insert(conn.id, conn.clone());
        conn.push_within(ServerMsg::RoomList(self.rooms.room_infos()), ROOM_LIST_SEND_BOUND);
    }

    /// Send the listing to every lobby connection without waiting
    fn broadcast_room_list(&self, skip: Option<Uuid>) {
        let list = self.rooms.room_infos();

        let mut delivered = 0;
        for conn in self.lobby.values().filter(|c| Some(c.id) != skip) {
            if conn.try_send(ServerMsg::RoomList(list.clone())) {
                delivered += 1;
            }
        }

        debug!(rooms = list.len(), delivered, "Broadcast room list");
    }

    fn stats(&self) -> HubStats {
        HubStats {
            lobby_connections: self.lobby.len(),
            active_rooms: self.rooms.active_rooms(),
            players_in_rooms: self.rooms.total_players(),
        }
    }
}
