//! Routes parsed client messages to the hub or the owning room

use std::sync::Arc;

use tracing::{debug, warn};

use crate::game::{DepartureReason, RoomCommand, RoomError, RoomHandle};
use crate::lobby::HubHandle;
use crate::ws::connection::Connection;
use crate::ws::protocol::ClientMsg;

/// Route one message according to where the connection currently lives
pub fn dispatch(conn: &Arc<Connection>, hub: &HubHandle, msg: ClientMsg) {
    match conn.current_room() {
        Some(room) => dispatch_in_room(conn, hub, &room, msg),
        None => dispatch_in_lobby(conn, hub, msg),
    }
}

fn dispatch_in_lobby(conn: &Arc<Connection>, hub: &HubHandle, msg: ClientMsg) {
    let result = match msg {
        ClientMsg::CreateRoom => hub.create_room(conn.clone()),
        ClientMsg::JoinRoom { room_id } => hub.join_room(conn.clone(), room_id),
        other => {
            debug!(player_id = %conn.id, kind = other.kind(), "Ignoring room message in lobby");
            return;
        }
    };

    if let Err(e) = result {
        warn!(player_id = %conn.id, error = %e, "Dropped lobby request");
    }
}

fn dispatch_in_room(conn: &Arc<Connection>, hub: &HubHandle, room: &RoomHandle, msg: ClientMsg) {
    let player_id = conn.id;
    let cmd = match msg {
        ClientMsg::Input(input) => RoomCommand::Input { player_id, input },
        ClientMsg::Shoot(target) => RoomCommand::Shoot { player_id, target },
        ClientMsg::Ready => RoomCommand::Ready(player_id),
        ClientMsg::Restart => RoomCommand::Restart(player_id),
        ClientMsg::LeaveRoom => {
            if let Err(e) = hub.leave_room(conn.clone()) {
                warn!(player_id = %player_id, error = %e, "Dropped leave request");
            }
            return;
        }
        other => {
            debug!(player_id = %player_id, kind = other.kind(), "Ignoring lobby message in room");
            return;
        }
    };

    match room.try_command(cmd) {
        Ok(()) => {}
        Err(RoomError::Busy(room_id)) => {
            warn!(player_id = %player_id, room_id = %room_id, "Room queue full, dropping command");
        }
        Err(e @ RoomError::Closed(_)) => {
            debug!(player_id = %player_id, error = %e, "Command for closed room");
        }
    }
}

/// Run the single cleanup path for a closed transport.
///
/// Whoever owned the connection when it closed does the cleanup. A room that
/// already stopped hands the job back to the hub.
pub async fn release(conn: &Arc<Connection>, hub: &HubHandle) {
    let owner = conn.close();

    if let Some(room) = owner {
        match room.remove(conn.id, DepartureReason::Disconnected).await {
            Ok(()) => return,
            Err(e) => debug!(player_id = %conn.id, error = %e, "Owner room gone, releasing via hub"),
        }
    }

    if let Err(e) = hub.disconnect(conn.clone()).await {
        debug!(player_id = %conn.id, error = %e, "Hub gone during release");
    }
}
