//! Room actor and the authoritative tick loop
//!
//! Each room runs as its own task. Commands from the hub (membership) and from
//! players (input, shoot, ready, restart) arrive on one channel and are applied
//! one at a time, interleaved with the 60 Hz tick.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_delta, tick_duration};
use crate::ws::connection::Connection;

use super::snapshot::SnapshotBuilder;
use super::spawn::SpawnSource;
use super::state::RoomState;
use super::vector::Vec2;

/// Pending commands per room
pub const ROOM_COMMAND_CAPACITY: usize = 64;

/// Why a member is being removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartureReason {
    /// Asked to go back to the lobby
    Left,
    /// Transport closed
    Disconnected,
}

/// Commands accepted by a room
pub enum RoomCommand {
    Admit(Arc<Connection>),
    Remove {
        player_id: Uuid,
        reason: DepartureReason,
    },
    Input {
        player_id: Uuid,
        input: Vec2,
    },
    Shoot {
        player_id: Uuid,
        target: Vec2,
    },
    Ready(Uuid),
    Restart(Uuid),
}

/// Lifecycle notifications from a room to the hub
pub enum RoomEvent {
    /// A member was removed
    Departed { room_id: Uuid, player_id: Uuid },
    /// An admit that arrived after the room emptied; the hub takes it back
    Bounced { room_id: Uuid, conn: Arc<Connection> },
    /// The room emptied and its task has stopped
    Retired { room_id: Uuid },
}

/// Room command delivery errors
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} is closed")]
    Closed(Uuid),

    #[error("room {0} command queue is full")]
    Busy(Uuid),
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Hand a connection to the room. Waits for queue space so it is never lost.
    pub async fn admit(&self, conn: Arc<Connection>) -> Result<(), RoomError> {
        self.commands
            .send(RoomCommand::Admit(conn))
            .await
            .map_err(|_| RoomError::Closed(self.id))
    }

    /// Remove a member. Waits for queue space so it is never lost.
    pub async fn remove(&self, player_id: Uuid, reason: DepartureReason) -> Result<(), RoomError> {
        self.commands
            .send(RoomCommand::Remove { player_id, reason })
            .await
            .map_err(|_| RoomError::Closed(self.id))
    }

    /// Queue a player command without waiting; dropped if the queue is full
    pub fn try_command(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.commands.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RoomError::Busy(self.id),
            mpsc::error::TrySendError::Closed(_) => RoomError::Closed(self.id),
        })
    }
}

/// The authoritative game room
pub struct Room {
    state: RoomState,
    /// Member connections by player id
    members: HashMap<Uuid, Arc<Connection>>,
    commands: mpsc::Receiver<RoomCommand>,
    events: mpsc::UnboundedSender<RoomEvent>,
}

impl Room {
    /// Create a room
    pub fn new(
        id: Uuid,
        spawns: Box<dyn SpawnSource>,
        events: mpsc::UnboundedSender<RoomEvent>,
    ) -> (Self, RoomHandle) {
        let (commands_tx, commands) = mpsc::channel(ROOM_COMMAND_CAPACITY);

        let handle = RoomHandle {
            id,
            commands: commands_tx,
        };

        let room = Self {
            state: RoomState::new(id, spawns),
            members: HashMap::new(),
            commands,
            events,
        };

        (room, handle)
    }

    /// Run the room until it empties or every handle is dropped
    pub async fn run(mut self) {
        let room_id = self.state.id;
        info!(room_id = %room_id, "Room started");

        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).is_break() {
                            self.retire();
                            break;
                        }
                    }
                    None => {
                        info!(room_id = %room_id, "All room handles dropped");
                        break;
                    }
                },
                _ = ticker.tick() => self.tick(),
            }
        }

        info!(room_id = %room_id, "Room stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Admit(conn) => return self.admit(conn),
            RoomCommand::Remove { player_id, reason } => return self.remove(player_id, reason),
            RoomCommand::Input { player_id, input } => self.state.set_input(player_id, input),
            RoomCommand::Shoot { player_id, target } => {
                self.state.shoot(player_id, target);
            }
            RoomCommand::Ready(player_id) => {
                self.state.mark_ready(player_id);
            }
            RoomCommand::Restart(player_id) => {
                self.state.mark_restart(player_id);
            }
        }
        ControlFlow::Continue(())
    }

    fn admit(&mut self, conn: Arc<Connection>) -> ControlFlow<()> {
        let player_id = conn.id;
        if self.members.contains_key(&player_id) {
            warn!(room_id = %self.state.id, player_id = %player_id, "Player already in room");
            return ControlFlow::Continue(());
        }

        // Transport closed during the hand-off; its remove was already ignored
        if conn.is_closed() {
            info!(room_id = %self.state.id, player_id = %player_id, "Admit for closed connection dropped");
            let _ = self.events.send(RoomEvent::Departed {
                room_id: self.state.id,
                player_id,
            });
            return if self.members.is_empty() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            };
        }

        self.members.insert(player_id, conn);
        let color = self.state.add_player(player_id).color;

        info!(
            room_id = %self.state.id,
            player_id = %player_id,
            color,
            player_count = self.members.len(),
            "Player joined room"
        );

        self.broadcast();
        ControlFlow::Continue(())
    }

    fn remove(&mut self, player_id: Uuid, reason: DepartureReason) -> ControlFlow<()> {
        if self.members.remove(&player_id).is_none() {
            debug!(room_id = %self.state.id, player_id = %player_id, "Remove for non-member ignored");
            return ControlFlow::Continue(());
        }
        self.state.remove_player(player_id);

        info!(
            room_id = %self.state.id,
            player_id = %player_id,
            reason = ?reason,
            player_count = self.members.len(),
            "Player left room"
        );

        let _ = self.events.send(RoomEvent::Departed {
            room_id: self.state.id,
            player_id,
        });

        if self.members.is_empty() {
            return ControlFlow::Break(());
        }

        self.broadcast();
        ControlFlow::Continue(())
    }

    /// Stop accepting commands, hand back queued admits and tell the hub
    fn retire(&mut self) {
        let room_id = self.state.id;
        self.commands.close();

        while let Ok(cmd) = self.commands.try_recv() {
            if let RoomCommand::Admit(conn) = cmd {
                debug!(room_id = %room_id, player_id = %conn.id, "Bouncing admit for retiring room");
                let _ = self.events.send(RoomEvent::Bounced { room_id, conn });
            }
        }

        info!(room_id = %room_id, "Room is empty, signalling hub for removal");
        let _ = self.events.send(RoomEvent::Retired { room_id });
    }

    fn tick(&mut self) {
        let hits = self.state.step(tick_delta());
        for hit in hits.iter().filter(|h| h.target_killed) {
            debug!(
                room_id = %self.state.id,
                shooter_id = %hit.shooter_id,
                target_id = %hit.target_id,
                "Fatal hit"
            );
        }
        self.broadcast();
    }

    /// Send the current snapshot to every member without waiting.
    /// A client with a full queue misses this tick.
    fn broadcast(&self) {
        let snapshot = SnapshotBuilder::message(&self.state);

        let delivered = self
            .members
            .values()
            .filter(|conn| conn.try_send(snapshot.clone()))
            .count();

        if delivered < self.members.len() {
            debug!(
                room_id = %self.state.id,
                delivered,
                members = self.members.len(),
                "Game state broadcast skipped slow clients"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::spawn::FixedSpawns;
    use crate::game::state::MatchPhase;
    use crate::ws::protocol::{GameStateView, ServerMsg};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    fn spawn_room() -> (RoomHandle, mpsc::UnboundedReceiver<RoomEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (room, handle) = Room::new(
            Uuid::new_v4(),
            Box::new(FixedSpawns::new(vec![Vec2::new(100.0, 300.0), Vec2::new(900.0, 300.0)])),
            events_tx,
        );
        tokio::spawn(room.run());
        (handle, events_rx)
    }

    async fn next_game_state(rx: &mut mpsc::Receiver<ServerMsg>) -> GameStateView {
        loop {
            let msg = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out waiting for game state")
                .expect("outbound closed");
            if let ServerMsg::GameState(view) = msg {
                return view;
            }
        }
    }

    async fn game_state_where(
        rx: &mut mpsc::Receiver<ServerMsg>,
        pred: impl Fn(&GameStateView) -> bool,
    ) -> GameStateView {
        for _ in 0..120 {
            let view = next_game_state(rx).await;
            if pred(&view) {
                return view;
            }
        }
        panic!("no matching game state");
    }

    #[tokio::test(start_paused = true)]
    async fn test_members_receive_snapshots() {
        let (room, _events) = spawn_room();
        let (a, mut a_rx) = Connection::new();
        assert_ok!(room.admit(a.clone()).await);

        let view = next_game_state(&mut a_rx).await;
        assert_eq!(view.state, MatchPhase::Waiting);
        assert!(view.players.contains_key(&a.id));
        assert_eq!(view.players[&a.id].current_hp, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_ready_starts_match() {
        let (room, _events) = spawn_room();
        let (a, mut a_rx) = Connection::new();
        let (b, mut b_rx) = Connection::new();
        assert_ok!(room.admit(a.clone()).await);
        assert_ok!(room.admit(b.clone()).await);

        assert_ok!(room.try_command(RoomCommand::Ready(a.id)));
        assert_ok!(room.try_command(RoomCommand::Ready(b.id)));

        let view = game_state_where(&mut a_rx, |v| v.state == MatchPhase::InProgress).await;
        assert!(view.bullets.is_empty());
        assert_eq!(view.players.len(), 2);
        assert!(view.players.values().all(|p| p.current_hp == 10));

        let view = game_state_where(&mut b_rx, |v| v.state == MatchPhase::InProgress).await;
        assert_eq!(view.players.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_match_resets_without_retiring() {
        let (room, mut events) = spawn_room();
        let (a, mut a_rx) = Connection::new();
        let (b, _b_rx) = Connection::new();
        assert_ok!(room.admit(a.clone()).await);
        assert_ok!(room.admit(b.clone()).await);
        assert_ok!(room.try_command(RoomCommand::Ready(a.id)));
        assert_ok!(room.try_command(RoomCommand::Ready(b.id)));
        game_state_where(&mut a_rx, |v| v.state == MatchPhase::InProgress).await;

        assert_ok!(room.remove(b.id, DepartureReason::Disconnected).await);
        let view = game_state_where(&mut a_rx, |v| v.players.len() == 1).await;
        assert_eq!(view.state, MatchPhase::Waiting);
        assert_eq!(view.players[&a.id].current_hp, 10);
        assert!(view.ready_players.is_empty());

        match events.recv().await {
            Some(RoomEvent::Departed { player_id, .. }) => assert_eq!(player_id, b.id),
            _ => panic!("expected departure"),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_member_leaving_retires_once() {
        let (room, mut events) = spawn_room();
        let (a, _a_rx) = Connection::new();
        let (b, _b_rx) = Connection::new();
        assert_ok!(room.admit(a.clone()).await);
        assert_ok!(room.admit(b.clone()).await);

        assert_ok!(room.remove(a.id, DepartureReason::Left).await);
        assert_ok!(room.remove(b.id, DepartureReason::Disconnected).await);

        let mut departed = 0;
        let mut retired = 0;
        while let Some(event) = events.recv().await {
            match event {
                RoomEvent::Departed { .. } => departed += 1,
                RoomEvent::Retired { room_id } => {
                    assert_eq!(room_id, room.id);
                    retired += 1;
                }
                RoomEvent::Bounced { .. } => panic!("nothing to bounce"),
            }
        }

        // Channel closed: the room task ended and dropped its sender
        assert_eq!(departed, 2);
        assert_eq!(retired, 1);
        assert_err!(room.admit(a.clone()).await);
        assert!(matches!(
            room.try_command(RoomCommand::Ready(a.id)),
            Err(RoomError::Closed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_queued_behind_last_departure_is_bounced() {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (room, handle) = Room::new(
            Uuid::new_v4(),
            Box::new(FixedSpawns::new(vec![Vec2::ZERO])),
            events_tx,
        );
        let (a, _a_rx) = Connection::new();
        let (late, _late_rx) = Connection::new();

        // Queue everything before the room runs
        assert_ok!(handle.admit(a.clone()).await);
        assert_ok!(handle.remove(a.id, DepartureReason::Left).await);
        assert_ok!(handle.admit(late.clone()).await);
        tokio::spawn(room.run());

        let mut order = Vec::new();
        while let Some(event) = events.recv().await {
            order.push(match event {
                RoomEvent::Departed { player_id, .. } => {
                    assert_eq!(player_id, a.id);
                    "departed"
                }
                RoomEvent::Bounced { conn, .. } => {
                    assert_eq!(conn.id, late.id);
                    "bounced"
                }
                RoomEvent::Retired { .. } => "retired",
            });
        }
        assert_eq!(order, vec!["departed", "bounced", "retired"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_of_stranger_is_ignored() {
        let (room, mut events) = spawn_room();
        let (a, mut a_rx) = Connection::new();
        assert_ok!(room.admit(a.clone()).await);
        assert_ok!(room.remove(Uuid::new_v4(), DepartureReason::Disconnected).await);

        let view = next_game_state(&mut a_rx).await;
        assert!(view.players.contains_key(&a.id));
        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_all_handles_stops_room() {
        let (events_tx, _events) = mpsc::unbounded_channel();
        let (room, handle) = Room::new(
            Uuid::new_v4(),
            Box::new(FixedSpawns::new(vec![Vec2::ZERO])),
            events_tx,
        );
        let task = tokio::spawn(room.run());
        drop(handle);
        assert_ok!(assert_ok!(timeout(Duration::from_secs(1), task).await));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_after_close_leaves_no_player_and_retires() {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (room, handle) = Room::new(
            Uuid::new_v4(),
            Box::new(FixedSpawns::new(vec![Vec2::ZERO])),
            events_tx,
        );
        let (a, _a_rx) = Connection::new();

        // Transport closes between hand-off and admit: remove arrives first
        assert!(a.enter_room(handle.clone()));
        assert_eq!(a.close().map(|r| r.id), Some(handle.id));
        assert_ok!(handle.remove(a.id, DepartureReason::Disconnected).await);
        assert_ok!(handle.admit(a.clone()).await);
        let task = tokio::spawn(room.run());

        let mut order = Vec::new();
        while let Some(event) = events.recv().await {
            order.push(match event {
                RoomEvent::Departed { player_id, .. } => {
                    assert_eq!(player_id, a.id);
                    "departed"
                }
                RoomEvent::Bounced { .. } => "bounced",
                RoomEvent::Retired { .. } => "retired",
            });
        }
        assert_eq!(order, vec!["departed", "retired"]);
        assert_ok!(assert_ok!(timeout(Duration::from_secs(1), task).await));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_joiner_is_not_added_beside_member() {
        let (room, mut events) = spawn_room();
        let (a, mut a_rx) = Connection::new();
        let (b, _b_rx) = Connection::new();
        assert_ok!(room.admit(a.clone()).await);

        b.close();
        assert_ok!(room.remove(b.id, DepartureReason::Disconnected).await);
        assert_ok!(room.admit(b.clone()).await);

        match events.recv().await {
            Some(RoomEvent::Departed { player_id, .. }) => assert_eq!(player_id, b.id),
            _ => panic!("expected departure for the closed joiner"),
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut last = None;
        while let Ok(ServerMsg::GameState(view)) = a_rx.try_recv() {
            last = Some(view);
        }
        let view = last.expect("member keeps receiving snapshots");
        assert_eq!(view.players.len(), 1);
        assert!(view.players.contains_key(&a.id));
        assert!(events.try_recv().is_err());
    }
}
