//! Per-client connection endpoint shared by the socket tasks, the hub and rooms

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::game::RoomHandle;
use crate::ws::protocol::ServerMsg;

/// Pending outbound messages per client
pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Default)]
struct Membership {
    room: Option<RoomHandle>,
    closed: bool,
}

/// Handle to one connected client.
///
/// The membership field is written only by the hub. Once the transport
/// closes, `close` freezes it so the owner captured at that moment is the
/// only one that runs cleanup.
pub struct Connection {
    pub id: Uuid,
    outbound: mpsc::Sender<ServerMsg>,
    membership: Mutex<Membership>,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new() -> (Arc<Self>, mpsc::Receiver<ServerMsg>) {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Arc<Self>, mpsc::Receiver<ServerMsg>) {
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        let conn = Arc::new(Self {
            id: Uuid::new_v4(),
            outbound,
            membership: Mutex::new(Membership::default()),
        });
        (conn, outbound_rx)
    }

    /// Queue a message without waiting. Returns false if it was dropped.
    pub fn try_send(&self, msg: ServerMsg) -> bool {
        match self.outbound.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(player_id = %self.id, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a message, waiting at most `bound` for room in the queue
    pub async fn send_within(&self, msg: ServerMsg, bound: Duration) -> bool {
        self.outbound.send_timeout(msg, bound).await.is_ok()
    }

    /// Fire-and-forget `send_within` on a detached task
    pub fn push_within(self: &Arc<Self>, msg: ServerMsg, bound: Duration) {
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            if !conn.send_within(msg, bound).await {
                debug!(player_id = %conn.id, "Timed out delivering message");
            }
        });
    }

    /// Room currently owning this connection
    pub fn current_room(&self) -> Option<RoomHandle> {
        self.membership.lock().room.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.membership.lock().closed
    }

    /// Point this connection at a room. Fails once the transport has closed.
    pub(crate) fn enter_room(&self, room: RoomHandle) -> bool {
        let mut membership = self.membership.lock();
        if membership.closed {
            return false;
        }
        membership.room = Some(room);
        true
    }

    /// Detach from the current room. Returns `None` if the connection was not
    /// in a room or has already closed (its room handles that cleanup).
    pub(crate) fn leave_room(&self) -> Option<RoomHandle> {
        let mut membership = self.membership.lock();
        if membership.closed {
            return None;
        }
        membership.room.take()
    }

    /// Mark the transport closed and return the owner at this instant.
    /// `None` means the hub owns the connection.
    pub fn close(&self) -> Option<RoomHandle> {
        let mut membership = self.membership.lock();
        membership.closed = true;
        membership.room.clone()
    }
}
