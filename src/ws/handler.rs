//! WebSocket upgrade handler

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::lobby::HubHandle;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::connection::Connection;
use crate::ws::protocol::{ClientMsg, ServerMsg, WelcomePayload};
use crate::ws::router::{dispatch, release};

/// Silence from the client longer than this closes the connection
const READ_TIMEOUT: Duration = Duration::from_secs(60);
/// Keepalive ping interval, comfortably inside the client's read timeout
const PING_INTERVAL: Duration = Duration::from_secs(54);
/// A single frame write that takes longer than this closes the connection
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let (conn, outbound_rx) = Connection::new();
    let player_id = conn.id;
    info!(player_id = %player_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Welcome goes out before anything the hub sends
    conn.try_send(ServerMsg::Welcome(WelcomePayload { player_id }));
    let writer = tokio::spawn(run_writer(player_id, ws_sink, outbound_rx));

    if let Err(e) = hub.connect(conn.clone()).await {
        error!(player_id = %player_id, error = %e, "Hub unavailable, dropping connection");
        conn.close();
        writer.abort();
        return;
    }

    run_reader(&conn, &hub, ws_stream).await;

    writer.abort();
    release(&conn, &hub).await;

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Outbound queue -> WebSocket, plus keepalive pings
async fn run_writer(
    player_id: uuid::Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    let mut ping = interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately
    ping.tick().await;

    loop {
        let frame = tokio::select! {
            msg = outbound_rx.recv() => match msg {
                Some(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => Message::Text(json),
                    Err(e) => {
                        error!(player_id = %player_id, error = %e, "Failed to serialize message");
                        continue;
                    }
                },
                None => break,
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        match timeout(WRITE_TIMEOUT, ws_sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
            Err(_) => {
                warn!(player_id = %player_id, "WebSocket write timed out");
                break;
            }
        }
    }

    let _ = ws_sink.close().await;
}

/// WebSocket -> hub or room
async fn run_reader(conn: &Arc<Connection>, hub: &HubHandle, mut ws_stream: SplitStream<WebSocket>) {
    let player_id = conn.id;
    let rate_limiter = PlayerRateLimiter::new();

    loop {
        let result = match timeout(READ_TIMEOUT, ws_stream.next()).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                debug!(player_id = %player_id, "WebSocket stream ended");
                break;
            }
            Err(_) => {
                info!(player_id = %player_id, "No traffic within read timeout");
                break;
            }
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(player_id = %player_id, "Rate limited client message");
                    continue;
                }

                match ClientMsg::parse(&text) {
                    Ok(msg) => dispatch(conn, hub, msg),
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}
