//! WebSocket handler — room subscription and event relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection ID, auto-joins the caller's user
//! room, and enters a `select!` loop:
//! - Inbound text commands → join/leave room subscriptions
//! - Broadcast events from the router → forward to the client as JSON
//!
//! Joining a project room is gated on ownership of that project; commands
//! for rooms the caller does not own are ignored with a warning rather
//! than closing the socket. On close, the connection leaves every room.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::BroadcastEvent;
use crate::rooms::RoomKey;
use crate::state::AppState;

/// Per-connection event buffer. Slow consumers past this depth start
/// dropping events; reconnect + re-fetch is the recovery path.
const EVENT_BUFFER: usize = 256;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user_id) = params.get("user_id").and_then(|s| s.parse().ok()) else {
        return (StatusCode::UNAUTHORIZED, "user_id required").into_response();
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, user_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: Uuid) {
    let conn_id = Uuid::new_v4();
    let (event_tx, mut event_rx) = mpsc::channel::<BroadcastEvent>(EVENT_BUFFER);

    // Every connection hears its own user room without asking.
    state.router.join(RoomKey::User(user_id), conn_id, event_tx.clone()).await;
    info!(%conn_id, %user_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        handle_command(&state, conn_id, user_id, &event_tx, &text).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = event_rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    state.router.leave_all(conn_id).await;
    info!(%conn_id, "ws: client disconnected");
}

// =============================================================================
// COMMANDS
// =============================================================================

#[derive(Deserialize)]
struct RoomCommand {
    action: String,
    room: String,
}

/// Parse and apply one inbound subscription command.
///
/// Separated from the socket loop so room-management behavior is testable
/// without a live websocket.
async fn handle_command(
    state: &AppState,
    conn_id: Uuid,
    user_id: Uuid,
    event_tx: &mpsc::Sender<BroadcastEvent>,
    text: &str,
) {
    let command: RoomCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(e) => {
            warn!(%conn_id, error = %e, "ws: invalid command");
            return;
        }
    };
    let room: RoomKey = match command.room.parse() {
        Ok(r) => r,
        Err(e) => {
            warn!(%conn_id, error = %e, "ws: invalid room key");
            return;
        }
    };

    match command.action.as_str() {
        "join" => {
            if !may_join(state, user_id, room).await {
                warn!(%conn_id, %user_id, %room, "ws: join refused");
                return;
            }
            state.router.join(room, conn_id, event_tx.clone()).await;
        }
        "leave" => {
            state.router.leave(room, conn_id).await;
        }
        other => {
            warn!(%conn_id, action = other, "ws: unknown action");
        }
    }
}

/// A connection may always (re)join its own user room; project rooms
/// require ownership of the project.
async fn may_join(state: &AppState, user_id: Uuid, room: RoomKey) -> bool {
    match room {
        RoomKey::User(id) => id == user_id,
        RoomKey::Project(project_id) => {
            let projects = state.projects.read().await;
            projects
                .get(&project_id)
                .is_some_and(|p| p.project.owner_id == user_id)
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &BroadcastEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize event");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
