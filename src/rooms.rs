//! Broadcast router — room membership and event fan-out.
//!
//! DESIGN
//! ======
//! A room is a logical channel scoped to a project (`project-{id}`) or a
//! user (`user-{id}`). Membership maps connection IDs to bounded mpsc
//! senders; `emit` walks current members and `try_send`s a clone of the
//! event to each. Delivery order within a room follows emission order
//! because each member has a FIFO channel and emits hold the same lock.
//!
//! The router is an explicit injected instance, not ambient global state,
//! so a broker-backed implementation can replace it behind the same
//! `join`/`emit` surface. It is process-local: with multiple server
//! processes each router only reaches its own connections.
//!
//! ERROR HANDLING
//! ==============
//! Broadcast is a best-effort side channel. Full or closed member channels
//! are skipped, empty rooms deliver to nobody, and `emit` reports a count
//! instead of an error so callers never fail an operation on fan-out.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::event::BroadcastEvent;

// =============================================================================
// ROOM KEY
// =============================================================================

/// Identifies a broadcast channel: one per project, one per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Project(Uuid),
    User(Uuid),
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project(id) => write!(f, "project-{id}"),
            Self::User(id) => write!(f, "user-{id}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid room key: {0}")]
pub struct ParseRoomKeyError(String);

impl FromStr for RoomKey {
    type Err = ParseRoomKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("project-") {
            let id = id.parse().map_err(|_| ParseRoomKeyError(s.to_owned()))?;
            return Ok(Self::Project(id));
        }
        if let Some(id) = s.strip_prefix("user-") {
            let id = id.parse().map_err(|_| ParseRoomKeyError(s.to_owned()))?;
            return Ok(Self::User(id));
        }
        Err(ParseRoomKeyError(s.to_owned()))
    }
}

// =============================================================================
// ROUTER
// =============================================================================

type Members = HashMap<Uuid, mpsc::Sender<BroadcastEvent>>;

/// In-process publish/subscribe router. Clone shares the same room map.
#[derive(Clone, Default)]
pub struct BroadcastRouter {
    rooms: Arc<RwLock<HashMap<RoomKey, Members>>>,
}

impl BroadcastRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Idempotent: re-joining with the same
    /// connection ID replaces the sender without growing membership.
    pub async fn join(&self, room: RoomKey, conn_id: Uuid, tx: mpsc::Sender<BroadcastEvent>) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room).or_default().insert(conn_id, tx);
        debug!(%room, %conn_id, "joined room");
    }

    /// Remove a connection from one room. Empty rooms are evicted.
    pub async fn leave(&self, room: RoomKey, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(&room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    /// Remove a connection from every room it joined. Used on disconnect.
    pub async fn leave_all(&self, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Deliver an event to every current member of a room.
    ///
    /// Returns the number of members the event was handed to. A room with
    /// no members yields 0. Members whose channels are full or closed are
    /// skipped.
    pub async fn emit(&self, room: RoomKey, event: &BroadcastEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(&room) else {
            return 0;
        };

        let mut delivered = 0;
        for (conn_id, tx) in members {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(%room, %conn_id, error = %e, "skipping member on emit");
                }
            }
        }
        delivered
    }

    /// Current member count for a room.
    pub async fn room_size(&self, room: RoomKey) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(&room).map_or(0, HashMap::len)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
