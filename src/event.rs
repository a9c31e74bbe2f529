//! Broadcast event — the message type fanned out to room members.
//!
//! DESIGN
//! ======
//! Every live update in sandboard is a `BroadcastEvent`. The server emits
//! them into rooms via the router, connected clients receive them as JSON
//! text frames, and the client sync agent dispatches on `kind`.
//!
//! Delivery is best-effort and at-most-once: events are never queued for
//! absent members and never replayed. Clients that reconnect must re-fetch
//! authoritative state instead of assuming they missed nothing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// EVENT KIND
// =============================================================================

/// Discriminates the payload shape of a broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StatusUpdate,
    NodeCreated,
    NodePositionUpdated,
}

// =============================================================================
// EVENT
// =============================================================================

/// One fire-and-forget message delivered to all current room members.
///
/// Wire shape: `{ "type", "projectId", "userId"?, "payload", "timestamp" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub project_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub payload: serde_json::Value,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    pub timestamp: i64,
}

/// Current time as milliseconds since Unix epoch.
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl BroadcastEvent {
    pub fn new(kind: EventKind, project_id: Uuid, payload: serde_json::Value) -> Self {
        Self { kind, project_id, user_id: None, payload, timestamp: now_ms() }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
