//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic, live-state mutation, and broadcast
//! triggering so route handlers can stay focused on protocol translation
//! and identity plumbing.

pub mod node;
pub mod persistence;
pub mod sandbox;

use tracing::debug;
use uuid::Uuid;

use crate::event::BroadcastEvent;
use crate::rooms::RoomKey;
use crate::state::AppState;

/// Emit an event into the project room and the owner's user room.
///
/// Broadcast is a best-effort side channel: failures are logged and never
/// surfaced to the operation that triggered them.
pub(crate) async fn emit_project_event(state: &AppState, project_id: Uuid, owner_id: Uuid, event: &BroadcastEvent) {
    let to_project = state.router.emit(RoomKey::Project(project_id), event).await;
    let to_owner = state.router.emit(RoomKey::User(owner_id), event).await;
    debug!(%project_id, kind = ?event.kind, to_project, to_owner, "broadcast emitted");
}
