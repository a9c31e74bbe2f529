//! Node service — create and move canvas nodes.
//!
//! DESIGN
//! ======
//! Node mutations update in-memory state immediately, mark the node dirty
//! for debounced persistence, and broadcast the change to the project room
//! and the owner's user room. Position is mutated independently of the
//! other node fields: the move path touches nothing but `position` and the
//! revision counter.

use uuid::Uuid;

use crate::event::{BroadcastEvent, EventKind};
use crate::state::{AppState, Node, Position};

use super::emit_project_event;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("project not found: {0}")]
    ProjectNotFound(Uuid),
    #[error("node not found: {0}")]
    NodeNotFound(Uuid),
    #[error("caller does not own project {0}")]
    Unauthorized(Uuid),
    #[error("position ({x}, {y}) is not a well-formed coordinate pair")]
    InvalidPosition { x: f64, y: f64 },
    #[error("node kind must not be empty")]
    MissingKind,
}

// =============================================================================
// CREATE
// =============================================================================

/// Create a node on a project canvas.
///
/// # Errors
///
/// Validation failures (`MissingKind`, `InvalidPosition`) and
/// authorization failures are rejected before any persisted or broadcast
/// side effect.
pub async fn create_node(
    state: &AppState,
    project_id: Uuid,
    owner_id: Uuid,
    kind: &str,
    position: Position,
    data: serde_json::Value,
    style: serde_json::Value,
) -> Result<Node, NodeError> {
    if kind.trim().is_empty() {
        return Err(NodeError::MissingKind);
    }
    if !position.is_finite() {
        return Err(NodeError::InvalidPosition { x: position.x, y: position.y });
    }

    let node = {
        let mut projects = state.projects.write().await;
        let project = projects
            .get_mut(&project_id)
            .ok_or(NodeError::ProjectNotFound(project_id))?;
        if project.project.owner_id != owner_id {
            return Err(NodeError::Unauthorized(project_id));
        }

        let node = Node {
            id: Uuid::new_v4(),
            project_id,
            owner_id,
            kind: kind.to_owned(),
            position,
            data,
            style,
            rev: 1,
        };
        project.dirty.insert(node.id);
        project.nodes.insert(node.id, node.clone());
        node
    };

    let payload = serde_json::to_value(&node).unwrap_or_default();
    let event = BroadcastEvent::new(EventKind::NodeCreated, project_id, payload).with_user(owner_id);
    emit_project_event(state, project_id, owner_id, &event).await;

    Ok(node)
}

// =============================================================================
// MOVE
// =============================================================================

/// Move a node to a new position.
///
/// Broadcasts `node_position_updated` with `{nodeId, x, y}` to the
/// project room and the owner's user room.
///
/// # Errors
///
/// `InvalidPosition` for non-finite coordinates; `NodeNotFound` when the
/// node does not exist on the project.
pub async fn update_position(
    state: &AppState,
    project_id: Uuid,
    owner_id: Uuid,
    node_id: Uuid,
    position: Position,
) -> Result<Node, NodeError> {
    if !position.is_finite() {
        return Err(NodeError::InvalidPosition { x: position.x, y: position.y });
    }

    let node = {
        let mut projects = state.projects.write().await;
        let project = projects
            .get_mut(&project_id)
            .ok_or(NodeError::ProjectNotFound(project_id))?;
        if project.project.owner_id != owner_id {
            return Err(NodeError::Unauthorized(project_id));
        }
        let node = project
            .nodes
            .get_mut(&node_id)
            .ok_or(NodeError::NodeNotFound(node_id))?;

        node.position = position;
        node.rev += 1;
        project.dirty.insert(node_id);
        node.clone()
    };

    let payload = serde_json::json!({
        "nodeId": node_id,
        "x": position.x,
        "y": position.y,
    });
    let event = BroadcastEvent::new(EventKind::NodePositionUpdated, project_id, payload).with_user(owner_id);
    emit_project_event(state, project_id, owner_id, &event).await;

    Ok(node)
}

#[cfg(test)]
#[path = "node_test.rs"]
mod tests;
