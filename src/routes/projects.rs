//! Project sandbox and node routes.
//!
//! DESIGN
//! ======
//! Handlers stay thin: decode, dedup, delegate to the service layer, map
//! errors to status codes. Burst-prone writes (sandbox provisioning, node
//! creation) pass through the request deduplicator first; a duplicate
//! inside the window is answered with success and `"deduplicated": true`
//! without reaching the service.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::dedup::dedup_key;
use crate::routes::Caller;
use crate::services::node::{self, NodeError};
use crate::services::sandbox::{self, SandboxError, SandboxView};
use crate::state::{AppState, Position};

/// Window inside which repeated sandbox/node requests from the same
/// caller for the same resource collapse into one.
const REQUEST_DEDUP_WINDOW_MS: u64 = 5000;

fn dedup_window() -> Duration {
    Duration::from_millis(REQUEST_DEDUP_WINDOW_MS)
}

// =============================================================================
// SANDBOX
// =============================================================================

#[derive(Deserialize)]
pub struct CreateSandboxBody {
    pub title: Option<String>,
}

/// `POST /api/projects/:id/sandbox` — schedule sandbox provisioning.
pub async fn create_sandbox(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(project_id): Path<Uuid>,
    Json(body): Json<CreateSandboxBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let title = body.title.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let key = dedup_key(user_id, project_id);
    if state.dedup.accept(&key, dedup_window()).is_duplicate() {
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "creating", "deduplicated": true })),
        ));
    }

    // A rejected request never scheduled anything; evict the key so a
    // corrected retry is not answered as a duplicate.
    if let Err(err) = sandbox::create(&state, project_id, title, user_id).await {
        state.dedup.forget(&key);
        return Err(sandbox_error_to_status(err));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "creating", "deduplicated": false })),
    ))
}

/// `POST /api/projects/:id/sandbox/retry` — re-provision a failed or
/// stopped sandbox.
pub async fn retry_sandbox(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let key = dedup_key(user_id, project_id);
    if state.dedup.accept(&key, dedup_window()).is_duplicate() {
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "creating", "deduplicated": true })),
        ));
    }

    if let Err(err) = sandbox::retry(&state, project_id, user_id).await {
        state.dedup.forget(&key);
        return Err(sandbox_error_to_status(err));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "creating", "deduplicated": false })),
    ))
}

/// `GET /api/projects/:id/sandbox` — merged persisted + live status.
pub async fn sandbox_status(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<Json<SandboxView>, StatusCode> {
    let view = sandbox::status(&state, project_id, user_id)
        .await
        .map_err(sandbox_error_to_status)?;
    Ok(Json(view))
}

/// `POST /api/projects/:id/sandbox/stop` — graceful shutdown.
pub async fn stop_sandbox(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(project_id): Path<Uuid>,
) -> Result<Json<SandboxView>, StatusCode> {
    let view = sandbox::stop(&state, project_id, user_id)
        .await
        .map_err(sandbox_error_to_status)?;
    Ok(Json(view))
}

pub(crate) fn sandbox_error_to_status(err: SandboxError) -> StatusCode {
    match err {
        SandboxError::ProjectNotFound(_) | SandboxError::SandboxNotFound(_) => StatusCode::NOT_FOUND,
        SandboxError::Unauthorized(_) => StatusCode::FORBIDDEN,
        SandboxError::InvalidState { .. } => StatusCode::CONFLICT,
        SandboxError::Provider(_) => StatusCode::BAD_GATEWAY,
    }
}

// =============================================================================
// NODES
// =============================================================================

#[derive(Deserialize)]
pub struct CreateNodeBody {
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub data: Option<serde_json::Value>,
    pub style: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct UpdatePositionBody {
    pub x: f64,
    pub y: f64,
}

/// `POST /api/projects/:id/nodes` — create a canvas node.
///
/// Duplicate submissions of the same kind for the same project inside the
/// dedup window are collapsed: the client's ensure-style retries must not
/// spawn extra nodes.
pub async fn create_node(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(project_id): Path<Uuid>,
    Json(body): Json<CreateNodeBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let key = dedup_key(user_id, format!("{project_id}:{}", body.kind));
    if state.dedup.accept(&key, dedup_window()).is_duplicate() {
        return Ok((StatusCode::OK, Json(serde_json::json!({ "deduplicated": true }))));
    }

    let position = Position { x: body.x, y: body.y };
    let result = node::create_node(
        &state,
        project_id,
        user_id,
        &body.kind,
        position,
        body.data.unwrap_or_else(|| serde_json::json!({})),
        body.style.unwrap_or_else(|| serde_json::json!({})),
    )
    .await;
    let node = match result {
        Ok(node) => node,
        Err(err) => {
            state.dedup.forget(&key);
            return Err(node_error_to_status(err));
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "node": node, "deduplicated": false })),
    ))
}

/// `PATCH /api/projects/:id/nodes/:node_id/position` — move a node.
pub async fn update_node_position(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdatePositionBody>,
) -> Result<Json<crate::state::Node>, StatusCode> {
    let node = node::update_position(&state, project_id, user_id, node_id, Position { x: body.x, y: body.y })
        .await
        .map_err(node_error_to_status)?;
    Ok(Json(node))
}

pub(crate) fn node_error_to_status(err: NodeError) -> StatusCode {
    match err {
        NodeError::ProjectNotFound(_) | NodeError::NodeNotFound(_) => StatusCode::NOT_FOUND,
        NodeError::Unauthorized(_) => StatusCode::FORBIDDEN,
        NodeError::InvalidPosition { .. } | NodeError::MissingKind => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
#[path = "projects_test.rs"]
mod tests;
