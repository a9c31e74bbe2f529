//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the HTTP operation surface and the websocket endpoint under a
//! single Axum router. Authentication itself lives upstream; by the time
//! a request reaches these routes the caller's identity arrives in the
//! `x-user-id` header and project ownership is the only check applied.

pub mod projects;
pub mod ws;

use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/projects/{id}/sandbox", get(projects::sandbox_status).post(projects::create_sandbox))
        .route("/api/projects/{id}/sandbox/retry", post(projects::retry_sandbox))
        .route("/api/projects/{id}/sandbox/stop", post(projects::stop_sandbox))
        .route("/api/projects/{id}/nodes", post(projects::create_node))
        .route("/api/projects/{id}/nodes/{node_id}/position", patch(projects::update_node_position))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// CALLER IDENTITY
// =============================================================================

/// Caller identity extracted from the `x-user-id` header set by the
/// upstream auth layer.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Uuid);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get("x-user-id") else {
            return Err((StatusCode::UNAUTHORIZED, "x-user-id required"));
        };
        let user_id = value
            .to_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "invalid x-user-id"))?;
        Ok(Self(user_id))
    }
}
