//! Sandbox lifecycle — create, retry, stop, and status.
//!
//! DESIGN
//! ======
//! `create` and `retry` are fire-and-forget: they validate, mark the
//! sandbox `creating`, and submit the provisioning call as a background
//! job before returning. The job's outcome (`created` + preview URL, or
//! `failed` + error message) is persisted and broadcast; it is never
//! raised to whoever scheduled it. `status` and `stop` are the synchronous
//! read/shutdown paths and do surface errors to the caller.
//!
//! ERROR HANDLING
//! ==============
//! Authorization and state checks happen before any mutation. Provider
//! failures on the async path become persisted `failed` state; on the
//! sync paths they map to a gateway-style failure and leave the cached
//! status where it was.

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{BroadcastEvent, EventKind};
use crate::provider::ProviderError;
use crate::state::{AppState, SandboxRecord, SandboxStatus};

use super::emit_project_event;
use super::persistence::persist_sandbox_fire_and_forget;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("project not found: {0}")]
    ProjectNotFound(Uuid),
    #[error("project {0} has no sandbox")]
    SandboxNotFound(Uuid),
    #[error("caller does not own project {0}")]
    Unauthorized(Uuid),
    #[error("sandbox is {} and cannot be re-provisioned", .status.as_str())]
    InvalidState { status: SandboxStatus },
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Merged persisted + live view returned by the synchronous read path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxView {
    pub project_id: Uuid,
    pub sandbox_id: Option<String>,
    pub status: SandboxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn view(project_id: Uuid, record: &SandboxRecord) -> SandboxView {
    SandboxView {
        project_id,
        sandbox_id: record.sandbox_id.clone(),
        status: record.status,
        preview_url: record.preview_url.clone(),
        error_message: record.error_message.clone(),
    }
}

fn status_payload(record: &SandboxRecord) -> serde_json::Value {
    serde_json::json!({
        "status": record.status,
        "previewUrl": record.preview_url,
        "errorMessage": record.error_message,
    })
}

// =============================================================================
// CREATE / RETRY
// =============================================================================

/// Schedule provisioning of a new sandbox for a project.
///
/// Returns as soon as the job is submitted; the eventual outcome is
/// observable only via [`status`] or a `status_update` broadcast. The
/// returned handle exists for tests and shutdown, not for the request
/// path.
///
/// # Errors
///
/// Returns `ProjectNotFound`/`Unauthorized` before any state change, or
/// `InvalidState` if a sandbox is already provisioning or running.
pub async fn create(
    state: &AppState,
    project_id: Uuid,
    title: &str,
    owner_id: Uuid,
) -> Result<JoinHandle<()>, SandboxError> {
    schedule_provision(state, project_id, Some(title), owner_id, false).await
}

/// Re-provision a sandbox that ended up `failed` or `stopped`.
///
/// Identical contract to [`create`], reusing the project's stored title;
/// the only difference is that a sandbox record must already exist and be
/// in a retryable state.
///
/// # Errors
///
/// Same as [`create`], plus `SandboxNotFound` when the project never had
/// a sandbox.
pub async fn retry(state: &AppState, project_id: Uuid, owner_id: Uuid) -> Result<JoinHandle<()>, SandboxError> {
    schedule_provision(state, project_id, None, owner_id, true).await
}

async fn schedule_provision(
    state: &AppState,
    project_id: Uuid,
    title: Option<&str>,
    owner_id: Uuid,
    require_existing: bool,
) -> Result<JoinHandle<()>, SandboxError> {
    let title = {
        let mut projects = state.projects.write().await;
        let project = projects
            .get_mut(&project_id)
            .ok_or(SandboxError::ProjectNotFound(project_id))?;
        if project.project.owner_id != owner_id {
            return Err(SandboxError::Unauthorized(project_id));
        }

        match &project.sandbox {
            None if require_existing => return Err(SandboxError::SandboxNotFound(project_id)),
            None => {}
            Some(record) if record.can_reprovision() => {}
            Some(record) => return Err(SandboxError::InvalidState { status: record.status }),
        }

        project.sandbox = Some(SandboxRecord::creating());
        title.map_or_else(|| project.project.title.clone(), ToOwned::to_owned)
    };
    persist_sandbox_fire_and_forget(state, project_id);
    info!(%project_id, %owner_id, "sandbox provisioning scheduled");

    let job_state = state.clone();
    let handle = state
        .jobs
        .submit("sandbox-provision", async move {
            provision(&job_state, project_id, &title, owner_id).await;
        });
    Ok(handle)
}

impl SandboxRecord {
    /// A record can be re-provisioned from the explicit retry edge only.
    fn can_reprovision(&self) -> bool {
        self.status.can_retry()
    }
}

/// Background provisioning body. Never fails: the outcome is captured
/// into the sandbox record either way.
async fn provision(state: &AppState, project_id: Uuid, title: &str, owner_id: Uuid) {
    let result = state.provider.create(title).await;

    let record = {
        let mut projects = state.projects.write().await;
        let Some(project) = projects.get_mut(&project_id) else {
            // Project evicted while provisioning; nothing to record.
            warn!(%project_id, "provisioning finished for unknown project");
            return;
        };

        let record = match result {
            Ok(provisioned) => {
                info!(%project_id, sandbox_id = %provisioned.sandbox_id, "sandbox provisioned");
                SandboxRecord {
                    sandbox_id: Some(provisioned.sandbox_id),
                    status: SandboxStatus::Created,
                    preview_url: Some(provisioned.preview_url),
                    error_message: None,
                }
            }
            Err(e) => {
                warn!(%project_id, error = %e, "sandbox provisioning failed");
                SandboxRecord {
                    sandbox_id: None,
                    status: SandboxStatus::Failed,
                    preview_url: None,
                    error_message: Some(e.to_string()),
                }
            }
        };
        project.sandbox = Some(record.clone());
        record
    };

    persist_sandbox_fire_and_forget(state, project_id);
    let event = BroadcastEvent::new(EventKind::StatusUpdate, project_id, status_payload(&record)).with_user(owner_id);
    emit_project_event(state, project_id, owner_id, &event).await;
}

// =============================================================================
// STATUS
// =============================================================================

/// How long provider polls are coalesced on the status read path.
const STATUS_POLL_WINDOW_MS: u64 = 1000;

/// Return the merged persisted + live sandbox view.
///
/// Queries the provider for live status and folds the answer into the
/// cached record. Polls within a one-second window per project are
/// coalesced: duplicates serve the cached view without touching the
/// provider.
///
/// # Errors
///
/// `ProjectNotFound`/`SandboxNotFound` when there is nothing to report,
/// `Unauthorized` for non-owners, `Provider` when the live poll fails.
pub async fn status(state: &AppState, project_id: Uuid, owner_id: Uuid) -> Result<SandboxView, SandboxError> {
    let (sandbox_id, cached) = {
        let projects = state.projects.read().await;
        let project = projects
            .get(&project_id)
            .ok_or(SandboxError::ProjectNotFound(project_id))?;
        if project.project.owner_id != owner_id {
            return Err(SandboxError::Unauthorized(project_id));
        }
        let record = project
            .sandbox
            .as_ref()
            .ok_or(SandboxError::SandboxNotFound(project_id))?;
        (record.sandbox_id.clone(), view(project_id, record))
    };

    // No provider-side identity yet (first provisioning still in flight):
    // the cache is all there is.
    let Some(sandbox_id) = sandbox_id else {
        return Ok(cached);
    };

    let poll_key = crate::dedup::dedup_key("status-poll", project_id);
    let window = std::time::Duration::from_millis(STATUS_POLL_WINDOW_MS);
    if state.dedup.accept(&poll_key, window).is_duplicate() {
        return Ok(cached);
    }

    let probe = state.provider.status(&sandbox_id).await?;

    let mut projects = state.projects.write().await;
    let project = projects
        .get_mut(&project_id)
        .ok_or(SandboxError::ProjectNotFound(project_id))?;
    let record = project
        .sandbox
        .as_mut()
        .ok_or(SandboxError::SandboxNotFound(project_id))?;

    let changed = record.status != probe.status
        || (probe.preview_url.is_some() && record.preview_url != probe.preview_url);
    record.status = probe.status;
    if probe.preview_url.is_some() {
        record.preview_url = probe.preview_url;
    }
    record.error_message = probe.error;
    let merged = view(project_id, record);
    drop(projects);

    if changed {
        persist_sandbox_fire_and_forget(state, project_id);
    }
    Ok(merged)
}

// =============================================================================
// STOP
// =============================================================================

/// Gracefully shut down a project's sandbox.
///
/// Persists `stopped` and broadcasts a `status_update` to the project
/// room and the owner's user room. Stopping an already-stopped sandbox is
/// a no-op returning the current view.
///
/// # Errors
///
/// `ProjectNotFound`/`SandboxNotFound`/`Unauthorized` before any state
/// change; `Provider` if the shutdown call fails (the cached status is
/// restored).
pub async fn stop(state: &AppState, project_id: Uuid, owner_id: Uuid) -> Result<SandboxView, SandboxError> {
    let (sandbox_id, previous) = {
        let mut projects = state.projects.write().await;
        let project = projects
            .get_mut(&project_id)
            .ok_or(SandboxError::ProjectNotFound(project_id))?;
        if project.project.owner_id != owner_id {
            return Err(SandboxError::Unauthorized(project_id));
        }
        let record = project
            .sandbox
            .as_mut()
            .ok_or(SandboxError::SandboxNotFound(project_id))?;
        let Some(sandbox_id) = record.sandbox_id.clone() else {
            return Err(SandboxError::SandboxNotFound(project_id));
        };
        if record.status == SandboxStatus::Stopped {
            return Ok(view(project_id, record));
        }

        let previous = record.status;
        record.status = SandboxStatus::Stopping;
        (sandbox_id, previous)
    };

    let stop_result = state.provider.stop(&sandbox_id).await;

    let record = {
        let mut projects = state.projects.write().await;
        let project = projects
            .get_mut(&project_id)
            .ok_or(SandboxError::ProjectNotFound(project_id))?;
        let record = project
            .sandbox
            .as_mut()
            .ok_or(SandboxError::SandboxNotFound(project_id))?;

        if let Err(e) = stop_result {
            record.status = previous;
            return Err(e.into());
        }
        record.status = SandboxStatus::Stopped;
        record.clone()
    };

    persist_sandbox_fire_and_forget(state, project_id);
    info!(%project_id, "sandbox stopped");

    let event = BroadcastEvent::new(EventKind::StatusUpdate, project_id, status_payload(&record)).with_user(owner_id);
    emit_project_event(state, project_id, owner_id, &event).await;

    Ok(view(project_id, &record))
}

#[cfg(test)]
#[path = "sandbox_test.rs"]
mod tests;
