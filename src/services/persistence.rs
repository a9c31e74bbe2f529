//! Persistence service — background flush for dirty nodes and
//! fire-and-forget sandbox writes.
//!
//! DESIGN
//! ======
//! Node mutations only touch memory on the hot path; a background task
//! flushes dirty nodes, then sleeps before the next cycle. Sandbox
//! transitions are persisted by spawned writes so neither the request
//! path nor the provisioning job blocks on Postgres I/O.
//!
//! ERROR HANDLING
//! ==============
//! Dirty flags are cleared only after successful writes, and only for the
//! revision that was snapshotted. Repeated upserts are acceptable, silent
//! data loss is not.

use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::state::{AppState, Node, Position, ProjectRecord, ProjectState, SandboxRecord, SandboxStatus};

const DEFAULT_NODE_FLUSH_INTERVAL_MS: u64 = 200;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// BACKGROUND FLUSH
// =============================================================================

/// Spawn the background node-flush task. Returns a handle for shutdown.
pub fn spawn_persistence_task(state: AppState) -> JoinHandle<()> {
    let flush_interval_ms = env_parse("NODE_FLUSH_INTERVAL_MS", DEFAULT_NODE_FLUSH_INTERVAL_MS);
    info!(flush_interval_ms, "node persistence flush configured");
    tokio::spawn(async move {
        loop {
            flush_all_dirty(&state).await;
            tokio::time::sleep(Duration::from_millis(flush_interval_ms)).await;
        }
    })
}

#[derive(Debug)]
struct DirtyFlushBatch {
    project_id: Uuid,
    nodes: Vec<Node>,
    flushed_revs: Vec<(Uuid, i64)>,
}

async fn flush_all_dirty(state: &AppState) {
    // Snapshot dirty nodes under the lock, then perform I/O lock-free.
    let batches = {
        let projects = state.projects.read().await;
        let mut collected = Vec::new();

        for (project_id, project) in projects.iter() {
            if project.dirty.is_empty() {
                continue;
            }
            let nodes = project
                .dirty
                .iter()
                .filter_map(|id| project.nodes.get(id).cloned())
                .collect::<Vec<_>>();
            if nodes.is_empty() {
                continue;
            }
            let revs = nodes.iter().map(|n| (n.id, n.rev)).collect::<Vec<_>>();
            collected.push(DirtyFlushBatch { project_id: *project_id, nodes, flushed_revs: revs });
        }
        collected
    };

    for batch in batches {
        match flush_nodes(&state.pool, &batch.nodes).await {
            Ok(()) => {
                clear_flushed_dirty_ids(state, batch.project_id, &batch.flushed_revs).await;
            }
            Err(e) => {
                error!(error = %e, count = batch.nodes.len(), project_id = %batch.project_id, "node flush failed");
            }
        }
    }
}

#[cfg(test)]
pub(crate) async fn flush_all_dirty_for_tests(state: &AppState) {
    flush_all_dirty(state).await;
}

async fn clear_flushed_dirty_ids(state: &AppState, project_id: Uuid, flushed_revs: &[(Uuid, i64)]) {
    let mut projects = state.projects.write().await;
    let Some(project) = projects.get_mut(&project_id) else {
        return;
    };

    for (node_id, flushed_rev) in flushed_revs {
        // EDGE: keep the dirty flag if the node was edited again after the
        // snapshot was taken.
        let can_clear = match project.nodes.get(node_id) {
            Some(current) => current.rev == *flushed_rev,
            None => true,
        };
        if can_clear {
            project.dirty.remove(node_id);
        }
    }
}

/// Batch upsert nodes to Postgres.
pub async fn flush_nodes(pool: &PgPool, nodes: &[Node]) -> Result<(), sqlx::Error> {
    for node in nodes {
        sqlx::query(
            "INSERT INTO nodes (id, project_id, owner_id, kind, x, y, data, style, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now()) \
             ON CONFLICT (id) DO UPDATE SET \
                 x = EXCLUDED.x, y = EXCLUDED.y, data = EXCLUDED.data, \
                 style = EXCLUDED.style, updated_at = now()",
        )
        .bind(node.id)
        .bind(node.project_id)
        .bind(node.owner_id)
        .bind(&node.kind)
        .bind(node.position.x)
        .bind(node.position.y)
        .bind(&node.data)
        .bind(&node.style)
        .execute(pool)
        .await?;
    }
    Ok(())
}

// =============================================================================
// SANDBOX WRITES
// =============================================================================

/// Spawn a fire-and-forget task persisting a project's sandbox columns.
pub fn persist_sandbox_fire_and_forget(state: &AppState, project_id: Uuid) {
    let state = state.clone();
    tokio::spawn(async move {
        let record = {
            let projects = state.projects.read().await;
            let Some(project) = projects.get(&project_id) else {
                return;
            };
            project.sandbox.clone()
        };
        if let Err(e) = persist_sandbox(&state.pool, project_id, record.as_ref()).await {
            warn!(error = %e, %project_id, "sandbox persist failed");
        }
    });
}

/// Write the sandbox columns for one project row.
pub async fn persist_sandbox(
    pool: &PgPool,
    project_id: Uuid,
    record: Option<&SandboxRecord>,
) -> Result<(), sqlx::Error> {
    let (sandbox_id, status, preview_url, error_message) = match record {
        Some(r) => (
            r.sandbox_id.clone(),
            Some(r.status.as_str()),
            r.preview_url.clone(),
            r.error_message.clone(),
        ),
        None => (None, None, None, None),
    };

    sqlx::query(
        "UPDATE projects SET sandbox_id = $2, sandbox_status = $3, preview_url = $4, \
         sandbox_error = $5, updated_at = now() WHERE id = $1",
    )
    .bind(project_id)
    .bind(sandbox_id)
    .bind(status)
    .bind(preview_url)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

// =============================================================================
// HYDRATION
// =============================================================================

/// Load every project (and its nodes) from Postgres into the live map.
/// Runs once at startup.
///
/// # Errors
///
/// Returns a database error if either query fails.
pub async fn hydrate_projects(state: &AppState) -> Result<usize, sqlx::Error> {
    let project_rows = sqlx::query_as::<_, (Uuid, Uuid, String, Option<String>, Option<String>, Option<String>, Option<String>)>(
        "SELECT id, owner_id, title, sandbox_id, sandbox_status, preview_url, sandbox_error FROM projects",
    )
    .fetch_all(&state.pool)
    .await?;

    let node_rows = sqlx::query_as::<_, (Uuid, Uuid, Uuid, String, f64, f64, serde_json::Value, serde_json::Value)>(
        "SELECT id, project_id, owner_id, kind, x, y, data, style FROM nodes",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut projects = state.projects.write().await;
    for (id, owner_id, title, sandbox_id, status, preview_url, error_message) in project_rows {
        let sandbox = status.and_then(|s| parse_status(&s)).map(|status| SandboxRecord {
            sandbox_id,
            status,
            preview_url,
            error_message,
        });
        let mut project = ProjectState::new(ProjectRecord { id, owner_id, title });
        project.sandbox = sandbox;
        projects.insert(id, project);
    }

    for (id, project_id, owner_id, kind, x, y, data, style) in node_rows {
        if let Some(project) = projects.get_mut(&project_id) {
            project.nodes.insert(
                id,
                Node { id, project_id, owner_id, kind, position: Position { x, y }, data, style, rev: 1 },
            );
        }
    }

    let count = projects.len();
    info!(count, "hydrated projects from database");
    Ok(count)
}

fn parse_status(s: &str) -> Option<SandboxStatus> {
    serde_json::from_value(serde_json::Value::String(s.to_owned())).ok()
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
