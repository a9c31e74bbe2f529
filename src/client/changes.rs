//! Local change cache — canvas edits awaiting upload.
//!
//! DESIGN
//! ======
//! Edits made while offline (or while a flush is pending) are staged here
//! as per-node drafts. Staging the same node twice merges field-by-field:
//! a later position does not clobber earlier data or style edits.
//! Listeners register against one project and are notified synchronously
//! whenever that project gains changes, outside the cache lock so a
//! listener may call back into the cache.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::state::Position;

// =============================================================================
// TYPES
// =============================================================================

/// Pending edits for one node. `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct NodeDraft {
    pub position: Option<Position>,
    pub data: Option<serde_json::Value>,
    pub style: Option<serde_json::Value>,
}

impl NodeDraft {
    fn merge(&mut self, other: NodeDraft) {
        if other.position.is_some() {
            self.position = other.position;
        }
        if other.data.is_some() {
            self.data = other.data;
        }
        if other.style.is_some() {
            self.style = other.style;
        }
    }
}

/// Callback invoked with a project ID when that project gains changes.
pub type ChangeListener = Arc<dyn Fn(Uuid) + Send + Sync>;

struct Inner {
    /// Drafts keyed by (project, node).
    drafts: HashMap<(Uuid, Uuid), NodeDraft>,
    /// Projects with at least one staged draft.
    dirty: HashSet<Uuid>,
    /// Listeners keyed by token, each bound to one project.
    listeners: HashMap<u64, (Uuid, ChangeListener)>,
    next_listener: u64,
}

// =============================================================================
// CACHE
// =============================================================================

/// Thread-safe store of unsynced canvas edits.
#[derive(Default)]
pub struct LocalChangeCache {
    inner: Mutex<Inner>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            drafts: HashMap::new(),
            dirty: HashSet::new(),
            listeners: HashMap::new(),
            next_listener: 0,
        }
    }
}

impl LocalChangeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a position edit for a node.
    pub fn stage_position(&self, project_id: Uuid, node_id: Uuid, position: Position) {
        self.stage(project_id, node_id, NodeDraft { position: Some(position), ..NodeDraft::default() });
    }

    /// Stage a data edit for a node.
    pub fn stage_data(&self, project_id: Uuid, node_id: Uuid, data: serde_json::Value) {
        self.stage(project_id, node_id, NodeDraft { data: Some(data), ..NodeDraft::default() });
    }

    /// Stage a style edit for a node.
    pub fn stage_style(&self, project_id: Uuid, node_id: Uuid, style: serde_json::Value) {
        self.stage(project_id, node_id, NodeDraft { style: Some(style), ..NodeDraft::default() });
    }

    fn stage(&self, project_id: Uuid, node_id: Uuid, draft: NodeDraft) {
        let listeners: Vec<ChangeListener> = {
            let mut inner = self.lock();
            inner
                .drafts
                .entry((project_id, node_id))
                .or_default()
                .merge(draft);
            inner.dirty.insert(project_id);
            inner
                .listeners
                .values()
                .filter(|(watched, _)| *watched == project_id)
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };
        for listener in listeners {
            listener(project_id);
        }
    }

    /// Whether a project has staged edits.
    #[must_use]
    pub fn has_changes(&self, project_id: Uuid) -> bool {
        self.lock().dirty.contains(&project_id)
    }

    /// Remove and return all staged drafts for a project. The project is
    /// clean afterwards; callers own pushing the drafts upstream.
    #[must_use]
    pub fn drain(&self, project_id: Uuid) -> Vec<(Uuid, NodeDraft)> {
        let mut inner = self.lock();
        inner.dirty.remove(&project_id);
        let keys: Vec<(Uuid, Uuid)> = inner
            .drafts
            .keys()
            .filter(|(p, _)| *p == project_id)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| inner.drafts.remove(&key).map(|draft| (key.1, draft)))
            .collect()
    }

    /// Discard all staged drafts for a project without uploading.
    pub fn clear(&self, project_id: Uuid) {
        let mut inner = self.lock();
        inner.dirty.remove(&project_id);
        inner.drafts.retain(|(p, _), _| *p != project_id);
    }

    /// Register a listener called whenever `project_id` gains changes.
    /// Edits to other projects do not fire it. Returns a token for
    /// [`Self::unsubscribe`].
    pub fn subscribe(&self, project_id: Uuid, listener: ChangeListener) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.insert(id, (project_id, listener));
        id
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, token: u64) {
        self.lock().listeners.remove(&token);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "changes_test.rs"]
mod tests;
