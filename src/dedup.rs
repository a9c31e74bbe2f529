//! In-memory request deduplication.
//!
//! DESIGN
//! ======
//! A time-windowed map of `{subjectId}-{resourceId}` keys to last-seen
//! timestamps. A key seen again within its window is reported as a
//! duplicate without side effects; otherwise the timestamp is refreshed.
//! Stale entries (older than twice the window) are swept on access to
//! bound memory.
//!
//! TRADE-OFFS
//! ==========
//! This is a heuristic, not a lock: two requests landing in the same
//! instant can both proceed. Callers must keep the downstream operation
//! idempotent rather than rely on at-most-one execution.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// =============================================================================
// TYPES
// =============================================================================

/// Outcome of [`Deduplicator::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// First sighting within the window: caller should run the operation.
    Proceed,
    /// Same key seen inside the window: caller should short-circuit.
    Duplicate,
}

impl Acceptance {
    #[must_use]
    pub fn is_duplicate(self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Build the canonical `{subjectId}-{resourceId}` dedup key.
pub fn dedup_key(subject: impl Display, resource: impl Display) -> String {
    format!("{subject}-{resource}")
}

// =============================================================================
// DEDUPLICATOR
// =============================================================================

/// Time-windowed duplicate suppression. Clone shares the same map.
#[derive(Clone, Default)]
pub struct Deduplicator {
    inner: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `key` was seen within `window`, recording this
    /// sighting if not.
    pub fn accept(&self, key: &str, window: Duration) -> Acceptance {
        self.accept_at(key, window, Instant::now())
    }

    /// Internal: accept with explicit timestamp (for testing).
    fn accept_at(&self, key: &str, window: Duration, now: Instant) -> Acceptance {
        let mut entries = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Sweep entries past twice the window so the map stays bounded.
        entries.retain(|_, last_seen| now.duration_since(*last_seen) < window * 2);

        if let Some(last_seen) = entries.get(key) {
            if now.duration_since(*last_seen) < window {
                return Acceptance::Duplicate;
            }
        }

        entries.insert(key.to_owned(), now);
        Acceptance::Proceed
    }

    /// Drop a key so the next sighting proceeds immediately. Callers use
    /// this when the operation behind the key was rejected and never ran:
    /// a corrective retry must not be answered as a duplicate.
    pub fn forget(&self, key: &str) {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }

    /// Number of retained entries. Test observability only.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "dedup_test.rs"]
mod tests;
