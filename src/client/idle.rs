//! Idle monitor — stop a running sandbox after a quiet period.
//!
//! DESIGN
//! ======
//! The monitor arms itself only while the observed sandbox status is
//! `started`. User activity resets the countdown; when the timeout
//! elapses with no activity the stop callback fires exactly once and the
//! monitor disarms until `started` is observed again. Observing any other
//! status disarms without firing, so a sandbox stopped elsewhere never
//! triggers a redundant shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use crate::state::SandboxStatus;

/// Default quiet period before the sandbox is stopped.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// How often the countdown is checked.
const TICK: Duration = Duration::from_secs(1);

struct Inner {
    armed: bool,
    fired: bool,
    last_activity: Instant,
    timeout: Duration,
}

/// Watches one project's sandbox for inactivity.
pub struct IdleTimeoutMonitor {
    inner: Arc<Mutex<Inner>>,
    task: JoinHandle<()>,
}

impl IdleTimeoutMonitor {
    /// Start a monitor with an explicit timeout. The callback runs on the
    /// monitor's tick task; keep it cheap and hand real work to a channel.
    pub fn new(timeout: Duration, on_idle: Arc<dyn Fn() + Send + Sync>) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            armed: false,
            fired: false,
            last_activity: Instant::now(),
            timeout,
        }));

        let tick_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            loop {
                ticker.tick().await;
                let fire = {
                    let mut state = tick_inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    if state.armed && !state.fired && state.last_activity.elapsed() >= state.timeout {
                        state.fired = true;
                        state.armed = false;
                        true
                    } else {
                        false
                    }
                };
                if fire {
                    info!("idle timeout reached, stopping sandbox");
                    on_idle();
                }
            }
        });

        Self { inner, task }
    }

    /// Start a monitor with the timeout from `IDLE_TIMEOUT_SECS` (seconds,
    /// default 10 minutes).
    pub fn from_env(on_idle: Arc<dyn Fn() + Send + Sync>) -> Self {
        let secs = std::env::var("IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        Self::new(Duration::from_secs(secs), on_idle)
    }

    /// Record user activity, pushing the deadline out.
    pub fn activity(&self) {
        let mut state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.last_activity = Instant::now();
    }

    /// Feed the latest observed sandbox status. `started` arms the
    /// countdown; anything else disarms it.
    pub fn observe_status(&self, status: SandboxStatus) {
        let mut state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if status == SandboxStatus::Started {
            if !state.armed {
                state.armed = true;
                state.fired = false;
                state.last_activity = Instant::now();
            }
        } else {
            state.armed = false;
        }
    }

    /// Whether the countdown is currently running.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .armed
    }

    /// Stop the monitor. The callback never fires after this returns.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "idle_test.rs"]
mod tests;
