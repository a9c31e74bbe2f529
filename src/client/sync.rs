//! Sync agent — reconnecting room subscriber.
//!
//! DESIGN
//! ======
//! The agent owns one logical connection. Each time a transport connect
//! succeeds it rejoins the caller's user room (and the open project room,
//! if any), invokes the handler's `on_connected` hook so the application
//! can re-fetch authoritative state, and then relays events until the
//! connection reports loss. Delivery is at-most-once with no replay:
//! anything emitted while disconnected is gone, which is exactly why
//! `on_connected` exists.
//!
//! Reconnects use a fixed delay and a bounded number of consecutive
//! failed attempts; a successful connect resets the counter. After the
//! budget is exhausted the agent parks in `Disconnected` and stops.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::BroadcastEvent;
use crate::rooms::RoomKey;

// =============================================================================
// TYPES
// =============================================================================

/// Observable lifecycle of the agent's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("join failed for room {0}")]
    Join(String),
}

/// One established connection to the event stream.
#[async_trait]
pub trait SyncConnection: Send {
    /// Subscribe this connection to a room.
    async fn join(&mut self, room: RoomKey) -> Result<(), SyncError>;

    /// Next event from the stream. `None` means the connection is lost.
    async fn next_event(&mut self) -> Option<BroadcastEvent>;
}

/// Factory for connections. One connect attempt per call.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SyncConnection>, SyncError>;
}

/// Application hooks driven by the agent.
pub trait SyncHandler: Send + Sync {
    /// Called after every successful connect, once rooms are rejoined.
    /// Reconnecting clients re-fetch authoritative state here.
    fn on_connected(&self);

    /// Called for every event relayed from the stream.
    fn on_event(&self, event: BroadcastEvent);
}

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub reconnect_delay: Duration,
    /// Consecutive failed connect attempts tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { reconnect_delay: Duration::from_secs(3), max_attempts: 5 }
    }
}

// =============================================================================
// AGENT
// =============================================================================

/// Handle to a running sync agent. Dropping the handle does not stop the
/// agent; call [`SyncAgent::shutdown`].
pub struct SyncAgent {
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SyncAgent {
    /// Spawn the agent's connection loop.
    pub fn spawn(
        transport: Arc<dyn SyncTransport>,
        config: SyncConfig,
        user_id: Uuid,
        project_id: Option<Uuid>,
        handler: Arc<dyn SyncHandler>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let task = tokio::spawn(run(transport, config, user_id, project_id, handler, state_tx));
        Self { state: state_rx, task }
    }

    /// Watch the connection state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the agent. No handler callbacks fire after this returns.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn run(
    transport: Arc<dyn SyncTransport>,
    config: SyncConfig,
    user_id: Uuid,
    project_id: Option<Uuid>,
    handler: Arc<dyn SyncHandler>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let mut failures: u32 = 0;

    loop {
        let _ = state_tx.send(ConnectionState::Connecting);

        let connection = match transport.connect().await {
            Ok(c) => c,
            Err(e) => {
                failures += 1;
                warn!(%user_id, attempt = failures, error = %e, "sync: connect failed");
                let _ = state_tx.send(ConnectionState::Disconnected);
                if failures >= config.max_attempts {
                    warn!(%user_id, "sync: giving up after repeated connect failures");
                    return;
                }
                tokio::time::sleep(config.reconnect_delay).await;
                continue;
            }
        };

        match run_connection(connection, user_id, project_id, &handler, &state_tx).await {
            Ok(()) => {
                failures = 0;
            }
            Err(e) => {
                failures += 1;
                warn!(%user_id, attempt = failures, error = %e, "sync: session setup failed");
            }
        }

        let _ = state_tx.send(ConnectionState::Disconnected);
        if failures >= config.max_attempts {
            warn!(%user_id, "sync: giving up after repeated connect failures");
            return;
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

/// Drive one connection: rejoin rooms, fire the hook, relay events until
/// the stream ends.
async fn run_connection(
    mut connection: Box<dyn SyncConnection>,
    user_id: Uuid,
    project_id: Option<Uuid>,
    handler: &Arc<dyn SyncHandler>,
    state_tx: &watch::Sender<ConnectionState>,
) -> Result<(), SyncError> {
    connection.join(RoomKey::User(user_id)).await?;
    if let Some(project_id) = project_id {
        connection.join(RoomKey::Project(project_id)).await?;
    }

    let _ = state_tx.send(ConnectionState::Connected);
    info!(%user_id, "sync: connected");
    handler.on_connected();

    while let Some(event) = connection.next_event().await {
        handler.on_event(event);
    }
    info!(%user_id, "sync: connection lost");
    Ok(())
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
