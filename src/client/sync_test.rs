use super::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::event::EventKind;

// =============================================================================
// DOUBLES
// =============================================================================

enum Script {
    /// Connect attempt fails.
    Fail,
    /// Connect succeeds; the connection yields these events then is lost.
    Events(Vec<BroadcastEvent>),
    /// Connect succeeds; the connection yields these events then hangs.
    Hold(Vec<BroadcastEvent>),
}

struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    joins: Arc<Mutex<Vec<RoomKey>>>,
    attempts: AtomicUsize,
}

impl ScriptedTransport {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            joins: Arc::new(Mutex::new(Vec::new())),
            attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    async fn connect(&self) -> Result<Box<dyn SyncConnection>, SyncError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Events(events)) => Ok(Box::new(ScriptedConnection {
                events: events.into(),
                hold: false,
                joins: Arc::clone(&self.joins),
            })),
            Some(Script::Hold(events)) => Ok(Box::new(ScriptedConnection {
                events: events.into(),
                hold: true,
                joins: Arc::clone(&self.joins),
            })),
            Some(Script::Fail) | None => Err(SyncError::Connect("scripted failure".into())),
        }
    }
}

struct ScriptedConnection {
    events: VecDeque<BroadcastEvent>,
    hold: bool,
    joins: Arc<Mutex<Vec<RoomKey>>>,
}

#[async_trait]
impl SyncConnection for ScriptedConnection {
    async fn join(&mut self, room: RoomKey) -> Result<(), SyncError> {
        self.joins.lock().unwrap().push(room);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<BroadcastEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.hold {
            std::future::pending::<()>().await;
        }
        None
    }
}

struct RecordingHandler {
    connects: AtomicUsize,
    events: Mutex<Vec<BroadcastEvent>>,
}

impl RecordingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self { connects: AtomicUsize::new(0), events: Mutex::new(Vec::new()) })
    }
}

impl SyncHandler for RecordingHandler {
    fn on_connected(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_event(&self, event: BroadcastEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn event(project_id: Uuid) -> BroadcastEvent {
    BroadcastEvent::new(EventKind::StatusUpdate, project_id, serde_json::json!({}))
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn joins_rooms_and_relays_events() {
    let user_id = Uuid::new_v4();
    let project_id = Uuid::new_v4();
    let transport = ScriptedTransport::new(vec![Script::Events(vec![event(project_id), event(project_id)])]);
    let handler = RecordingHandler::new();
    let config = SyncConfig { max_attempts: 1, ..SyncConfig::default() };

    let agent = SyncAgent::spawn(transport.clone(), config, user_id, Some(project_id), handler.clone());
    agent.task.await.expect("agent loop finishes");

    assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
    assert_eq!(handler.events.lock().unwrap().len(), 2);

    let joins = transport.joins.lock().unwrap();
    assert_eq!(*joins, vec![RoomKey::User(user_id), RoomKey::Project(project_id)]);
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_connection_loss() {
    let user_id = Uuid::new_v4();
    let project_id = Uuid::new_v4();
    let transport = ScriptedTransport::new(vec![
        Script::Events(vec![event(project_id)]),
        Script::Events(vec![event(project_id)]),
    ]);
    let handler = RecordingHandler::new();
    let config = SyncConfig { max_attempts: 1, ..SyncConfig::default() };

    let agent = SyncAgent::spawn(transport.clone(), config, user_id, Some(project_id), handler.clone());
    agent.task.await.expect("agent loop finishes");

    // The second connect rejoined rooms and re-fired the hook.
    assert_eq!(handler.connects.load(Ordering::SeqCst), 2);
    assert_eq!(handler.events.lock().unwrap().len(), 2);
    assert_eq!(transport.joins.lock().unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_resets_on_success() {
    let user_id = Uuid::new_v4();
    let transport = ScriptedTransport::new(vec![Script::Fail, Script::Fail, Script::Events(vec![])]);
    let handler = RecordingHandler::new();
    let config = SyncConfig { max_attempts: 3, ..SyncConfig::default() };

    let agent = SyncAgent::spawn(transport.clone(), config, user_id, None, handler.clone());
    let mut state = agent.state();
    agent.task.await.expect("agent loop finishes");

    // Two failures, then a success that reset the counter, then the
    // post-success failures exhausted the budget.
    assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 6);
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let user_id = Uuid::new_v4();
    let transport = ScriptedTransport::new(vec![Script::Fail, Script::Fail, Script::Fail]);
    let handler = RecordingHandler::new();
    let config = SyncConfig { max_attempts: 3, ..SyncConfig::default() };

    let agent = SyncAgent::spawn(transport.clone(), config, user_id, None, handler.clone());
    let mut state = agent.state();
    agent.task.await.expect("agent loop finishes");

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(handler.connects.load(Ordering::SeqCst), 0);
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_callbacks() {
    let user_id = Uuid::new_v4();
    let project_id = Uuid::new_v4();
    let transport = ScriptedTransport::new(vec![Script::Hold(vec![event(project_id)])]);
    let handler = RecordingHandler::new();

    let agent = SyncAgent::spawn(transport, SyncConfig::default(), user_id, None, handler.clone());
    let mut state = agent.state();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .expect("agent reaches connected");
    tokio::task::yield_now().await;

    let before = handler.events.lock().unwrap().len();
    agent.shutdown();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handler.events.lock().unwrap().len(), before);
}
