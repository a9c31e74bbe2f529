use super::*;
use crate::event::{BroadcastEvent, EventKind};
use tokio::time::{Duration, timeout};

fn status_event(project_id: Uuid) -> BroadcastEvent {
    BroadcastEvent::new(EventKind::StatusUpdate, project_id, serde_json::json!({"status": "created"}))
}

async fn recv_event(rx: &mut mpsc::Receiver<BroadcastEvent>) -> BroadcastEvent {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("event receive timed out")
        .expect("channel closed")
}

async fn assert_no_event(rx: &mut mpsc::Receiver<BroadcastEvent>) {
    // A closed channel (sender dropped on leave) also means no delivery.
    match timeout(Duration::from_millis(80), rx.recv()).await {
        Err(_) | Ok(None) => {}
        Ok(Some(event)) => panic!("expected no event, got {:?}", event.kind),
    }
}

#[test]
fn room_key_display_and_parse() {
    let id = Uuid::new_v4();
    let project = RoomKey::Project(id);
    let user = RoomKey::User(id);

    assert_eq!(project.to_string(), format!("project-{id}"));
    assert_eq!(user.to_string(), format!("user-{id}"));
    assert_eq!(project.to_string().parse::<RoomKey>().unwrap(), project);
    assert_eq!(user.to_string().parse::<RoomKey>().unwrap(), user);
}

#[test]
fn room_key_parse_rejects_garbage() {
    assert!("project-not-a-uuid".parse::<RoomKey>().is_err());
    assert!("board-123".parse::<RoomKey>().is_err());
    assert!("".parse::<RoomKey>().is_err());
}

#[tokio::test]
async fn emit_on_empty_room_returns_zero() {
    let router = BroadcastRouter::new();
    let project_id = Uuid::new_v4();

    let delivered = router.emit(RoomKey::Project(project_id), &status_event(project_id)).await;
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn emit_reaches_every_member() {
    let router = BroadcastRouter::new();
    let project_id = Uuid::new_v4();
    let room = RoomKey::Project(project_id);

    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    router.join(room, Uuid::new_v4(), tx_a).await;
    router.join(room, Uuid::new_v4(), tx_b).await;

    let delivered = router.emit(room, &status_event(project_id)).await;
    assert_eq!(delivered, 2);

    assert_eq!(recv_event(&mut rx_a).await.kind, EventKind::StatusUpdate);
    assert_eq!(recv_event(&mut rx_b).await.kind, EventKind::StatusUpdate);
}

#[tokio::test]
async fn join_is_idempotent() {
    let router = BroadcastRouter::new();
    let room = RoomKey::User(Uuid::new_v4());
    let conn_id = Uuid::new_v4();

    let (tx, _rx) = mpsc::channel(8);
    router.join(room, conn_id, tx.clone()).await;
    router.join(room, conn_id, tx).await;

    assert_eq!(router.room_size(room).await, 1);
}

#[tokio::test]
async fn events_are_not_queued_for_absent_members() {
    let router = BroadcastRouter::new();
    let project_id = Uuid::new_v4();
    let room = RoomKey::Project(project_id);

    // Emit before anyone joins.
    router.emit(room, &status_event(project_id)).await;

    let (tx, mut rx) = mpsc::channel(8);
    router.join(room, Uuid::new_v4(), tx).await;
    assert_no_event(&mut rx).await;
}

#[tokio::test]
async fn leave_stops_delivery() {
    let router = BroadcastRouter::new();
    let project_id = Uuid::new_v4();
    let room = RoomKey::Project(project_id);
    let conn_id = Uuid::new_v4();

    let (tx, mut rx) = mpsc::channel(8);
    router.join(room, conn_id, tx).await;
    router.leave(room, conn_id).await;

    assert_eq!(router.emit(room, &status_event(project_id)).await, 0);
    assert_no_event(&mut rx).await;
    assert_eq!(router.room_size(room).await, 0);
}

#[tokio::test]
async fn leave_all_removes_from_every_room() {
    let router = BroadcastRouter::new();
    let conn_id = Uuid::new_v4();
    let project_room = RoomKey::Project(Uuid::new_v4());
    let user_room = RoomKey::User(Uuid::new_v4());

    let (tx, _rx) = mpsc::channel(8);
    router.join(project_room, conn_id, tx.clone()).await;
    router.join(user_room, conn_id, tx).await;

    router.leave_all(conn_id).await;
    assert_eq!(router.room_size(project_room).await, 0);
    assert_eq!(router.room_size(user_room).await, 0);
}

#[tokio::test]
async fn full_member_channel_is_skipped_not_fatal() {
    let router = BroadcastRouter::new();
    let project_id = Uuid::new_v4();
    let room = RoomKey::Project(project_id);

    // Capacity 1: the second emit overflows this member.
    let (tx_full, _rx_full) = mpsc::channel(1);
    let (tx_ok, mut rx_ok) = mpsc::channel(8);
    router.join(room, Uuid::new_v4(), tx_full).await;
    router.join(room, Uuid::new_v4(), tx_ok).await;

    assert_eq!(router.emit(room, &status_event(project_id)).await, 2);
    let delivered = router.emit(room, &status_event(project_id)).await;
    assert_eq!(delivered, 1);

    assert_eq!(recv_event(&mut rx_ok).await.project_id, project_id);
    assert_eq!(recv_event(&mut rx_ok).await.project_id, project_id);
}

#[tokio::test]
async fn per_room_delivery_preserves_emission_order() {
    let router = BroadcastRouter::new();
    let project_id = Uuid::new_v4();
    let room = RoomKey::Project(project_id);

    let (tx, mut rx) = mpsc::channel(8);
    router.join(room, Uuid::new_v4(), tx).await;

    for i in 0..4 {
        let event = BroadcastEvent::new(EventKind::NodeCreated, project_id, serde_json::json!({"seq": i}));
        router.emit(room, &event).await;
    }

    for i in 0..4 {
        let event = recv_event(&mut rx).await;
        assert_eq!(event.payload["seq"], i);
    }
}
