use super::*;
use crate::state::test_helpers;

#[test]
fn env_parse_falls_back_on_missing_or_garbage() {
    assert_eq!(env_parse("SANDBOARD_TEST_NO_SUCH_VAR", 42u64), 42);
}

#[test]
fn parse_status_round_trips_persisted_strings() {
    assert_eq!(parse_status("creating"), Some(SandboxStatus::Creating));
    assert_eq!(parse_status("failed"), Some(SandboxStatus::Failed));
    assert_eq!(parse_status("bogus"), None);
}

#[tokio::test]
async fn dirty_flag_survives_failed_flush() {
    // The lazy test pool has no live database behind it, so the flush
    // write fails; the dirty flag must be retained for retry.
    let state = test_helpers::test_app_state();
    let owner_id = uuid::Uuid::new_v4();
    let project_id = test_helpers::seed_project(&state, owner_id).await;

    let node = test_helpers::dummy_node(project_id, owner_id);
    {
        let mut projects = state.projects.write().await;
        let project = projects.get_mut(&project_id).unwrap();
        project.dirty.insert(node.id);
        project.nodes.insert(node.id, node.clone());
    }

    flush_all_dirty_for_tests(&state).await;

    let projects = state.projects.read().await;
    assert!(projects[&project_id].dirty.contains(&node.id));
}

#[tokio::test]
async fn clear_flushed_keeps_newer_revisions_dirty() {
    let state = test_helpers::test_app_state();
    let owner_id = uuid::Uuid::new_v4();
    let project_id = test_helpers::seed_project(&state, owner_id).await;

    let mut node = test_helpers::dummy_node(project_id, owner_id);
    node.rev = 1;
    let snapshot = vec![(node.id, 1i64)];
    {
        let mut projects = state.projects.write().await;
        let project = projects.get_mut(&project_id).unwrap();
        project.dirty.insert(node.id);
        // Node edited again after the snapshot was taken.
        node.rev = 2;
        project.nodes.insert(node.id, node.clone());
    }

    clear_flushed_dirty_ids(&state, project_id, &snapshot).await;

    let projects = state.projects.read().await;
    assert!(projects[&project_id].dirty.contains(&node.id));
}

#[tokio::test]
async fn clear_flushed_drops_matching_revisions() {
    let state = test_helpers::test_app_state();
    let owner_id = uuid::Uuid::new_v4();
    let project_id = test_helpers::seed_project(&state, owner_id).await;

    let node = test_helpers::dummy_node(project_id, owner_id);
    let snapshot = vec![(node.id, node.rev)];
    {
        let mut projects = state.projects.write().await;
        let project = projects.get_mut(&project_id).unwrap();
        project.dirty.insert(node.id);
        project.nodes.insert(node.id, node.clone());
    }

    clear_flushed_dirty_ids(&state, project_id, &snapshot).await;

    let projects = state.projects.read().await;
    assert!(projects[&project_id].dirty.is_empty());
}

#[tokio::test]
#[ignore = "flush_nodes hits Postgres via sqlx::query"]
async fn flush_nodes_writes_rows() {
    let state = test_helpers::test_app_state();
    let node = test_helpers::dummy_node(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
    let _ = flush_nodes(&state.pool, &[node]).await;
}
