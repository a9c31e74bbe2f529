use super::*;
use uuid::Uuid;

const WINDOW: Duration = Duration::from_millis(5000);

#[test]
fn first_sighting_proceeds() {
    let dedup = Deduplicator::new();
    let now = Instant::now();
    assert_eq!(dedup.accept_at("a-b", WINDOW, now), Acceptance::Proceed);
}

#[test]
fn second_sighting_within_window_is_duplicate() {
    let dedup = Deduplicator::new();
    let now = Instant::now();

    assert_eq!(dedup.accept_at("a-b", WINDOW, now), Acceptance::Proceed);
    let later = now + Duration::from_millis(200);
    assert_eq!(dedup.accept_at("a-b", WINDOW, later), Acceptance::Duplicate);
    assert!(dedup.accept_at("a-b", WINDOW, later).is_duplicate());
}

#[test]
fn sighting_after_window_proceeds_again() {
    let dedup = Deduplicator::new();
    let now = Instant::now();

    dedup.accept_at("a-b", WINDOW, now);
    let after_window = now + WINDOW + Duration::from_millis(1);
    assert_eq!(dedup.accept_at("a-b", WINDOW, after_window), Acceptance::Proceed);
}

#[test]
fn duplicate_does_not_extend_the_window() {
    let dedup = Deduplicator::new();
    let now = Instant::now();

    dedup.accept_at("a-b", WINDOW, now);
    // Duplicate midway through the window must not refresh last-seen.
    let midway = now + Duration::from_millis(3000);
    assert_eq!(dedup.accept_at("a-b", WINDOW, midway), Acceptance::Duplicate);
    let after_original_window = now + WINDOW + Duration::from_millis(1);
    assert_eq!(dedup.accept_at("a-b", WINDOW, after_original_window), Acceptance::Proceed);
}

#[test]
fn stale_entries_are_swept_on_access() {
    let dedup = Deduplicator::new();
    let now = Instant::now();

    dedup.accept_at("a-b", WINDOW, now);
    dedup.accept_at("c-d", WINDOW, now);
    assert_eq!(dedup.len(), 2);

    // Any accept past 2x the window evicts both stale entries.
    let past_retention = now + WINDOW * 2 + Duration::from_millis(1);
    assert_eq!(dedup.accept_at("a-b", WINDOW, past_retention), Acceptance::Proceed);
    assert_eq!(dedup.len(), 1);
}

#[test]
fn distinct_keys_do_not_interfere() {
    let dedup = Deduplicator::new();
    let now = Instant::now();

    assert_eq!(dedup.accept_at("a-b", WINDOW, now), Acceptance::Proceed);
    assert_eq!(dedup.accept_at("a-c", WINDOW, now), Acceptance::Proceed);
    assert_eq!(dedup.accept_at("a-b", WINDOW, now), Acceptance::Duplicate);
}

#[test]
fn windows_are_caller_chosen_per_call() {
    let dedup = Deduplicator::new();
    let now = Instant::now();
    let short = Duration::from_millis(1000);

    dedup.accept_at("scan", short, now);
    let later = now + Duration::from_millis(1500);
    assert_eq!(dedup.accept_at("scan", short, later), Acceptance::Proceed);
}

#[test]
fn forget_reopens_the_key_immediately() {
    let dedup = Deduplicator::new();
    let now = Instant::now();

    dedup.accept_at("a-b", WINDOW, now);
    dedup.forget("a-b");
    let soon = now + Duration::from_millis(200);
    assert_eq!(dedup.accept_at("a-b", WINDOW, soon), Acceptance::Proceed);
}

#[test]
fn key_shape_is_subject_dash_resource() {
    let user_id = Uuid::new_v4();
    let project_id = Uuid::new_v4();
    assert_eq!(dedup_key(user_id, project_id), format!("{user_id}-{project_id}"));
}
