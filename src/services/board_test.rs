use super::*;
use crate::state::test_helpers::{dummy_command, seed_board, test_registry};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

async fn assert_channel_has_line(rx: &mut mpsc::Receiver<String>) -> String {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("line receive timed out")
        .expect("channel closed")
}

// =============================================================================
// BOARD LIFECYCLE
// =============================================================================

#[tokio::test]
async fn create_board_succeeds_exactly_once_per_name() {
    let registry = test_registry();
    assert!(create_board(&registry, "room").await);
    assert!(!create_board(&registry, "room").await);
    assert!(create_board(&registry, "other").await);
    assert!(!create_board(&registry, "room").await);
}

#[tokio::test]
async fn concurrent_creations_of_same_name_yield_one_winner() {
    let registry = test_registry();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = std::sync::Arc::clone(&registry);
        handles.push(tokio::spawn(async move { create_board(&registry, "contested").await }));
    }
    let mut wins = 0;
    for handle in handles {
        if handle.await.expect("task panicked") {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn list_boards_on_empty_registry_is_empty() {
    let registry = test_registry();
    assert!(list_boards(&registry).await.is_empty());
}

#[tokio::test]
async fn list_boards_returns_all_created_names() {
    let registry = test_registry();
    create_board(&registry, "a").await;
    create_board(&registry, "b").await;
    let mut names = list_boards(&registry).await;
    names.sort();
    assert_eq!(names, vec!["a".to_owned(), "b".to_owned()]);
}

#[tokio::test]
async fn list_users_on_fresh_board_is_empty() {
    let registry = test_registry();
    seed_board(&registry, "room").await;
    assert!(list_users(&registry, "room").await.unwrap().is_empty());
}

#[tokio::test]
async fn list_users_on_unknown_board_is_not_found() {
    let registry = test_registry();
    let err = list_users(&registry, "nowhere").await.unwrap_err();
    assert!(matches!(err, BoardError::NotFound(ref name) if name == "nowhere"));
}

// =============================================================================
// USER MEMBERSHIP
// =============================================================================

#[tokio::test]
async fn username_is_unique_across_boards() {
    let registry = test_registry();
    seed_board(&registry, "b1").await;
    seed_board(&registry, "b2").await;

    assert!(check_and_add_user(&registry, "alice", "b1").await.unwrap());
    assert!(!check_and_add_user(&registry, "alice", "b2").await.unwrap());
    assert!(!check_and_add_user(&registry, "alice", "b1").await.unwrap());

    // A different name is unaffected.
    assert!(check_and_add_user(&registry, "bob", "b2").await.unwrap());
}

#[tokio::test]
async fn exit_frees_the_username_for_reregistration() {
    let registry = test_registry();
    seed_board(&registry, "b1").await;
    seed_board(&registry, "b2").await;

    assert!(check_and_add_user(&registry, "alice", "b1").await.unwrap());
    remove_user_everywhere(&registry, "alice").await;
    assert!(check_and_add_user(&registry, "alice", "b2").await.unwrap());
}

#[tokio::test]
async fn remove_user_everywhere_is_idempotent() {
    let registry = test_registry();
    seed_board(&registry, "b1").await;
    check_and_add_user(&registry, "alice", "b1").await.unwrap();

    remove_user_everywhere(&registry, "alice").await;
    remove_user_everywhere(&registry, "alice").await;
    assert!(list_users(&registry, "b1").await.unwrap().is_empty());
}

#[tokio::test]
async fn check_and_add_user_on_unknown_board_is_not_found() {
    let registry = test_registry();
    let err = check_and_add_user(&registry, "alice", "nowhere").await.unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_registrations_of_same_name_yield_one_winner() {
    const K: usize = 16;
    let registry = test_registry();
    for i in 0..K {
        seed_board(&registry, &format!("board{i}")).await;
    }

    let mut handles = Vec::new();
    for i in 0..K {
        let registry = std::sync::Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            // Randomized scheduling jitter to shake out interleavings.
            let delay = rand::rng().random_range(0..5u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            check_and_add_user(&registry, "dave", &format!("board{i}")).await.unwrap()
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.expect("task panicked") {
            wins += 1;
        }
    }
    assert_eq!(wins, 1, "exactly one of {K} concurrent registrations may win");

    // The winner landed on exactly one board.
    let mut present = 0;
    for i in 0..K {
        if list_users(&registry, &format!("board{i}")).await.unwrap().contains(&"dave".to_owned()) {
            present += 1;
        }
    }
    assert_eq!(present, 1);
}

// =============================================================================
// SWITCH
// =============================================================================

#[tokio::test]
async fn switch_moves_user_and_replays_log_in_order() {
    let registry = test_registry();
    seed_board(&registry, "old").await;
    seed_board(&registry, "new").await;
    check_and_add_user(&registry, "alice", "old").await.unwrap();

    record_and_broadcast(&registry, dummy_command("new", 1)).await.unwrap();
    record_and_broadcast(&registry, dummy_command("new", 2)).await.unwrap();

    let replay = switch_board(&registry, "alice", "old", "new").await.unwrap();
    assert_eq!(replay.len(), 2);
    assert_eq!(replay[0], dummy_command("new", 1));
    assert_eq!(replay[1], dummy_command("new", 2));

    assert!(list_users(&registry, "old").await.unwrap().is_empty());
    assert_eq!(list_users(&registry, "new").await.unwrap(), vec!["alice".to_owned()]);
}

#[tokio::test]
async fn switch_to_same_board_keeps_user_and_replays() {
    let registry = test_registry();
    seed_board(&registry, "room").await;
    check_and_add_user(&registry, "alice", "room").await.unwrap();
    record_and_broadcast(&registry, dummy_command("room", 7)).await.unwrap();

    let replay = switch_board(&registry, "alice", "room", "room").await.unwrap();
    assert_eq!(replay, vec![dummy_command("room", 7)]);
    assert_eq!(list_users(&registry, "room").await.unwrap(), vec!["alice".to_owned()]);
}

#[tokio::test]
async fn switch_with_unknown_board_is_not_found_and_changes_nothing() {
    let registry = test_registry();
    seed_board(&registry, "old").await;
    check_and_add_user(&registry, "alice", "old").await.unwrap();

    let err = switch_board(&registry, "alice", "old", "nowhere").await.unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));
    assert_eq!(list_users(&registry, "old").await.unwrap(), vec!["alice".to_owned()]);
}

// =============================================================================
// RECORD + BROADCAST
// =============================================================================

#[tokio::test]
async fn record_and_broadcast_appends_and_reaches_every_connection() {
    let registry = test_registry();
    seed_board(&registry, "room").await;

    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    registry.register_connection(tx_a).await;
    registry.register_connection(tx_b).await;

    let cmd = dummy_command("room", 1);
    let line = cmd.encode();
    record_and_broadcast(&registry, cmd).await.unwrap();

    assert_eq!(assert_channel_has_line(&mut rx_a).await, line);
    assert_eq!(assert_channel_has_line(&mut rx_b).await, line);
}

#[tokio::test]
async fn broadcast_tolerates_a_dead_recipient() {
    let registry = test_registry();
    seed_board(&registry, "room").await;

    let (tx_dead, rx_dead) = mpsc::channel(8);
    let (tx_live, mut rx_live) = mpsc::channel(8);
    registry.register_connection(tx_dead).await;
    registry.register_connection(tx_live).await;
    drop(rx_dead);

    record_and_broadcast(&registry, dummy_command("room", 1)).await.unwrap();
    let line = assert_channel_has_line(&mut rx_live).await;
    assert!(line.starts_with("draw room drawLineSegment"));
}

#[tokio::test]
async fn record_on_unknown_board_is_not_found_and_sends_nothing() {
    let registry = test_registry();
    let (tx, mut rx) = mpsc::channel(8);
    registry.register_connection(tx).await;

    let err = record_and_broadcast(&registry, dummy_command("nowhere", 1)).await.unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected channel to remain empty"
    );
}

#[tokio::test]
async fn broadcast_order_matches_log_order_per_board() {
    let registry = test_registry();
    seed_board(&registry, "room").await;
    let (tx, mut rx) = mpsc::channel(64);
    registry.register_connection(tx).await;

    for seq in 1..=10 {
        record_and_broadcast(&registry, dummy_command("room", seq)).await.unwrap();
    }
    for seq in 1..=10u32 {
        let line = assert_channel_has_line(&mut rx).await;
        assert_eq!(line, dummy_command("room", seq).encode());
    }
}
