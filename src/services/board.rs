//! Board service — registry operations and broadcast.
//!
//! DESIGN
//! ======
//! Free functions over `&Registry`; every function acquires the locks it
//! needs and releases them before returning, never across socket I/O.
//! Board handles are cloned out of the map (`Arc`) so the map lock is not
//! held while a board's monitor is entered.
//!
//! Cross-board username changes (register, switch, remove) run under the
//! registry's membership mutex: the availability scan over every board and
//! the subsequent insert form one critical section, so two simultaneous
//! registrations of the same name cannot both observe "available".
//!
//! ERROR HANDLING
//! ==============
//! A grammar-valid request naming an absent board is `BoardError::NotFound`;
//! the protocol layer decides what (not) to answer. Duplicate board names
//! and duplicate usernames are ordinary `false` results, not errors.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::command::Command;
use crate::state::{Board, Registry};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("board not found: {0}")]
    NotFound(String),
}

// =============================================================================
// BOARD LIFECYCLE
// =============================================================================

/// Create a new empty board. Returns whether the name was free; the
/// check-then-insert is atomic under the map's write lock, so concurrent
/// creations of the same name yield exactly one `true`.
pub async fn create_board(registry: &Registry, name: &str) -> bool {
    let mut boards = registry.boards.write().await;
    if boards.contains_key(name) {
        return false;
    }
    boards.insert(name.to_owned(), Arc::new(Board::new()));
    info!(board = %name, "board created");
    true
}

/// All registered board names, arbitrary order.
pub async fn list_boards(registry: &Registry) -> Vec<String> {
    registry.boards.read().await.keys().cloned().collect()
}

/// Usernames currently viewing `board_name`, arbitrary order.
///
/// # Errors
///
/// Returns `NotFound` if no board has that name.
pub async fn list_users(registry: &Registry, board_name: &str) -> Result<Vec<String>, BoardError> {
    let board = lookup(registry, board_name).await?;
    let users = board.lock().await.users();
    Ok(users)
}

// =============================================================================
// USER MEMBERSHIP
// =============================================================================

/// Register `username` on `board_name` iff the name is absent from every
/// board's user set. One atomic critical section under the membership mutex.
///
/// # Errors
///
/// Returns `NotFound` if the target board does not exist.
pub async fn check_and_add_user(
    registry: &Registry,
    username: &str,
    board_name: &str,
) -> Result<bool, BoardError> {
    let _membership = registry.membership.lock().await;

    let target = lookup(registry, board_name).await?;
    for (_, board) in all_boards(registry).await {
        if !board.lock().await.username_available(username) {
            return Ok(false);
        }
    }

    target.lock().await.add_user(username);
    info!(user = %username, board = %board_name, "user registered");
    Ok(true)
}

/// Move `username` from `old_board` to `new_board` and return the new
/// board's log for replay. The add and the snapshot happen under a single
/// acquisition of the new board's monitor, so an operation appears in the
/// replay iff its append completed before the switch.
///
/// # Errors
///
/// Returns `NotFound` if either board does not exist.
pub async fn switch_board(
    registry: &Registry,
    username: &str,
    old_board: &str,
    new_board: &str,
) -> Result<Vec<Command>, BoardError> {
    let _membership = registry.membership.lock().await;

    let old = lookup(registry, old_board).await?;
    let new = lookup(registry, new_board).await?;

    // Removal completes before the insertion is observable; the name is
    // transiently on no board, never on two.
    old.lock().await.remove_user(username);

    let mut state = new.lock().await;
    state.add_user(username);
    let replay = state.snapshot();
    drop(state);

    info!(user = %username, from = %old_board, to = %new_board, ops = replay.len(), "user switched boards");
    Ok(replay)
}

/// Remove `username` from every board's user set. Idempotent; tolerant of
/// the user being on no board at all.
pub async fn remove_user_everywhere(registry: &Registry, username: &str) {
    let _membership = registry.membership.lock().await;
    for (_, board) in all_boards(registry).await {
        board.lock().await.remove_user(username);
    }
    debug!(user = %username, "user removed from all boards");
}

// =============================================================================
// RECORD + BROADCAST
// =============================================================================

/// Append `cmd` to its board's log and forward the encoded line to every
/// live connection, the requester included. The board monitor is held
/// across the (non-blocking) channel pushes so per-board broadcast order
/// always equals log order.
///
/// # Errors
///
/// Returns `NotFound` if the command names an absent board.
pub async fn record_and_broadcast(registry: &Registry, cmd: Command) -> Result<(), BoardError> {
    let board = lookup(registry, &cmd.board_name).await?;
    let line = cmd.encode();

    let mut state = board.lock().await;
    state.append(cmd);

    let connections = registry.connections.read().await;
    for (conn_id, tx) in connections.iter() {
        // Best-effort per recipient: a full or closed channel is skipped and
        // the peer is reaped by its own connection task.
        if let Err(e) = tx.try_send(line.clone()) {
            warn!(%conn_id, error = %e, "broadcast skipped dead or saturated connection");
        }
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

async fn lookup(registry: &Registry, board_name: &str) -> Result<Arc<Board>, BoardError> {
    registry
        .boards
        .read()
        .await
        .get(board_name)
        .cloned()
        .ok_or_else(|| BoardError::NotFound(board_name.to_owned()))
}

async fn all_boards(registry: &Registry) -> Vec<(String, Arc<Board>)> {
    registry
        .boards
        .read()
        .await
        .iter()
        .map(|(name, board)| (name.clone(), Arc::clone(board)))
        .collect()
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
