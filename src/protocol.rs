//! Protocol — line grammar validation and request dispatch.
//!
//! DESIGN
//! ======
//! Handler functions are pure protocol logic: they validate one inbound
//! line, call the board service, and return an `Outcome`. The connection
//! task owns all outbound concerns — writing reply lines and closing the
//! socket — so handlers never touch I/O and tests can exercise the full
//! request table without a socket.
//!
//! GRAMMAR
//! =======
//! Tokens are separated by single spaces; every token is a NAME, one or
//! more of `[A-Za-z0-9.]`. Requests, by first token:
//!
//! ```text
//! boards
//! newBoard <board>
//! switch <user> <oldBoard> <newBoard>
//! exit <user>
//! draw <board> <op> <arg>...          (at least one arg)
//! checkAndAddUser <user> <board>
//! users <board>
//! ```
//!
//! A line that does not match is dropped: no response, no state change.
//! A matching line that names an unknown board is dropped the same way —
//! the response grammar has no error shape, and blowing up the connection
//! (what a naive lookup would do) punishes every other request on it.

use tracing::warn;

use crate::command::Command;
use crate::services::board::{self, BoardError};
use crate::state::Registry;

// =============================================================================
// TYPES
// =============================================================================

/// What the connection task should do with one handled request.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Send one line back to the requesting connection.
    Reply(String),
    /// Send several lines back (switch header plus replayed draw lines).
    Replay(Vec<String>),
    /// Send one line back, then close the connection.
    Close(String),
    /// Drop the request silently.
    Ignore,
}

/// Per-connection protocol state. The handler holds no board-scoped state
/// between lines; the only thing a connection remembers is which username
/// it successfully registered, so the name can be released on disconnect.
#[derive(Debug, Default)]
pub struct Session {
    pub username: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Validate one inbound line and dispatch it to the board service.
pub async fn handle_request(registry: &Registry, session: &mut Session, line: &str) -> Outcome {
    let tokens: Vec<&str> = line.split(' ').collect();
    if !tokens.iter().all(|tok| is_name(tok)) {
        warn!(%line, "dropping malformed request");
        return Outcome::Ignore;
    }

    let outcome = match (tokens[0], tokens.len()) {
        ("boards", 1) => boards(registry).await,
        ("newBoard", 2) => new_board(registry, tokens[1]).await,
        ("switch", 4) => switch(registry, tokens[1], tokens[2], tokens[3]).await,
        ("exit", 2) => exit(registry, session, tokens[1]).await,
        ("draw", n) if n >= 4 => draw(registry, line).await,
        ("checkAndAddUser", 3) => check_and_add_user(registry, session, tokens[1], tokens[2]).await,
        ("users", 2) => users(registry, tokens[1]).await,
        _ => {
            warn!(%line, "dropping malformed request");
            Ok(Outcome::Ignore)
        }
    };

    match outcome {
        Ok(outcome) => outcome,
        Err(BoardError::NotFound(name)) => {
            warn!(board = %name, %line, "dropping request for unknown board");
            Outcome::Ignore
        }
    }
}

fn is_name(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.')
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn boards(registry: &Registry) -> Result<Outcome, BoardError> {
    let names = board::list_boards(registry).await;
    Ok(Outcome::Reply(join_response("boards", &names)))
}

async fn new_board(registry: &Registry, name: &str) -> Result<Outcome, BoardError> {
    let created = board::create_board(registry, name).await;
    Ok(Outcome::Reply(format!("newBoard {name} {created}")))
}

async fn switch(
    registry: &Registry,
    username: &str,
    old_board: &str,
    new_board: &str,
) -> Result<Outcome, BoardError> {
    let replay = board::switch_board(registry, username, old_board, new_board).await?;
    let mut lines = Vec::with_capacity(replay.len() + 1);
    lines.push(format!("switch {username} {old_board} {new_board}"));
    lines.extend(replay.iter().map(Command::encode));
    Ok(Outcome::Replay(lines))
}

async fn exit(registry: &Registry, session: &mut Session, username: &str) -> Result<Outcome, BoardError> {
    board::remove_user_everywhere(registry, username).await;
    if session.username.as_deref() == Some(username) {
        session.username = None;
    }
    Ok(Outcome::Close(format!("exit {username}")))
}

async fn draw(registry: &Registry, line: &str) -> Result<Outcome, BoardError> {
    // Grammar already guaranteed the draw shape; a decode failure here
    // would be a dispatch bug, so it is dropped like any malformed line.
    let Ok(cmd) = Command::decode(line) else {
        warn!(%line, "dropping undecodable draw request");
        return Ok(Outcome::Ignore);
    };
    board::record_and_broadcast(registry, cmd).await?;
    // Lightweight ack; the encoded operation reaches the requester through
    // the broadcast channel like everyone else.
    Ok(Outcome::Reply("draw".to_owned()))
}

async fn check_and_add_user(
    registry: &Registry,
    session: &mut Session,
    username: &str,
    board_name: &str,
) -> Result<Outcome, BoardError> {
    let added = board::check_and_add_user(registry, username, board_name).await?;
    if added {
        session.username = Some(username.to_owned());
    }
    Ok(Outcome::Reply(format!("checkAndAddUser {username} {board_name} {added}")))
}

async fn users(registry: &Registry, board_name: &str) -> Result<Outcome, BoardError> {
    let users = board::list_users(registry, board_name).await?;
    Ok(Outcome::Reply(join_response(&format!("users {board_name}"), &users)))
}

fn join_response(prefix: &str, names: &[String]) -> String {
    if names.is_empty() {
        return prefix.to_owned();
    }
    format!("{prefix} {}", names.join(" "))
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
