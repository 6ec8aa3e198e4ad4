//! Shared server state — boards and live connections.
//!
//! DESIGN
//! ======
//! `Registry` is the single owned root of all shared mutable state, passed
//! by `Arc` into every connection task — never a global. It holds:
//! - the board map (`RwLock`): board name → `Arc<Board>`,
//! - the connection map (`RwLock`): connection id → outbound line channel,
//! - the membership mutex, serializing every cross-board username change so
//!   the scan-all-boards-then-insert of registration is one critical section.
//!
//! Each `Board` is its own monitor: one `Mutex` guards the operation log and
//! the user set together, so different boards never contend. Locks are held
//! only across map/log/set mutation, never across socket I/O.
//!
//! LOCK ORDER
//! ==========
//! membership → board map → board state → connection map. No path acquires
//! in the reverse direction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, RwLock, mpsc};
use uuid::Uuid;

use crate::command::Command;

// =============================================================================
// BOARD
// =============================================================================

/// Everything a board owns, guarded together by the board's monitor.
#[derive(Debug, Default)]
pub struct BoardState {
    /// Append-only operation log; replaying from index 0 reconstructs the
    /// board's current visual state.
    ops: Vec<Command>,
    /// Usernames currently viewing this board.
    users: HashSet<String>,
}

impl BoardState {
    /// Append one operation to the end of the log. Validation happens at the
    /// protocol layer; the log accepts anything.
    pub fn append(&mut self, cmd: Command) {
        self.ops.push(cmd);
    }

    /// Defensive copy of the full log in insertion order, for replay.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Command> {
        self.ops.clone()
    }

    pub fn add_user(&mut self, username: &str) {
        self.users.insert(username.to_owned());
    }

    /// Removing an absent user is a no-op, not an error.
    pub fn remove_user(&mut self, username: &str) {
        self.users.remove(username);
    }

    #[must_use]
    pub fn username_available(&self, username: &str) -> bool {
        !self.users.contains(username)
    }

    /// Current users, order unspecified.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        self.users.iter().cloned().collect()
    }

    #[must_use]
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }
}

/// A named shared drawing surface. The inner mutex is the board's monitor:
/// at most one mutation or snapshot proceeds at a time per board.
#[derive(Debug, Default)]
pub struct Board {
    state: Mutex<BoardState>,
}

impl Board {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the board's monitor. Callers compose multi-step operations
    /// (add user + snapshot, append + broadcast) under one acquisition.
    pub async fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().await
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Server-owned root state: the board map plus every live connection.
pub struct Registry {
    /// Board name → board. Names are immutable once created; boards are
    /// never renamed or deleted.
    pub boards: RwLock<HashMap<String, Arc<Board>>>,
    /// Connection id → outbound line channel, used for broadcast.
    pub connections: RwLock<HashMap<Uuid, mpsc::Sender<String>>>,
    /// Serializes cross-board username membership changes (registration,
    /// switch, removal) so global uniqueness checks are race-free.
    pub membership: Mutex<()>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            membership: Mutex::new(()),
        }
    }

    /// Track a new connection's outbound channel under a fresh id.
    pub async fn register_connection(&self, tx: mpsc::Sender<String>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.connections.write().await.insert(conn_id, tx);
        conn_id
    }

    /// Stop tracking a connection. Safe to call after shutdown already
    /// dropped it.
    pub async fn unregister_connection(&self, conn_id: Uuid) {
        self.connections.write().await.remove(&conn_id);
    }

    /// Drop every tracked connection channel. Each connection task observes
    /// its channel closing and terminates its loop.
    pub async fn shutdown(&self) {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        tracing::info!(closed = count, "registry shut down");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
