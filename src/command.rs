//! Command — the universal wire record for draw operations.
//!
//! ARCHITECTURE
//! ============
//! Every drawing edit travels as a Command: the client encodes one per edit
//! gesture, the server appends it to the target board's log and relays the
//! encoded line to every live connection, and a switch replays a board's
//! whole log as encoded lines. The server never interprets `op_name` or
//! `args` — it stores and forwards them opaquely.
//!
//! DESIGN
//! ======
//! - Immutable value type: constructed once, cloned by value into logs and
//!   broadcasts, never mutated.
//! - Wire form is `draw <board> <op> <arg>...`, single-space separated,
//!   no trailing space.
//! - Equality is structural (board, op, args), used by tests — the log is
//!   never deduplicated or compacted.

use std::fmt;

// =============================================================================
// TYPES
// =============================================================================

/// Codec failure for an inbound draw line.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("not a draw line: first token is `{0}`")]
    NotDraw(String),
    #[error("draw line needs a board name and an operation name")]
    TooShort,
}

/// One immutable drawing instruction bound to a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub board_name: String,
    pub op_name: String,
    pub args: Vec<String>,
}

// =============================================================================
// CODEC
// =============================================================================

impl Command {
    #[must_use]
    pub fn new(board_name: &str, op_name: &str, args: Vec<String>) -> Self {
        Self { board_name: board_name.to_owned(), op_name: op_name.to_owned(), args }
    }

    /// Parse a wire line of the form `draw <board> <op> <arg>...`.
    ///
    /// # Errors
    ///
    /// Returns `NotDraw` if the first token is not `draw`, and `TooShort`
    /// if the board or operation name is missing.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let mut tokens = line.split(' ');
        match tokens.next() {
            Some("draw") => {}
            Some(other) => return Err(DecodeError::NotDraw(other.to_owned())),
            None => return Err(DecodeError::TooShort),
        }
        let Some(board_name) = tokens.next() else {
            return Err(DecodeError::TooShort);
        };
        let Some(op_name) = tokens.next() else {
            return Err(DecodeError::TooShort);
        };
        let args = tokens.map(str::to_owned).collect();
        Ok(Self::new(board_name, op_name, args))
    }

    /// Canonical wire form, suitable for broadcast and replay.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut line = format!("draw {} {}", self.board_name, self.op_name);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
#[path = "command_test.rs"]
mod tests;
