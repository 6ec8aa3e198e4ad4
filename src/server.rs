//! Server — listener loop and per-connection tasks.
//!
//! LIFECYCLE
//! =========
//! 1. Accept → register an outbound channel with the registry, spawn a task
//! 2. Task loops `select!`: inbound request lines vs broadcast lines
//! 3. EOF, I/O error, `exit`, or registry shutdown → leave the loop
//! 4. Cleanup: unregister the connection, release the session's username
//!
//! One task per connection, alive until the peer disconnects. Tasks block
//! only on socket reads and channel receives, never on CPU-bound work, so
//! the unbounded task count is an accepted scalability limit rather than a
//! hazard. Broadcast lines arrive on a bounded channel (256); a connection
//! that cannot drain it loses broadcasts rather than stalling the sender.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::protocol::{self, Outcome, Session};
use crate::services;
use crate::state::Registry;

/// Capacity of each connection's broadcast channel.
const BROADCAST_BUFFER: usize = 256;

// =============================================================================
// LISTENER
// =============================================================================

/// Accept connections forever, one spawned task each.
///
/// # Errors
///
/// Returns the accept error if the listening socket fails — the only error
/// class that stops the server. Per-connection failures never reach here.
pub async fn serve(listener: TcpListener, registry: Arc<Registry>) -> io::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            info!(%addr, "client connected");
            run_connection(socket, &registry).await;
            info!(%addr, "client disconnected");
        });
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Drive one client connection until EOF, I/O error, `exit`, or shutdown.
async fn run_connection(socket: TcpStream, registry: &Registry) {
    let (tx, mut rx) = mpsc::channel::<String>(BROADCAST_BUFFER);
    let conn_id = registry.register_connection(tx).await;

    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut session = Session::new();

    'conn: loop {
        tokio::select! {
            read = lines.next_line() => {
                let line = match read {
                    Ok(Some(line)) => line,
                    // EOF, or the peer reset; either way this connection is done.
                    Ok(None) => break 'conn,
                    Err(e) => {
                        warn!(%conn_id, error = %e, "read failed");
                        break 'conn;
                    }
                };
                match protocol::handle_request(registry, &mut session, &line).await {
                    Outcome::Reply(reply) => {
                        if write_line(&mut write_half, &reply).await.is_err() {
                            break 'conn;
                        }
                    }
                    Outcome::Replay(replies) => {
                        for reply in &replies {
                            if write_line(&mut write_half, reply).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Outcome::Close(reply) => {
                        let _ = write_line(&mut write_half, &reply).await;
                        break 'conn;
                    }
                    Outcome::Ignore => {}
                }
            }
            broadcast = rx.recv() => {
                match broadcast {
                    Some(line) => {
                        if write_line(&mut write_half, &line).await.is_err() {
                            break 'conn;
                        }
                    }
                    // Registry shutdown dropped our sender.
                    None => break 'conn,
                }
            }
        }
    }

    registry.unregister_connection(conn_id).await;
    if let Some(username) = session.username.take() {
        services::board::remove_user_everywhere(registry, &username).await;
        info!(%conn_id, user = %username, "released username on disconnect");
    }
}

async fn write_line(write_half: &mut OwnedWriteHalf, line: &str) -> io::Result<()> {
    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
