//! TCP front end: one command per connection.
//!
//! Each accepted connection is read until `|END` (or EOF), parsed, applied
//! to the [`TaskTable`], answered with one terminated frame, and closed.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use taskline_proto::codec::{self, Frame, FrameAccumulator};
use taskline_proto::command::Command;

use crate::table::{REPLY_ERR, TaskTable};

/// Default cap on the size of one request (64 KiB).
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// State shared by every connection.
#[derive(Debug)]
pub struct PeerState {
    /// The task table.
    pub table: TaskTable,
    max_request_size: usize,
}

impl Default for PeerState {
    fn default() -> Self {
        Self::new(TaskTable::new())
    }
}

impl PeerState {
    /// Wraps `table` with the default request size cap.
    #[must_use]
    pub const fn new(table: TaskTable) -> Self {
        Self {
            table,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }

    /// Overrides the request size cap.
    #[must_use]
    pub const fn with_max_request_size(mut self, max_request_size: usize) -> Self {
        self.max_request_size = max_request_size;
        self
    }
}

/// Starts a peer with an empty in-memory table.
///
/// # Errors
///
/// Returns an error if the listener cannot bind to `addr`.
pub async fn start_server(addr: &str) -> io::Result<(SocketAddr, JoinHandle<()>)> {
    start_server_with_state(addr, Arc::new(PeerState::default())).await
}

/// Starts a peer serving `state` and returns the bound address and the
/// accept loop's join handle.
///
/// # Errors
///
/// Returns an error if the listener cannot bind to `addr`.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<PeerState>,
) -> io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;
    let handle = tokio::spawn(accept_loop(listener, state));
    Ok((bound_addr, handle))
}

async fn accept_loop(listener: TcpListener, state: Arc<PeerState>) {
    loop {
        match listener.accept().await {
            Ok((socket, remote)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, &state).await {
                        tracing::debug!(%remote, error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "accept failed"),
        }
    }
}

async fn handle_connection(mut socket: TcpStream, state: &PeerState) -> io::Result<()> {
    let request = read_request(&mut socket, state.max_request_size).await?;
    if !request.terminated {
        tracing::warn!(bytes = request.payload.len(), "request ended without terminator");
    }

    let reply = match Command::parse(&request.payload) {
        Ok(command) => {
            tracing::debug!(verb = command.verb(), "applying command");
            state.table.apply(&command)
        }
        Err(e) => {
            tracing::warn!(error = %e, request = %request.payload, "rejected request");
            REPLY_ERR.to_string()
        }
    };

    socket.write_all(codec::frame(&reply).as_bytes()).await?;
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream, max: usize) -> io::Result<Frame> {
    let mut acc = FrameAccumulator::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(acc.finish());
        }
        if let Some(frame) = acc.push(&chunk[..n]) {
            return Ok(frame);
        }
        if acc.buffered() > max {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request exceeds {max} bytes"),
            ));
        }
    }
}
