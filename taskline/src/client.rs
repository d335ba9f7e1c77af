//! One-shot command exchange with the remote peer.
//!
//! Each call to [`CommandClient::execute`] opens a fresh connection, writes
//! one command, reads one terminated response, and closes the connection.
//! Nothing is pooled and nothing is retried here; retry policy belongs to
//! the sync engine.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use taskline_proto::codec::{Frame, FrameAccumulator};
use taskline_proto::command::Command;

/// Default bound on establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 4096;

/// Failure to complete a command exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The connection was not established within the connect timeout.
    #[error("connecting to {addr} timed out after {timeout:?}")]
    Timeout {
        /// Peer address.
        addr: String,
        /// Bound that was exceeded.
        timeout: Duration,
    },
    /// The peer actively refused the connection.
    #[error("connection to {addr} refused")]
    Refused {
        /// Peer address.
        addr: String,
    },
    /// The connection was reset or aborted mid-exchange.
    #[error("connection to {addr} reset")]
    Reset {
        /// Peer address.
        addr: String,
    },
    /// Any other I/O failure.
    #[error("I/O error talking to {addr}: {message}")]
    Io {
        /// Peer address.
        addr: String,
        /// Kind of the underlying error.
        kind: io::ErrorKind,
        /// Rendered underlying error.
        message: String,
    },
}

impl ConnectionError {
    /// Classifies an I/O error raised while talking to `addr`.
    #[must_use]
    pub fn from_io(addr: &str, err: &io::Error) -> Self {
        let addr = addr.to_string();
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused { addr },
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::Reset { addr },
            kind => Self::Io {
                addr,
                kind,
                message: err.to_string(),
            },
        }
    }
}

/// Sends one command and returns the peer's decoded response payload.
///
/// Implemented by [`TcpCommandClient`] for real peers; tests supply
/// scripted implementations.
pub trait CommandClient: Send + Sync + 'static {
    /// Performs one complete exchange for `command`.
    fn execute(
        &self,
        command: &Command,
    ) -> impl std::future::Future<Output = Result<String, ConnectionError>> + Send;
}

/// [`CommandClient`] over plain TCP, one connection per command.
#[derive(Debug, Clone)]
pub struct TcpCommandClient {
    addr: String,
    connect_timeout: Duration,
}

impl TcpCommandClient {
    /// Creates a client for `addr` (`host:port`) with the default timeout.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Overrides the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Peer address this client talks to.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<TcpStream, ConnectionError> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ConnectionError::from_io(&self.addr, &e)),
            Err(_) => Err(ConnectionError::Timeout {
                addr: self.addr.clone(),
                timeout: self.connect_timeout,
            }),
        }
    }
}

impl CommandClient for TcpCommandClient {
    async fn execute(&self, command: &Command) -> Result<String, ConnectionError> {
        let mut stream = self.connect().await?;
        tracing::debug!(addr = %self.addr, verb = command.verb(), "sending command");

        let result = exchange(&mut stream, &command.encode()).await;
        // Close on every path; a failed shutdown changes nothing for the caller.
        let _ = stream.shutdown().await;

        let frame = result.map_err(|e| {
            let err = ConnectionError::from_io(&self.addr, &e);
            tracing::warn!(addr = %self.addr, verb = command.verb(), error = %err, "command exchange failed");
            err
        })?;
        if !frame.terminated {
            tracing::warn!(
                addr = %self.addr,
                verb = command.verb(),
                bytes = frame.payload.len(),
                "response ended without terminator; using partial payload"
            );
        }
        Ok(frame.payload)
    }
}

/// Writes `line` and reads back one frame.
async fn exchange<S>(stream: &mut S, line: &str) -> io::Result<Frame>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(line.as_bytes()).await?;
    stream.flush().await?;
    read_frame(stream).await
}

/// Reads from `reader` until a terminator arrives or the stream ends.
///
/// End of stream is not an error: the partial payload comes back with
/// [`Frame::terminated`] unset.
///
/// # Errors
///
/// Propagates read errors from `reader`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut acc = FrameAccumulator::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(acc.finish());
        }
        if let Some(frame) = acc.push(&chunk[..n]) {
            return Ok(frame);
        }
    }
}
