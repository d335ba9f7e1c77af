//! Connectivity-aware synchronization between the local store and the peer.
//!
//! The engine is a single tokio task that owns the [`TaskStore`] and the
//! [`PendingQueue`]. Callers talk to it through a cloneable [`SyncHandle`];
//! state changes are published as [`SyncEvent`]s.
//!
//! ```text
//!            Available / Resumed             resync ok
//!  Offline ───────────────────────▶ Syncing ───────────▶ Online
//!     ▲                               │  ▲                  │
//!     │        connection error       │  │  manual refresh  │
//!     ├───────────────────────────────┘  └──────────────────┤
//!     │                  Lost / failed direct call          │
//!     └─────────────────────────────────────────────────────┘
//! ```
//!
//! [`TaskStore`]: crate::store::TaskStore
//! [`PendingQueue`]: crate::queue::PendingQueue

pub mod engine;
pub mod replay;

pub use engine::{SyncHandle, spawn};

use taskline_proto::task::{TaskError, TaskKey};

use crate::client::ConnectionError;

/// Connection state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Peer unreachable; mutations are queued.
    Offline,
    /// A resync cycle is in flight.
    Syncing,
    /// Peer reachable; mutations are sent directly.
    Online,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Syncing => write!(f, "syncing"),
            Self::Online => write!(f, "online"),
        }
    }
}

/// Signal from the host's connectivity source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    /// The network came back.
    Available,
    /// The network went away.
    Lost,
    /// The application returned to the foreground.
    Resumed,
}

/// Failure of one resync cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Replaying a queued mutation failed; the queue was left untouched.
    #[error("replay of queued mutation {index} of {total} failed: {source}")]
    Replay {
        /// Zero-based position of the failing entry.
        index: usize,
        /// Size of the batch being replayed.
        total: usize,
        /// Connection failure.
        source: ConnectionError,
    },
    /// Every queued mutation went through, but fetching the listing failed.
    #[error("fetching full listing failed: {source}")]
    Listing {
        /// Connection failure.
        source: ConnectionError,
    },
}

/// What a resync request ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// The cycle finished and the store now mirrors the peer.
    Completed {
        /// Queued mutations sent before the listing.
        replayed: usize,
        /// Records in the applied snapshot.
        tasks: usize,
    },
    /// Another cycle was already in flight; nothing was started.
    AlreadyRunning,
    /// The signal did not call for a cycle in the current state.
    NotStarted,
    /// The cycle failed and the engine is offline.
    Failed(SyncError),
}

/// Notification published by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The connection state changed.
    StateChanged(SyncState),
    /// The task set changed; carries the new record count.
    TasksChanged {
        /// Records in the store.
        count: usize,
    },
    /// A recoverable problem worth surfacing to the user.
    Error(String),
}

/// Errors returned to callers of [`SyncHandle`] methods.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The task fields were invalid.
    #[error(transparent)]
    Task(#[from] TaskError),
    /// No task with this key exists.
    #[error("task not found: {0}")]
    NotFound(TaskKey),
    /// The engine task has stopped.
    #[error("sync engine is not running")]
    Closed,
}
