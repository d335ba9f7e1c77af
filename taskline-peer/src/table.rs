//! The peer's authoritative task table.
//!
//! Records are keyed by (name, day) the same way the client keys them.
//! `ADD` and `UPDATE` both upsert; `DELETE` of an unknown key is a no-op.
//! When a state file is configured the whole table is rewritten after every
//! mutation, through a temporary file and a rename.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use taskline_proto::command::Command;
use taskline_proto::snapshot;
use taskline_proto::task::{PendingKind, Task};

/// Reply payload for an accepted mutation.
pub const REPLY_OK: &str = "OK";

/// Reply payload for a request that could not be parsed.
pub const REPLY_ERR: &str = "ERR";

/// Number of recent commands kept by [`TaskTable::history`].
pub const HISTORY_LIMIT: usize = 256;

/// Errors loading or saving the table file.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// The state file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The state file is not a JSON task list.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Writing the state file failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// File that was written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Encoding the table failed.
    #[error("failed to encode table: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Thread-safe task table shared by all connections.
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: RwLock<Vec<Task>>,
    path: Option<PathBuf>,
    history: Mutex<VecDeque<String>>,
    save_lock: Mutex<()>,
}

impl TaskTable {
    /// Creates an empty, memory-only table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table backed by `path`, loading it if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] if the file exists but cannot be read or
    /// parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TableError> {
        let path = path.into();
        let tasks = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| TableError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(TableError::Read { path, source }),
        };
        tracing::info!(path = %path.display(), count = tasks.len(), "loaded task table");
        Ok(Self {
            tasks: RwLock::new(tasks),
            path: Some(path),
            history: Mutex::default(),
            save_lock: Mutex::default(),
        })
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies `command` and returns the reply payload.
    pub fn apply(&self, command: &Command) -> String {
        self.record(command);
        match command {
            Command::GetAll => snapshot::render(&self.tasks.read()),
            Command::Add(task) | Command::Update(task) => {
                let task = task.with_pending(PendingKind::None);
                let mut tasks = self.tasks.write();
                match tasks.iter_mut().find(|t| t.same_key(&task)) {
                    Some(slot) => *slot = task,
                    None => tasks.push(task),
                }
                // Saved under the write guard so file order matches apply order.
                self.persist(&tasks);
                REPLY_OK.to_string()
            }
            Command::Delete(task) => {
                let mut tasks = self.tasks.write();
                let before = tasks.len();
                tasks.retain(|t| !t.same_key(task));
                if before != tasks.len() {
                    self.persist(&tasks);
                } else {
                    tracing::debug!(task = %task.key(), "delete of unknown task");
                }
                REPLY_OK.to_string()
            }
        }
    }

    /// Copy of every record.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Encoded form of the last [`HISTORY_LIMIT`] commands, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().iter().cloned().collect()
    }

    /// Writes the table to its backing file, if any.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] if encoding or writing fails.
    pub fn save(&self) -> Result<(), TableError> {
        self.write_file(&self.tasks.read())
    }

    fn write_file(&self, tasks: &[Task]) -> Result<(), TableError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(tasks)?;
        let write_err = |source| TableError::Write {
            path: path.to_path_buf(),
            source,
        };

        let _saving = self.save_lock.lock();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)
    }

    fn persist(&self, tasks: &[Task]) {
        if let Err(e) = self.write_file(tasks) {
            tracing::warn!(error = %e, "failed to save task table");
        }
    }

    fn record(&self, command: &Command) {
        let mut history = self.history.lock();
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(command.encode());
    }
}
