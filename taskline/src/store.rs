//! Authoritative local task set with JSON persistence.
//!
//! The store is a plain owned value: the sync engine is its only writer.
//! Every save rewrites the whole file (write to a sibling temp file, then
//! rename), so a crash mid-save leaves the previous contents intact.
//!
//! On read, records may carry the newer `pendingKind` tag or the older pair
//! of `isNew` / `isDeleted` booleans; both map onto [`PendingKind`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use taskline_proto::task::{PendingKind, Task, TaskKey};

/// Errors that can occur while loading or saving the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading the state file failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Writing the state file failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// File that was written.
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
    /// The task list could not be serialized.
    #[error("failed to serialize tasks: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which slice of the store to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskView {
    /// Every visible task.
    #[default]
    All,
    /// Tasks dated today.
    Today,
    /// Tasks dated before today.
    Past,
    /// Tasks dated after today.
    Future,
}

/// On-disk record shape, tolerant of older files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    name: String,
    date: String,
    #[serde(default)]
    completed: bool,
    last_modified: Option<DateTime<Utc>>,
    pending_kind: Option<PendingKind>,
    #[serde(default)]
    is_new: bool,
    #[serde(default)]
    is_deleted: bool,
}

impl StoredTask {
    /// Converts to a [`Task`], or `None` if the record should be dropped.
    fn into_task(self) -> Option<Task> {
        let Some(date) = parse_stored_date(&self.date) else {
            tracing::warn!(name = %self.name, date = %self.date, "dropping stored task with unreadable date");
            return None;
        };
        let pending = match (self.pending_kind, self.is_new, self.is_deleted) {
            (Some(kind), _, _) => kind,
            // Created and deleted offline: the peer never saw it.
            (None, true, true) => return None,
            (None, true, false) => PendingKind::UncommittedCreate,
            (None, false, true) => PendingKind::UncommittedDelete,
            (None, false, false) => PendingKind::None,
        };
        let last_modified = self.last_modified.unwrap_or_else(Utc::now);
        match Task::from_parts(&self.name, date, self.completed, last_modified, pending) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!(error = %e, "dropping invalid stored task");
                None
            }
        }
    }
}

/// Reads an ISO-8601 date or date-time, truncated to the day.
fn parse_stored_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    raw.parse::<NaiveDate>()
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .or_else(|| raw.parse::<NaiveDateTime>().ok().map(|dt| dt.date()))
}

/// In-memory task set, optionally backed by a JSON file.
#[derive(Debug, Default)]
pub struct TaskStore {
    path: Option<PathBuf>,
    tasks: Vec<Task>,
}

impl TaskStore {
    /// Creates an empty store that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates an empty store backed by `path` without reading it.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            tasks: Vec::new(),
        }
    }

    /// Creates a store backed by `path` and loads it.
    ///
    /// # Errors
    ///
    /// See [`TaskStore::load`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut store = Self::with_path(path);
        store.load()?;
        Ok(store)
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replaces the in-memory contents with the backing file.
    ///
    /// A missing file loads as an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] or [`StoreError::Parse`] if the file
    /// exists but cannot be read or decoded.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no state file yet");
                self.tasks.clear();
                return Ok(());
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        if contents.trim().is_empty() {
            self.tasks.clear();
            return Ok(());
        }
        let stored: Vec<StoredTask> = serde_json::from_str(&contents)
            .map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?;
        self.tasks = stored.into_iter().filter_map(StoredTask::into_task).collect();
        tracing::debug!(path = %path.display(), count = self.tasks.len(), "loaded tasks");
        Ok(())
    }

    /// Writes the whole task list to the backing file.
    ///
    /// No-op for in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the file cannot be written.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.tasks)?;
        let write_err = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;
        tracing::debug!(path = %path.display(), count = self.tasks.len(), "saved tasks");
        Ok(())
    }

    /// Discards everything and installs `tasks`.
    ///
    /// Records sharing a key collapse into one: the last wins, in the
    /// position of the first.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = Vec::with_capacity(tasks.len());
        for task in tasks {
            if let Some(dropped) = self.upsert(task) {
                tracing::debug!(task = %dropped.key(), "duplicate record in replacement set");
            }
        }
    }

    /// Inserts `task`, replacing the record with the same key.
    ///
    /// Returns the replaced record.
    pub fn upsert(&mut self, task: Task) -> Option<Task> {
        match self.tasks.iter_mut().find(|t| t.same_key(&task)) {
            Some(slot) => Some(std::mem::replace(slot, task)),
            None => {
                self.tasks.push(task);
                None
            }
        }
    }

    /// Removes the record with the same key as `task`.
    pub fn remove(&mut self, task: &Task) -> Option<Task> {
        self.remove_key(&task.key())
    }

    /// Removes the record with `key`.
    pub fn remove_key(&mut self, key: &TaskKey) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.key() == *key)?;
        Some(self.tasks.remove(idx))
    }

    /// Looks up a record by key.
    #[must_use]
    pub fn find(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.iter().find(|t| t.key() == *key)
    }

    /// Every record, including ones pending deletion.
    #[must_use]
    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    /// Records whose sync status is not [`PendingKind::None`].
    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.pending_kind().is_pending())
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Visible tasks dated today (local time).
    #[must_use]
    pub fn today(&self) -> Vec<&Task> {
        self.view_on(TaskView::Today, local_today())
    }

    /// Visible tasks dated before today (local time).
    #[must_use]
    pub fn past(&self) -> Vec<&Task> {
        self.view_on(TaskView::Past, local_today())
    }

    /// Visible tasks dated after today (local time).
    #[must_use]
    pub fn future(&self) -> Vec<&Task> {
        self.view_on(TaskView::Future, local_today())
    }

    /// Visible tasks in `view`, relative to `today`, sorted by day then name.
    ///
    /// Records pending deletion are hidden from every view.
    #[must_use]
    pub fn view_on(&self, view: TaskView, today: NaiveDate) -> Vec<&Task> {
        let mut out: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.pending_kind() != PendingKind::UncommittedDelete)
            .filter(|t| match view {
                TaskView::All => true,
                TaskView::Today => t.date() == today,
                TaskView::Past => t.date() < today,
                TaskView::Future => t.date() > today,
            })
            .collect();
        out.sort_by(|a, b| {
            a.date()
                .cmp(&b.date())
                .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
        });
        out
    }
}

/// Current calendar day in local time.
#[must_use]
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
