//! Task record shared by the client, the wire codec, and the reference peer.
//!
//! A [`Task`] is an immutable value: every change goes through one of the
//! `with_*` builders, which return a fresh copy with `last_modified` bumped.
//! Identity is the pair (trimmed, case-folded name; calendar day), exposed as
//! [`TaskKey`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Errors raised when constructing a [`Task`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The name is empty after trimming.
    #[error("task name cannot be empty")]
    EmptyName,
}

/// Sync status of a locally held record.
///
/// Exactly one variant holds at a time, so a record can never be both an
/// uncommitted create and an uncommitted delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingKind {
    /// Confirmed with the remote peer.
    #[default]
    None,
    /// Added locally, not yet acknowledged by the peer.
    UncommittedCreate,
    /// Deleted locally, deletion not yet acknowledged by the peer.
    UncommittedDelete,
}

impl PendingKind {
    /// Returns `true` for any variant other than [`PendingKind::None`].
    #[must_use]
    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for PendingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::UncommittedCreate => write!(f, "uncommitted_create"),
            Self::UncommittedDelete => write!(f, "uncommitted_delete"),
        }
    }
}

/// Natural identity of a task: case-folded trimmed name plus day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    name: String,
    date: NaiveDate,
}

impl TaskKey {
    /// Builds a key from a raw name and a day.
    #[must_use]
    pub fn new(name: &str, date: NaiveDate) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            date,
        }
    }

    /// Normalized (trimmed, lowercase) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Day component of the key.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.date)
    }
}

/// A single unit of work.
///
/// Serialized field names follow the on-disk format: `name`, `date`,
/// `completed`, `lastModified`, `pendingKind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    name: String,
    date: NaiveDate,
    completed: bool,
    last_modified: DateTime<Utc>,
    #[serde(default)]
    pending_kind: PendingKind,
}

impl Task {
    /// Creates an incomplete, confirmed task stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::EmptyName`] if `name` is blank.
    pub fn new(name: &str, date: NaiveDate) -> Result<Self, TaskError> {
        Self::from_parts(name, date, false, Utc::now(), PendingKind::None)
    }

    /// Creates a task from every field.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::EmptyName`] if `name` is blank.
    pub fn from_parts(
        name: &str,
        date: NaiveDate,
        completed: bool,
        last_modified: DateTime<Utc>,
        pending_kind: PendingKind,
    ) -> Result<Self, TaskError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaskError::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
            date,
            completed,
            last_modified,
            pending_kind,
        })
    }

    /// Display name (trimmed, original casing).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Day the task belongs to.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Whether the task is done.
    #[must_use]
    pub const fn completed(&self) -> bool {
        self.completed
    }

    /// When the record was last created or changed.
    #[must_use]
    pub const fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Sync status of the record.
    #[must_use]
    pub const fn pending_kind(&self) -> PendingKind {
        self.pending_kind
    }

    /// Identity key used for matching.
    #[must_use]
    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.name, self.date)
    }

    /// Returns `true` if `other` has the same identity key.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        self.date == other.date && self.name.to_lowercase() == other.name.to_lowercase()
    }

    /// Wire token for the completion flag.
    #[must_use]
    pub const fn state_token(&self) -> &'static str {
        if self.completed { "true" } else { "false" }
    }

    /// Copy with a new completion flag.
    #[must_use]
    pub fn with_completed(&self, completed: bool) -> Self {
        Self {
            completed,
            last_modified: Utc::now(),
            ..self.clone()
        }
    }

    /// Copy with a new sync status.
    #[must_use]
    pub fn with_pending(&self, pending_kind: PendingKind) -> Self {
        Self {
            pending_kind,
            last_modified: Utc::now(),
            ..self.clone()
        }
    }
}
