//! FIFO buffer of mutations the remote peer has not acknowledged yet.
//!
//! The queue holds no network or storage logic of its own. The sync engine
//! appends to it while offline, snapshots it with [`PendingQueue::drain`]
//! before a replay, and removes the replayed prefix once the whole batch has
//! gone through.

use std::collections::VecDeque;

use taskline_proto::command::Command;
use taskline_proto::task::{PendingKind, Task, TaskKey};

use crate::store::TaskStore;

/// A locally applied change waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMutation {
    /// Replayed as `ADD`.
    Create(Task),
    /// Replayed as `UPDATE`.
    Update(Task),
    /// Replayed as `DELETE`.
    Delete(Task),
}

impl PendingMutation {
    /// Task the mutation carries.
    #[must_use]
    pub const fn task(&self) -> &Task {
        match self {
            Self::Create(t) | Self::Update(t) | Self::Delete(t) => t,
        }
    }

    /// Wire command that replays this mutation.
    #[must_use]
    pub fn to_command(&self) -> Command {
        match self {
            Self::Create(t) => Command::Add(t.clone()),
            Self::Update(t) => Command::Update(t.clone()),
            Self::Delete(t) => Command::Delete(t.clone()),
        }
    }
}

/// Ordered mutation buffer.
#[derive(Debug, Default, Clone)]
pub struct PendingQueue {
    entries: VecDeque<PendingMutation>,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstructs queue entries from records tagged as pending.
    ///
    /// Only creates and deletes leave a tag on the record, so offline
    /// updates to already-confirmed tasks are not recoverable this way.
    #[must_use]
    pub fn rebuild_from(store: &TaskStore) -> Self {
        let entries = store
            .pending()
            .filter_map(|task| match task.pending_kind() {
                PendingKind::UncommittedCreate => Some(PendingMutation::Create(task.clone())),
                PendingKind::UncommittedDelete => Some(PendingMutation::Delete(task.clone())),
                PendingKind::None => None,
            })
            .collect();
        Self { entries }
    }

    /// Appends a mutation at the back.
    pub fn enqueue(&mut self, mutation: PendingMutation) {
        self.entries.push_back(mutation);
    }

    /// Returns every entry in order without removing anything.
    #[must_use]
    pub fn drain(&self) -> Vec<PendingMutation> {
        self.entries.iter().cloned().collect()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes the first `count` entries, after a batch of that size has
    /// been fully replayed.
    pub fn acknowledge(&mut self, count: usize) {
        let count = count.min(self.entries.len());
        self.entries.drain(..count);
    }

    /// Removes every entry for `key`, returning how many were dropped.
    pub fn discard_task(&mut self, key: &TaskKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| m.task().key() != *key);
        before - self.entries.len()
    }

    /// Drops the entries for `key` queued after its most recent `Delete`,
    /// keeping that delete.
    ///
    /// Returns `None` when no delete for `key` is queued.
    pub fn discard_after_delete(&mut self, key: &TaskKey) -> Option<usize> {
        let last_delete = self
            .entries
            .iter()
            .rposition(|m| matches!(m, PendingMutation::Delete(t) if t.key() == *key))?;
        let before = self.entries.len();
        let mut index = 0;
        self.entries.retain(|m| {
            let keep = index <= last_delete || m.task().key() != *key;
            index += 1;
            keep
        });
        Some(before - self.entries.len())
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
