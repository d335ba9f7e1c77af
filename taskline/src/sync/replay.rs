//! Network half of a resync cycle.
//!
//! These functions only talk to the peer. They never touch the store or the
//! queue; the engine applies their results on its own task.

use taskline_proto::command::Command;

use super::SyncError;
use crate::client::CommandClient;
use crate::queue::PendingMutation;

/// Sends each mutation in order, stopping at the first failure.
///
/// Returns the number of mutations sent. On failure, entries before the
/// failing one may already have been applied by the peer.
///
/// # Errors
///
/// Returns [`SyncError::Replay`] naming the failing entry.
pub async fn replay<C: CommandClient>(
    client: &C,
    batch: &[PendingMutation],
) -> Result<usize, SyncError> {
    let total = batch.len();
    for (index, mutation) in batch.iter().enumerate() {
        let command = mutation.to_command();
        match client.execute(&command).await {
            Ok(reply) => {
                tracing::debug!(
                    index,
                    total,
                    verb = command.verb(),
                    task = %mutation.task().key(),
                    reply = %reply,
                    "replayed queued mutation"
                );
            }
            Err(source) => {
                tracing::warn!(index, total, verb = command.verb(), error = %source, "replay aborted");
                return Err(SyncError::Replay {
                    index,
                    total,
                    source,
                });
            }
        }
    }
    Ok(total)
}

/// Replays `batch`, then fetches the full listing.
///
/// Returns the decoded listing payload.
///
/// # Errors
///
/// Returns [`SyncError::Replay`] if any queued mutation fails (the listing
/// is then not requested), or [`SyncError::Listing`] if `GETALL` fails.
pub async fn resync<C: CommandClient>(
    client: &C,
    batch: &[PendingMutation],
) -> Result<String, SyncError> {
    if !batch.is_empty() {
        let sent = replay(client, batch).await?;
        tracing::info!(sent, "queued mutations replayed");
    }
    client
        .execute(&Command::GetAll)
        .await
        .map_err(|source| SyncError::Listing { source })
}
