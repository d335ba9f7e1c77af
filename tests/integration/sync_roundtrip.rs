// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests: the sync engine against a live in-process peer.
//!
//! Covers the online path end to end: direct mutations reaching the peer,
//! full-listing replacement of local state, manual refresh, and persistence
//! of the local list across engine restarts.

use std::sync::Arc;

use chrono::NaiveDate;
use taskline::client::TcpCommandClient;
use taskline::store::{TaskStore, TaskView};
use taskline::sync::{self, ConnectivitySignal, ResyncOutcome, SyncHandle, SyncState};
use taskline_peer::server::{self, PeerState};
use taskline_proto::command::Command;
use taskline_proto::task::{PendingKind, Task, TaskKey};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

async fn start_peer() -> (Arc<PeerState>, String) {
    let state = Arc::new(PeerState::default());
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (state, addr.to_string())
}

async fn connect(addr: &str, store: TaskStore) -> (SyncHandle, tokio::task::JoinHandle<TaskStore>) {
    let client = TcpCommandClient::new(addr);
    let (handle, _events, engine) = sync::spawn(client, store, 32);
    let outcome = handle.signal(ConnectivitySignal::Available).await.unwrap();
    assert!(
        matches!(outcome, ResyncOutcome::Completed { .. }),
        "initial sync failed: {outcome:?}"
    );
    (handle, engine)
}

#[tokio::test]
async fn online_mutations_reach_peer() {
    let (peer, addr) = start_peer().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.json");

    let (handle, engine) = connect(&addr, TaskStore::open(&path).unwrap()).await;
    assert_eq!(handle.state().await.unwrap(), SyncState::Online);

    handle.add("Buy milk", day(15)).await.unwrap();
    handle.add("Walk dog", day(15)).await.unwrap();
    handle
        .set_completed(TaskKey::new("walk dog", day(15)), true)
        .await
        .unwrap();
    handle
        .delete(TaskKey::new("Buy milk", day(15)))
        .await
        .unwrap();

    assert_eq!(
        peer.table.history(),
        vec![
            "GETALL|END",
            "ADD|DATE20250115|TASKBuy milk!STATEfalse|END",
            "ADD|DATE20250115|TASKWalk dog!STATEfalse|END",
            "UPDATE|DATE20250115|TASKWalk dog!STATEtrue|END",
            "DELETE|DATE20250115|TASKBuy milk!STATEfalse|END",
        ]
    );
    let remote = peer.table.tasks();
    assert_eq!(remote.len(), 1);
    assert!(remote[0].completed());
    assert_eq!(handle.pending_len().await.unwrap(), 0);

    handle.shutdown().await;
    let store = engine.await.unwrap();
    assert_eq!(store.len(), 1);

    let reopened = TaskStore::open(&path).unwrap();
    let walk = reopened.find(&TaskKey::new("Walk dog", day(15))).unwrap();
    assert!(walk.completed());
    assert_eq!(walk.pending_kind(), PendingKind::None);
}

#[tokio::test]
async fn listing_replaces_local_state() {
    let (peer, addr) = start_peer().await;
    peer.table
        .apply(&Command::Add(Task::new("Buy milk", day(15)).unwrap()));
    peer.table.apply(&Command::Add(
        Task::new("Walk dog", day(15)).unwrap().with_completed(true),
    ));
    peer.table
        .apply(&Command::Add(Task::new("File taxes", day(20)).unwrap()));

    let mut local = TaskStore::in_memory();
    local.upsert(Task::new("Stale", day(1)).unwrap());
    let (handle, _engine) = connect(&addr, local).await;

    let tasks = handle.tasks(TaskView::All).await.unwrap();
    let summary: Vec<(&str, NaiveDate, bool)> = tasks
        .iter()
        .map(|t| (t.name(), t.date(), t.completed()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Buy milk", day(15), false),
            ("Walk dog", day(15), true),
            ("File taxes", day(20), false),
        ]
    );
}

#[tokio::test]
async fn manual_resync_picks_up_remote_changes() {
    let (peer, addr) = start_peer().await;
    let (handle, _engine) = connect(&addr, TaskStore::in_memory()).await;
    assert!(handle.tasks(TaskView::All).await.unwrap().is_empty());

    // Another client adds a task directly on the peer.
    peer.table
        .apply(&Command::Add(Task::new("From elsewhere", day(3)).unwrap()));

    let outcome = handle.resync().await.unwrap();
    assert_eq!(
        outcome,
        ResyncOutcome::Completed {
            replayed: 0,
            tasks: 1
        }
    );
    assert!(
        handle
            .find(TaskKey::new("from elsewhere", day(3)))
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(handle.state().await.unwrap(), SyncState::Online);
}

#[tokio::test]
async fn remote_delete_empties_local_store() {
    let (peer, addr) = start_peer().await;
    let (handle, _engine) = connect(&addr, TaskStore::in_memory()).await;
    handle.add("Short lived", day(9)).await.unwrap();

    peer.table.apply(&Command::Delete(
        Task::new("Short lived", day(9)).unwrap(),
    ));
    handle.resync().await.unwrap();
    assert!(handle.tasks(TaskView::All).await.unwrap().is_empty());
}
