// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests: working offline and catching up on reconnect.
//!
//! The peer is "down" by reserving a loopback port with nothing listening on
//! it; bringing it "up" starts the peer on that same port. Covers:
//! - Mutations queued while unreachable are replayed exactly once, in order
//! - The queue survives an engine restart via the pending tags on disk
//! - A listing that ends without its terminator is still applied

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use taskline::client::{TcpCommandClient, read_frame};
use taskline::store::{TaskStore, TaskView};
use taskline::sync::{self, ConnectivitySignal, ResyncOutcome, SyncError, SyncState};
use taskline_peer::server::{self, PeerState};
use taskline_proto::task::{PendingKind, TaskKey};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
}

/// Returns a loopback address with nothing listening on it.
fn reserve_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

async fn bring_up(addr: &str) -> Arc<PeerState> {
    let state = Arc::new(PeerState::default());
    server::start_server_with_state(addr, Arc::clone(&state))
        .await
        .unwrap();
    state
}

fn client(addr: &str) -> TcpCommandClient {
    TcpCommandClient::new(addr).with_connect_timeout(Duration::from_secs(1))
}

#[tokio::test]
async fn offline_changes_replay_once_on_reconnect() {
    let addr = reserve_addr();
    let (handle, _events, _engine) = sync::spawn(client(&addr), TaskStore::in_memory(), 32);

    let outcome = handle.signal(ConnectivitySignal::Available).await.unwrap();
    assert!(matches!(
        outcome,
        ResyncOutcome::Failed(SyncError::Listing { .. })
    ));
    assert_eq!(handle.state().await.unwrap(), SyncState::Offline);

    let added = handle.add("Pay rent", day()).await.unwrap();
    assert_eq!(added.pending_kind(), PendingKind::UncommittedCreate);
    handle.add("Call mom", day()).await.unwrap();
    handle
        .set_completed(TaskKey::new("call mom", day()), true)
        .await
        .unwrap();
    assert_eq!(handle.pending_len().await.unwrap(), 3);

    let peer = bring_up(&addr).await;
    let outcome = handle.signal(ConnectivitySignal::Available).await.unwrap();
    assert_eq!(
        outcome,
        ResyncOutcome::Completed {
            replayed: 3,
            tasks: 2
        }
    );
    assert_eq!(
        peer.table.history(),
        vec![
            "ADD|DATE20250201|TASKPay rent!STATEfalse|END",
            "ADD|DATE20250201|TASKCall mom!STATEfalse|END",
            "UPDATE|DATE20250201|TASKCall mom!STATEtrue|END",
            "GETALL|END",
        ]
    );

    let tasks = handle.tasks(TaskView::All).await.unwrap();
    assert!(tasks.iter().all(|t| t.pending_kind() == PendingKind::None));
    assert_eq!(handle.pending_len().await.unwrap(), 0);
    assert_eq!(handle.state().await.unwrap(), SyncState::Online);
}

#[tokio::test]
async fn queue_survives_restart() {
    let addr = reserve_addr();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.json");

    {
        let store = TaskStore::open(&path).unwrap();
        let (handle, _events, engine) = sync::spawn(client(&addr), store, 32);
        handle.add("Pay rent", day()).await.unwrap();
        handle.shutdown().await;
        engine.await.unwrap();
    }

    let store = TaskStore::open(&path).unwrap();
    let (handle, _events, _engine) = sync::spawn(client(&addr), store, 32);
    assert_eq!(handle.pending_len().await.unwrap(), 1);

    let peer = bring_up(&addr).await;
    handle.signal(ConnectivitySignal::Resumed).await.unwrap();
    assert_eq!(
        peer.table.history(),
        vec!["ADD|DATE20250201|TASKPay rent!STATEfalse|END", "GETALL|END"]
    );
    let stored = handle
        .find(TaskKey::new("Pay rent", day()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.pending_kind(), PendingKind::None);
}

#[tokio::test]
async fn connectivity_lost_while_online_queues() {
    let addr = reserve_addr();
    let peer = bring_up(&addr).await;
    let (handle, _events, _engine) = sync::spawn(client(&addr), TaskStore::in_memory(), 32);
    handle.signal(ConnectivitySignal::Available).await.unwrap();

    handle.signal(ConnectivitySignal::Lost).await.unwrap();
    handle.add("Queued", day()).await.unwrap();
    assert_eq!(handle.pending_len().await.unwrap(), 1);
    assert_eq!(peer.table.history(), vec!["GETALL|END"]);

    handle.signal(ConnectivitySignal::Available).await.unwrap();
    assert_eq!(peer.table.len(), 1);
}

#[tokio::test]
async fn unterminated_listing_is_still_applied() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_frame(&mut socket).await.unwrap();
        assert_eq!(request.payload, "GETALL");
        socket
            .write_all(b"DATE,20250115\r\nBuy milk,false")
            .await
            .unwrap();
    });

    let (handle, _events, _engine) = sync::spawn(client(&addr), TaskStore::in_memory(), 32);
    let outcome = handle.signal(ConnectivitySignal::Available).await.unwrap();
    assert_eq!(
        outcome,
        ResyncOutcome::Completed {
            replayed: 0,
            tasks: 1
        }
    );
    let task = handle
        .find(TaskKey::new("Buy milk", NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()))
        .await
        .unwrap()
        .unwrap();
    assert!(!task.completed());
}
