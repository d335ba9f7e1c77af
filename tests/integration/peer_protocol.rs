// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for the peer's wire behaviour, driven with raw sockets.
//!
//! These pin down the line protocol as seen from outside: reply framing,
//! listing layout, the lack of escaping for delimiter characters, and table
//! persistence across restarts.

use std::net::SocketAddr;
use std::sync::Arc;

use taskline_peer::server::{self, PeerState};
use taskline_peer::table::TaskTable;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn send(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    reply
}

async fn start(table: TaskTable) -> (Arc<PeerState>, SocketAddr) {
    let state = Arc::new(PeerState::new(table));
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (state, addr)
}

#[tokio::test]
async fn listing_groups_by_day() {
    let (_state, addr) = start(TaskTable::new()).await;
    for request in [
        "ADD|DATE20250116|TASKFile taxes!STATEfalse|END",
        "ADD|DATE20250115|TASKBuy milk!STATEfalse|END",
        "ADD|DATE20250115|TASKWalk dog!STATEtrue|END",
    ] {
        assert_eq!(send(addr, request).await, "OK|END");
    }

    assert_eq!(
        send(addr, "GETALL|END").await,
        "DATE,20250115\r\nBuy milk,false\r\nWalk dog,true\r\n\
         DATE,20250116\r\nFile taxes,false\r\n|END"
    );
}

#[tokio::test]
async fn empty_table_lists_nothing() {
    let (_state, addr) = start(TaskTable::new()).await;
    assert_eq!(send(addr, "GETALL|END").await, "|END");
}

#[tokio::test]
async fn delimiters_in_names_are_not_escaped() {
    let (state, addr) = start(TaskTable::new()).await;

    // `!` and `,` survive because the state marker and the listing comma
    // are both located from the right.
    send(addr, "ADD|DATE20250115|TASKMilk, eggs!STATEfalse|END").await;
    send(addr, "ADD|DATE20250115|TASKWow!Done!STATEtrue|END").await;
    let names: Vec<String> = state
        .table
        .tasks()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(names, vec!["Milk, eggs", "Wow!Done"]);

    // A name containing the terminator cuts the request short.
    assert_eq!(
        send(addr, "ADD|DATE20250115|TASKa|END b!STATEfalse|END").await,
        "ERR|END"
    );
    assert_eq!(state.table.len(), 2);
}

#[tokio::test]
async fn malformed_requests_get_err() {
    let (state, addr) = start(TaskTable::new()).await;
    for request in [
        "|END",
        "FETCH|END",
        "ADD|DATE2025011|TASKx!STATEtrue|END",
        "ADD|DATE20251301|TASKx!STATEtrue|END",
        "ADD|DATE20250115|TASK   !STATEtrue|END",
        "DELETE|DATE20250115|TASKno state|END",
    ] {
        assert_eq!(send(addr, request).await, "ERR|END", "{request}");
    }
    assert!(state.table.is_empty());
}

#[tokio::test]
async fn table_persists_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peer.json");

    let (_state, addr) = start(TaskTable::open(&path).unwrap()).await;
    send(addr, "ADD|DATE20250115|TASKKeep me!STATEtrue|END").await;

    let (state, addr) = start(TaskTable::open(&path).unwrap()).await;
    assert_eq!(state.table.len(), 1);
    assert_eq!(
        send(addr, "GETALL|END").await,
        "DATE,20250115\r\nKeep me,true\r\n|END"
    );
}
