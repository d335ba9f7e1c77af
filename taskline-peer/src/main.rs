//! `taskline-peer` -- reference remote store for taskline clients.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:5000, table in memory
//! cargo run --bin taskline-peer
//!
//! # Custom address, table persisted to disk
//! cargo run --bin taskline-peer -- --bind 0.0.0.0:5000 --state-file peer.json
//!
//! # Or via environment variable
//! TASKLINE_PEER_ADDR=127.0.0.1:6000 cargo run --bin taskline-peer
//! ```

use std::sync::Arc;

use clap::Parser;
use taskline_peer::config::{PeerCliArgs, PeerConfig};
use taskline_peer::server::{self, PeerState};
use taskline_peer::table::TaskTable;

#[tokio::main]
async fn main() {
    let cli = PeerCliArgs::parse();

    let config = match PeerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let table = match &config.state_file {
        Some(path) => match TaskTable::open(path) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(error = %e, "failed to load task table");
                std::process::exit(1);
            }
        },
        None => TaskTable::new(),
    };
    let state = Arc::new(PeerState::new(table).with_max_request_size(config.max_request_size));

    tracing::info!(addr = %config.bind_addr, "starting taskline peer");
    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "taskline peer listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "peer server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start peer server");
            std::process::exit(1);
        }
    }
}
