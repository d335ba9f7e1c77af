//! Reference remote store for taskline clients.
//!
//! Exposes the peer server for use in tests and embedding. It speaks the
//! one-command-per-connection line protocol from [`taskline_proto`] and keeps
//! the authoritative task table.

pub mod config;
pub mod server;
pub mod table;
