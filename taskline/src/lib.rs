//! Taskline client library.
//!
//! Keeps an authoritative local copy of the user's tasks and reconciles it
//! with a remote peer over the line protocol in [`taskline_proto`]. The
//! [`sync`] engine is the entry point; the other modules are its parts.

pub mod client;
pub mod config;
pub mod queue;
pub mod store;
pub mod sync;
