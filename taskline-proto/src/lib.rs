//! Shared protocol definitions for the `Taskline` wire format.

pub mod codec;
pub mod command;
pub mod snapshot;
pub mod task;
