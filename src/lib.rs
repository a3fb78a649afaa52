//! jdwp-harness - synchronized testing of programs under a JDWP debug agent
//!
//! This library provides the JDWP packet codec and connection, the sync
//! channel (length-prefixed UTF-8 signals) shared by driver and debuggee,
//! and the session that sequences them.

pub mod cli;
pub mod commands;
pub mod common;
pub mod debuggee;
pub mod jdwp;
pub mod orchestrator;
pub mod sync;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use jdwp::{decode, decode_event, encode, match_reply, Packet};
pub use sync::Synchronizer;
