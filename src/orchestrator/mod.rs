//! Test orchestration
//!
//! Owns the sync channel, the debug connection and the debuggee for one
//! run, and sequences them.

pub mod launcher;
pub mod session;

pub use launcher::{DebuggeeHandle, DebuggeeLauncher, InProcessLauncher, ProcessLauncher};
pub use session::SyncTestSession;
