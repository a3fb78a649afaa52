//! Driver/debuggee synchronization
//!
//! An out-of-band control connection used to hold the debuggee at known
//! points while the driver inspects it over JDWP.

pub mod channel;
pub mod signal;

pub use channel::{ChannelState, SyncOptions, Synchronizer};
pub use signal::{Signal, SGNL_CONTINUE, SGNL_END, SGNL_READY};
