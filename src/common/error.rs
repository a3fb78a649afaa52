//! Error types for the harness
//!
//! Frame errors are fatal to a single decode; channel errors are fatal to
//! the current test run. Nothing here is retried automatically.

use std::io;
use thiserror::Error;

use crate::jdwp::constants::error_name;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Packet Codec Errors ===
    #[error("Malformed JDWP frame: {0}")]
    MalformedFrame(String),

    #[error("JDWP handshake failed: {0}")]
    Handshake(String),

    #[error("Command {command_set}/{command} failed with error {error_code} ({})", error_name(*.error_code))]
    ReplyError {
        command_set: u8,
        command: u8,
        error_code: u16,
    },

    #[error("Debug agent closed the connection")]
    AgentDisconnected,

    // === Synchronizer Errors ===
    #[error("No connection arrived within {0} seconds")]
    ConnectionTimeout(u64),

    #[error("Connection refused by {0}")]
    ConnectionRefused(String),

    #[error("Synchronization channel closed by peer")]
    ChannelClosed,

    #[error("Unexpected signal: expected '{expected}', received '{received}'")]
    UnexpectedSignal { expected: String, received: String },

    #[error("Cannot {action} while channel is {state}")]
    InvalidState { action: String, state: String },

    // === Timeout Errors ===
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // === Debuggee Errors ===
    #[error("Failed to launch debuggee: {0}")]
    DebuggeeLaunch(String),

    #[error("Debuggee exited unexpectedly (code {0:?})")]
    DebuggeeExited(Option<i32>),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid state error
    pub fn invalid_state(action: &str, state: &str) -> Self {
        Self::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Create an unexpected signal error
    pub fn unexpected_signal(expected: &str, received: &str) -> Self {
        Self::UnexpectedSignal {
            expected: expected.to_string(),
            received: received.to_string(),
        }
    }

    /// Create a malformed frame error
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::MalformedFrame(reason.into())
    }

    /// Whether the peer went away; debuggees treat this like "end"
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, Error::ChannelClosed)
    }
}
