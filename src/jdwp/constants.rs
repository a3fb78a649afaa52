//! JDWP protocol constants
//!
//! Only the subset the harness itself issues or needs to recognise.

/// Full header size: length(4) + id(4) + flags(1), then either
/// command set and command or a 2-byte error code
pub const HEADER_SIZE: usize = 11;

/// Flags bit marking a reply frame
pub const FLAG_REPLY: u8 = 0x80;

/// Handshake string both sides exchange before any frame
pub const HANDSHAKE: &[u8; 14] = b"JDWP-Handshake";

/// Command set identifiers
pub mod command_sets {
    pub const VIRTUAL_MACHINE: u8 = 1;
    /// Set used by the agent for unsolicited notifications
    pub const EVENT: u8 = 64;
}

/// VirtualMachine commands (set 1)
pub mod vm_commands {
    pub const VERSION: u8 = 1;
    pub const DISPOSE: u8 = 6;
    pub const SUSPEND: u8 = 8;
    pub const RESUME: u8 = 9;
}

/// Event commands (set 64)
pub mod event_commands {
    pub const COMPOSITE: u8 = 100;
}

/// Event kinds an agent sends without a prior request
pub mod event_kinds {
    pub const THREAD_START: u8 = 6;
    pub const THREAD_DEATH: u8 = 7;
    pub const VM_START: u8 = 90;
    pub const VM_DEATH: u8 = 99;
}

/// Symbolic name for an event kind, for logs
pub fn event_kind_name(kind: u8) -> &'static str {
    match kind {
        event_kinds::THREAD_START => "THREAD_START",
        event_kinds::THREAD_DEATH => "THREAD_DEATH",
        event_kinds::VM_START => "VM_START",
        event_kinds::VM_DEATH => "VM_DEATH",
        _ => "OTHER",
    }
}

/// Suspend policy byte of a composite event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SuspendPolicy {
    None = 0,
    EventThread = 1,
    All = 2,
}

impl TryFrom<u8> for SuspendPolicy {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(SuspendPolicy::None),
            1 => Ok(SuspendPolicy::EventThread),
            2 => Ok(SuspendPolicy::All),
            other => Err(other),
        }
    }
}

/// Symbolic name for a reply error code
pub fn error_name(code: u16) -> &'static str {
    match code {
        0 => "NONE",
        10 => "INVALID_THREAD",
        11 => "INVALID_THREAD_GROUP",
        12 => "INVALID_PRIORITY",
        13 => "THREAD_NOT_SUSPENDED",
        14 => "THREAD_SUSPENDED",
        20 => "INVALID_OBJECT",
        21 => "INVALID_CLASS",
        22 => "CLASS_NOT_PREPARED",
        23 => "INVALID_METHODID",
        24 => "INVALID_LOCATION",
        25 => "INVALID_FIELDID",
        30 => "INVALID_FRAMEID",
        31 => "NO_MORE_FRAMES",
        32 => "OPAQUE_FRAME",
        33 => "NOT_CURRENT_FRAME",
        34 => "TYPE_MISMATCH",
        35 => "INVALID_SLOT",
        40 => "DUPLICATE",
        41 => "NOT_FOUND",
        50 => "INVALID_MONITOR",
        51 => "NOT_MONITOR_OWNER",
        52 => "INTERRUPT",
        60..=71 => "CLASS_REDEFINITION",
        99 => "NOT_IMPLEMENTED",
        100 => "NULL_POINTER",
        101 => "ABSENT_INFORMATION",
        102 => "INVALID_EVENT_TYPE",
        103 => "ILLEGAL_ARGUMENT",
        110 => "OUT_OF_MEMORY",
        111 => "ACCESS_DENIED",
        112 => "VM_DEAD",
        113 => "INTERNAL",
        115 => "UNATTACHED_THREAD",
        500 => "INVALID_TAG",
        502 => "ALREADY_INVOKING",
        503 => "INVALID_INDEX",
        504 => "INVALID_LENGTH",
        506 => "INVALID_STRING",
        507 => "INVALID_CLASS_LOADER",
        508 => "INVALID_ARRAY",
        509 => "TRANSPORT_LOAD",
        510 => "TRANSPORT_INIT",
        511 => "NATIVE_METHOD",
        512 => "INVALID_COUNT",
        _ => "UNKNOWN",
    }
}
