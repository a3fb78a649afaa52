//! JDWP packet model
//!
//! Every frame starts with the same header, parsed before the body:
//! ```text
//! ┌──────────┬──────────┬───────┬──────────────────────────────┬─────────┐
//! │ length   │ id       │ flags │ cmd set + cmd │ error code   │ data    │
//! │ 4 bytes  │ 4 bytes  │ 1 byte│ 1 + 1 bytes   │ 2 bytes      │ ...     │
//! └──────────┴──────────┴───────┴──────────────────────────────┴─────────┘
//! ```
//!
//! `flags & 0x80` selects the reply body. All integers are big-endian and
//! `length` counts the whole frame including the header.

use crate::common::{Error, Result};

use super::constants::{command_sets, FLAG_REPLY, HEADER_SIZE};

/// Fields common to every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length including the header
    pub length: u32,
    /// Correlation id
    pub id: u32,
    /// Flag bits
    pub flags: u8,
}

impl FrameHeader {
    /// Parse the common header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::malformed(format!(
                "frame is {} bytes, shorter than the {} byte header",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        Ok(Self {
            length: read_u32(bytes, 0),
            id: read_u32(bytes, 4),
            flags: bytes[8],
        })
    }

    /// Whether the reply bit is set
    pub fn is_reply(&self) -> bool {
        self.flags & FLAG_REPLY != 0
    }
}

/// A command issued to (or by) the VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    id: u32,
    flags: u8,
    command_set: u8,
    command: u8,
    data: Vec<u8>,
}

impl CommandPacket {
    pub fn new(command_set: u8, command: u8, id: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            flags: 0,
            command_set,
            command,
            data,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn command_set(&self) -> u8 {
        self.command_set
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Total frame length including the header
    pub fn length(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }

    /// Encode to a complete frame
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = frame_with_header(self.length(), self.id, self.flags)?;
        buf.push(self.command_set);
        buf.push(self.command);
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }
}

/// A reply correlated to a command by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPacket {
    id: u32,
    flags: u8,
    error_code: u16,
    data: Vec<u8>,
}

impl ReplyPacket {
    pub fn new(id: u32, error_code: u16, data: Vec<u8>) -> Self {
        Self {
            id,
            flags: FLAG_REPLY,
            error_code,
            data,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn error_code(&self) -> u16 {
        self.error_code
    }

    /// Whether the originating command succeeded
    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }

    /// Reply payload; only meaningful when `is_success()`
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn length(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }

    /// Encode to a complete frame
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = frame_with_header(self.length(), self.id, self.flags)?;
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }
}

/// An unsolicited notification; same wire shape as a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPacket(CommandPacket);

impl EventPacket {
    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn command_set(&self) -> u8 {
        self.0.command_set
    }

    pub fn command(&self) -> u8 {
        self.0.command
    }

    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    /// Whether this is an `Event.Composite` notification
    pub fn is_composite(&self) -> bool {
        self.0.command_set == command_sets::EVENT
            && self.0.command == super::constants::event_commands::COMPOSITE
    }

    /// Suspend policy byte leading a composite event
    pub fn suspend_policy(&self) -> Option<u8> {
        self.data().first().copied()
    }

    /// Number of events in a composite event
    pub fn event_count(&self) -> Option<u32> {
        let data = self.data();
        (data.len() >= 5).then(|| read_u32(data, 1))
    }

    /// Kind of the first event in a composite event
    pub fn first_event_kind(&self) -> Option<u8> {
        match self.event_count() {
            Some(n) if n > 0 => self.data().get(5).copied(),
            _ => None,
        }
    }

    pub fn as_command(&self) -> &CommandPacket {
        &self.0
    }

    pub fn into_command(self) -> CommandPacket {
        self.0
    }
}

impl From<CommandPacket> for EventPacket {
    fn from(packet: CommandPacket) -> Self {
        Self(packet)
    }
}

/// Any decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Command(CommandPacket),
    Reply(ReplyPacket),
    Event(EventPacket),
}

impl Packet {
    pub fn id(&self) -> u32 {
        match self {
            Packet::Command(p) => p.id(),
            Packet::Reply(p) => p.id(),
            Packet::Event(p) => p.id(),
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Packet::Command(p) => p.data(),
            Packet::Reply(p) => p.data(),
            Packet::Event(p) => p.data(),
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Packet::Reply(_))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Packet::Command(p) => p.to_bytes(),
            Packet::Reply(p) => p.to_bytes(),
            Packet::Event(p) => p.as_command().to_bytes(),
        }
    }
}

/// Decode one complete frame
///
/// Fails if the buffer is shorter than the header or its declared length
/// differs from the buffer length. Never yields `Packet::Event`; that tag
/// comes only from [`decode_event`].
pub fn decode(bytes: &[u8]) -> Result<Packet> {
    let header = FrameHeader::parse(bytes)?;
    if header.length as usize != bytes.len() {
        return Err(Error::malformed(format!(
            "declared length {} does not match {} bytes received",
            header.length,
            bytes.len()
        )));
    }

    let data = bytes[HEADER_SIZE..].to_vec();
    if header.is_reply() {
        Ok(Packet::Reply(ReplyPacket {
            id: header.id,
            flags: header.flags,
            error_code: u16::from_be_bytes([bytes[9], bytes[10]]),
            data,
        }))
    } else {
        Ok(Packet::Command(CommandPacket {
            id: header.id,
            flags: header.flags,
            command_set: bytes[9],
            command: bytes[10],
            data,
        }))
    }
}

/// Decode a frame that arrived on the event stream
pub fn decode_event(bytes: &[u8]) -> Result<EventPacket> {
    match decode(bytes)? {
        Packet::Command(packet) => Ok(EventPacket(packet)),
        _ => Err(Error::malformed("reply frame where an event was expected")),
    }
}

/// Encode a command frame; `id` is chosen by the caller
pub fn encode(command_set: u8, command: u8, id: u32, payload: &[u8]) -> Result<Vec<u8>> {
    CommandPacket::new(command_set, command, id, payload.to_vec()).to_bytes()
}

/// Whether `candidate` is the reply to the command sent with `sent_id`
pub fn match_reply(sent_id: u32, candidate: &Packet) -> bool {
    matches!(candidate, Packet::Reply(reply) if reply.id() == sent_id)
}

fn frame_with_header(length: usize, id: u32, flags: u8) -> Result<Vec<u8>> {
    let declared = u32::try_from(length)
        .map_err(|_| Error::malformed(format!("frame of {} bytes exceeds u32 length", length)))?;
    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(&declared.to_be_bytes());
    buf.extend_from_slice(&id.to_be_bytes());
    buf.push(flags);
    Ok(buf)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdwp::constants::{event_commands, event_kinds, vm_commands};

    #[test]
    fn test_encode_layout() {
        let bytes = encode(1, 9, 0x0102_0304, &[0xAA, 0xBB]).unwrap();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 13, 1, 2, 3, 4, 0x00, 1, 9, 0xAA, 0xBB]
        );
    }

    #[test]
    fn test_decode_command_round_trip() {
        let payload = b"payload bytes".to_vec();
        let bytes =
            encode(command_sets::VIRTUAL_MACHINE, vm_commands::SUSPEND, 77, &payload).unwrap();

        match decode(&bytes).unwrap() {
            Packet::Command(cmd) => {
                assert_eq!(cmd.command_set(), command_sets::VIRTUAL_MACHINE);
                assert_eq!(cmd.command(), vm_commands::SUSPEND);
                assert_eq!(cmd.id(), 77);
                assert_eq!(cmd.data(), payload.as_slice());
                assert_eq!(cmd.length(), bytes.len());
            }
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_payload() {
        let bytes = encode(1, vm_commands::VERSION, 1, &[]).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let packet = decode(&bytes).unwrap();
        assert!(packet.data().is_empty());
    }

    #[test]
    fn test_decode_reply_error_codes() {
        for (code, data) in [(0u16, vec![]), (0, vec![1, 2, 3]), (112, vec![]), (504, vec![9; 40])] {
            let bytes = ReplyPacket::new(5, code, data.clone()).to_bytes().unwrap();
            match decode(&bytes).unwrap() {
                Packet::Reply(reply) => {
                    assert_eq!(reply.error_code(), code);
                    assert_eq!(reply.is_success(), code == 0);
                    assert_eq!(reply.data(), data.as_slice());
                    assert_eq!(reply.flags(), FLAG_REPLY);
                }
                other => panic!("Expected reply, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_decode_truncated_header() {
        let err = decode(&[0, 0, 0, 11, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
        assert!(matches!(decode(&[]), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut bytes = encode(1, 1, 1, &[1, 2, 3]).unwrap();

        // Trailing garbage
        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(decode(&longer), Err(Error::MalformedFrame(_))));

        // Truncated body
        let shorter = &bytes[..bytes.len() - 1];
        assert!(matches!(decode(shorter), Err(Error::MalformedFrame(_))));

        // Header claims less than the header itself
        bytes[3] = 4;
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_event() {
        let mut data = vec![2u8];
        data.extend_from_slice(&1u32.to_be_bytes());
        data.push(event_kinds::VM_START);
        data.extend_from_slice(&0u32.to_be_bytes());
        let bytes = encode(command_sets::EVENT, event_commands::COMPOSITE, 3, &data).unwrap();

        let event = decode_event(&bytes).unwrap();
        assert!(event.is_composite());
        assert_eq!(event.id(), 3);
        assert_eq!(event.suspend_policy(), Some(2));
        assert_eq!(event.event_count(), Some(1));
        assert_eq!(event.first_event_kind(), Some(event_kinds::VM_START));
    }

    #[test]
    fn test_decode_event_rejects_reply() {
        let bytes = ReplyPacket::new(3, 0, vec![]).to_bytes().unwrap();
        assert!(matches!(decode_event(&bytes), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_match_reply() {
        let reply = Packet::Reply(ReplyPacket::new(42, 0, vec![]));
        let failed = Packet::Reply(ReplyPacket::new(42, 21, vec![]));
        let command = Packet::Command(CommandPacket::new(1, 1, 42, vec![]));
        let event = Packet::Event(CommandPacket::new(64, 100, 42, vec![]).into());

        assert!(match_reply(42, &reply));
        assert!(match_reply(42, &failed));
        assert!(!match_reply(41, &reply));
        assert!(!match_reply(42, &command));
        assert!(!match_reply(42, &event));
    }

    #[test]
    fn test_ids_only_change_id_bytes() {
        let a = encode(2, 15, 1, b"same").unwrap();
        let b = encode(2, 15, 2, b"same").unwrap();
        assert_ne!(a, b);
        assert_eq!(a[..4], b[..4]);
        assert_ne!(a[4..8], b[4..8]);
        assert_eq!(a[8..], b[8..]);
    }
}
