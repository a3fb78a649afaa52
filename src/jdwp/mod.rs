//! Java Debug Wire Protocol (JDWP) implementation
//!
//! Binary packet model, stream codec, and the debugger side of a
//! connection to a debug agent.

pub mod codec;
pub mod connection;
pub mod constants;
pub mod packet;
pub mod payload;

pub use connection::{JdwpConnection, VmVersion};
pub use packet::{
    decode, decode_event, encode, match_reply, CommandPacket, EventPacket, Packet, ReplyPacket,
};
