//! Packet data helpers
//!
//! JDWP payloads are sequences of big-endian integers and length-prefixed
//! UTF-8 strings. Object/reference ids are sized by the VM (`IDSizes`), so
//! readers take the width explicitly.

use crate::common::{Error, Result};

/// Builds a packet payload
#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i32(self, value: i32) -> Self {
        self.u32(value as u32)
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// An id of `size` bytes (1..=8), taking the low bytes of `value`
    pub fn id(mut self, value: u64, size: usize) -> Self {
        let bytes = value.to_be_bytes();
        self.buf.extend_from_slice(&bytes[8 - size.clamp(1, 8)..]);
        self
    }

    /// JDWP string: 4-byte length followed by UTF-8 bytes
    pub fn string(self, value: &str) -> Self {
        self.u32(value.len() as u32).bytes(value.as_bytes())
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads a packet payload front to back
#[derive(Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::malformed(format!(
                "payload truncated: need {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.id(8)
    }

    /// An id of `size` bytes (1..=8)
    pub fn id(&mut self, size: usize) -> Result<u64> {
        if !(1..=8).contains(&size) {
            return Err(Error::malformed(format!("invalid id size {}", size)));
        }
        Ok(self
            .take(size)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    pub fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::malformed(format!("invalid UTF-8 in string: {}", e)))
    }
}
