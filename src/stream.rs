//! Primitive encodings shared by the snapshot header, the session skeleton and
//! strategy payloads.
//!
//! Integers are big-endian. Strings and byte blocks carry a `u32` length
//! prefix. Every length is checked against a limit on both sides: a reader
//! refuses to allocate past it, and a writer with the same limit refuses to
//! produce what that reader would refuse.

use std::io::{ErrorKind, Read};

use crate::error::{MarshalError, Result};

pub const DEFAULT_LENGTH_LIMIT: u32 = 64 * 1024 * 1024;

// ------------- ObjectOutput -------------
#[derive(Debug, Clone)]
pub struct ObjectOutput {
    buffer: Vec<u8>,
    limit: u32,
}

impl Default for ObjectOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectOutput {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LENGTH_LIMIT)
    }
    pub fn with_limit(limit: u32) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
        }
    }
    pub fn limit(&self) -> u32 {
        self.limit
    }
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }
    /// Collection sizes and byte lengths are stored as `u32` and may not
    /// exceed the limit.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        match u32::try_from(len) {
            Ok(len) if len <= self.limit => {
                self.write_u32(len);
                Ok(())
            }
            _ => Err(MarshalError::Serialization(format!(
                "length {len} exceeds the limit of {} bytes",
                self.limit
            ))),
        }
    }
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_len(value.len())?;
        self.buffer.extend_from_slice(value);
        Ok(())
    }
    /// Appends without a length prefix.
    pub fn write_raw(&mut self, value: &[u8]) {
        self.buffer.extend_from_slice(value);
    }
    pub fn len(&self) -> usize {
        self.buffer.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

// ------------- ObjectInput -------------
#[derive(Debug)]
pub struct ObjectInput<R> {
    reader: R,
    limit: u32,
}

/// Input over a single strategy payload.
pub type PayloadInput<'a> = ObjectInput<&'a [u8]>;

impl<R: Read> ObjectInput<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, DEFAULT_LENGTH_LIMIT)
    }
    pub fn with_limit(reader: R, limit: u32) -> Self {
        Self { reader, limit }
    }
    pub fn limit(&self) -> u32 {
        self.limit
    }
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.fill(&mut bytes)?;
        Ok(bytes)
    }
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MarshalError::corrupt(format!("invalid boolean byte {other}"))),
        }
    }
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u32()?;
        if len > self.limit {
            return Err(MarshalError::corrupt(format!(
                "length {len} exceeds the limit of {} bytes",
                self.limit
            )));
        }
        Ok(len as usize)
    }
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes)?;
        Ok(bytes)
    }
    pub fn read_str(&mut self) -> Result<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|e| MarshalError::corrupt(format!("invalid UTF-8 string: {e}")))
    }
    pub fn into_inner(self) -> R {
        self.reader
    }
    fn fill(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.reader.read_exact(bytes).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => MarshalError::corrupt("stream ended unexpectedly"),
            _ => MarshalError::Io(e),
        })
    }
}

impl ObjectInput<&[u8]> {
    pub fn remaining(&self) -> usize {
        self.reader.len()
    }
}
