//! Length-prefixed string framing for control-channel payloads.
//!
//! A payload is a sequence of strings, each written as a big-endian `u16`
//! byte count followed by that many bytes of UTF-8. The first string is the
//! sub-channel tag; the rest are that message's fields in order. For text
//! without NUL characters or astral-plane code points this is byte-identical
//! to Java's `DataOutput.writeUTF`.

use crate::error::FleetError;

/// Largest string a single length prefix can describe.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// A decoded control-channel payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub sub_channel: String,
    pub fields: Vec<String>,
}

impl ProtocolMessage {
    pub fn new(sub_channel: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            sub_channel: sub_channel.into(),
            fields,
        }
    }

    /// Serializes the message into payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Protocol`] if any string is longer than
    /// [`MAX_STRING_LEN`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, FleetError> {
        let capacity = 2 + self.sub_channel.len() + self.fields.iter().map(|f| 2 + f.len()).sum::<usize>();
        let mut buf = Vec::with_capacity(capacity);

        write_string(&mut buf, &self.sub_channel)?;
        for field in &self.fields {
            write_string(&mut buf, field)?;
        }

        Ok(buf)
    }

    /// Parses payload bytes, reading strings until the input is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Protocol`] for an empty payload, a truncated
    /// prefix or string, or bytes that are not valid UTF-8.
    pub fn decode(payload: &[u8]) -> Result<Self, FleetError> {
        let mut reader = FrameReader::new(payload);
        if reader.is_exhausted() {
            return Err(FleetError::Protocol("empty payload".to_string()));
        }

        let sub_channel = reader.read_string()?;
        let mut fields = Vec::new();
        while !reader.is_exhausted() {
            fields.push(reader.read_string()?);
        }

        Ok(Self { sub_channel, fields })
    }
}

/// Appends one length-prefixed string to `buf`.
pub fn write_string(buf: &mut Vec<u8>, value: &str) -> Result<(), FleetError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        FleetError::Protocol(format!(
            "string of {} bytes exceeds the {} byte limit",
            value.len(),
            MAX_STRING_LEN
        ))
    })?;

    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Cursor over a payload that yields length-prefixed strings.
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn read_string(&mut self) -> Result<String, FleetError> {
        let prefix = self.take(2)?;
        let len = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
        let bytes = self.take(len)?;

        String::from_utf8(bytes.to_vec())
            .map_err(|e| FleetError::Protocol(format!("invalid UTF-8 in field: {e}")))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FleetError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(FleetError::Protocol(format!(
                "truncated frame: needed {} bytes at offset {}, {} available",
                n,
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}
