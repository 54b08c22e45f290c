use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

use hl7link_core::constants::{MLLP_END_BLOCK, MLLP_START_BLOCK, MLLP_TERMINATOR};
use hl7link_core::{Error, Result};

use crate::{Delimiters, Message};

/// Byte values delimiting an MLLP frame.
///
/// ```text
/// <start> payload <end><terminator>
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameMarkers {
    /// Start block (default `0x0B`)
    pub start: u8,
    /// End block (default `0x1C`)
    pub end: u8,
    /// Byte sent after the end block (default `0x0D`)
    pub terminator: u8,
}

impl FrameMarkers {
    pub const fn new(start: u8, end: u8, terminator: u8) -> Self {
        Self {
            start,
            end,
            terminator,
        }
    }

    /// Wrap `payload` in start/end/terminator bytes.
    pub fn wrap(&self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(payload.len() + 3);
        self.wrap_into(payload, &mut buf);
        buf.freeze()
    }

    /// Append the framed `payload` to `dst`.
    pub fn wrap_into(&self, payload: &[u8], dst: &mut BytesMut) {
        dst.reserve(payload.len() + 3);
        dst.put_u8(self.start);
        dst.put_slice(payload);
        dst.put_u8(self.end);
        dst.put_u8(self.terminator);
    }
}

impl Default for FrameMarkers {
    fn default() -> Self {
        Self::new(MLLP_START_BLOCK, MLLP_END_BLOCK, MLLP_TERMINATOR)
    }
}

/// The payload of one MLLP frame, without markers.
///
/// Frames come out of [`StreamParser`](crate::StreamParser) and
/// [`MllpCodec`](crate::MllpCodec); converting to text is strict UTF-8 so
/// that a garbled payload surfaces as [`Error::MalformedFrame`].
///
/// # Example
///
/// ```
/// use hl7link_protocol::{Frame, FrameMarkers};
///
/// let frame = Frame::from_text("MSH|^~\\&|A");
/// let wire = frame.to_wire(&FrameMarkers::default());
/// assert_eq!(wire[0], 0x0B);
/// assert_eq!(&wire[wire.len() - 2..], &[0x1C, 0x0D]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Frame holding the serialized `message`.
    pub fn from_message(message: &Message) -> Self {
        Self::new(Bytes::from(message.serialize()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the payload as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the payload is not valid UTF-8.
    pub fn to_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.data)
            .map_err(|e| Error::malformed(format!("payload is not valid UTF-8: {e}")))
    }

    /// Decode and parse the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the payload is not valid UTF-8.
    pub fn to_message(&self, delimiters: Delimiters) -> Result<Message> {
        Ok(Message::parse_with(self.to_text()?, delimiters))
    }

    /// Whether the payload contains `needle` (lossy, for acknowledgement checks).
    pub fn contains(&self, needle: &str) -> bool {
        String::from_utf8_lossy(&self.data).contains(needle)
    }

    /// Bytes ready to write on the socket.
    pub fn to_wire(&self, markers: &FrameMarkers) -> Bytes {
        markers.wrap(&self.data)
    }
}

impl From<&Message> for Frame {
    fn from(message: &Message) -> Self {
        Self::from_message(message)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.data))
    }
}
