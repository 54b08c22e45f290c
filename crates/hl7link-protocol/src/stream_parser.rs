//! MLLP frame extraction from TCP byte streams.
//!
//! TCP has no message boundaries: one read may hold part of a frame, several
//! frames, or noise between frames. [`StreamParser`] accumulates bytes and
//! cuts complete frames out of the front of its buffer.
//!
//! # Frame Boundaries
//!
//! ```text
//!  noise  <VT> payload <FS><CR>  <VT> partial...
//!  ^^^^^^^^^^^^^^^^^^^^^^^^^^^^  ^^^^^^^^^^^^^^^^
//!  consumed by one extraction    left in the buffer untouched
//! ```
//!
//! 1. Find the first start byte. None: the buffer is incomplete.
//! 2. Find the first end byte after it. None: the buffer is incomplete.
//! 3. The payload is everything strictly between the two.
//! 4. Consume up to and including the end byte, and the terminator if it
//!    immediately follows. Everything after stays buffered.
//!
//! Nothing is discarded while a frame is incomplete, so feeding a stream in
//! arbitrary chunks yields the same frames as feeding it at once.
//!
//! # Usage
//!
//! ```
//! use hl7link_protocol::StreamParser;
//!
//! let mut parser = StreamParser::new();
//! parser.feed(&[0x0B, b'M', b'S', b'H']);
//! assert!(parser.next_frame().is_none());
//!
//! parser.feed(&[b'|', 0x1C, 0x0D]);
//! let frame = parser.next_frame().unwrap();
//! assert_eq!(frame.to_text().unwrap(), "MSH|");
//! assert_eq!(parser.buffered(), 0);
//! ```

use bytes::{Buf, BytesMut};
use std::collections::VecDeque;

use hl7link_core::constants::DEFAULT_MAX_FRAME_SIZE;

use crate::frame::{Frame, FrameMarkers};

/// Initial buffer capacity for incoming TCP data.
const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Where the parser stands relative to the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// No start byte buffered.
    WaitingStart,
    /// A start byte is buffered but its end byte has not arrived.
    ReadingPayload,
}

/// Cut one complete frame from the front of `buffer`.
///
/// Returns `None` and leaves `buffer` untouched when no complete frame is
/// buffered.
pub fn extract_frame(buffer: &mut BytesMut, markers: &FrameMarkers) -> Option<Frame> {
    cut_frame(buffer, markers).map(|(frame, _)| frame)
}

/// Returns the frame and whether its terminator was consumed with it.
fn cut_frame(buffer: &mut BytesMut, markers: &FrameMarkers) -> Option<(Frame, bool)> {
    let start = buffer.iter().position(|&b| b == markers.start)?;
    let end = start
        + 1
        + buffer[start + 1..]
            .iter()
            .position(|&b| b == markers.end)?;

    let consumed = buffer.split_to(end + 1).freeze();
    let terminated = buffer.first() == Some(&markers.terminator);
    if terminated {
        buffer.advance(1);
    }

    Some((Frame::new(consumed.slice(start + 1..end)), terminated))
}

/// Frame extraction across reads.
///
/// Unlike [`extract_frame`], this remembers a frame whose end byte was the
/// last byte read, so a terminator arriving at the start of the next read is
/// consumed instead of lingering in the buffer.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    markers: FrameMarkers,
    awaiting_terminator: bool,
}

impl FrameExtractor {
    pub fn new(markers: FrameMarkers) -> Self {
        Self {
            markers,
            awaiting_terminator: false,
        }
    }

    pub fn markers(&self) -> FrameMarkers {
        self.markers
    }

    /// Cut the next complete frame from `buffer`.
    pub fn extract(&mut self, buffer: &mut BytesMut) -> Option<Frame> {
        if self.awaiting_terminator && !buffer.is_empty() {
            if buffer[0] == self.markers.terminator {
                buffer.advance(1);
            }
            self.awaiting_terminator = false;
        }

        let (frame, terminated) = cut_frame(buffer, &self.markers)?;
        self.awaiting_terminator = !terminated && buffer.is_empty();
        Some(frame)
    }

    pub fn reset(&mut self) {
        self.awaiting_terminator = false;
    }
}

/// Split text holding zero or more framed messages (e.g. a file dump).
///
/// Pieces between start and end markers are returned in order; whitespace-only
/// pieces, such as the terminators between frames, are skipped. Text without
/// any markers is returned as a single piece.
pub fn split_framed_text<'a>(text: &'a str, markers: &FrameMarkers) -> Vec<&'a str> {
    let start = char::from(markers.start);
    let end = char::from(markers.end);
    text.split([start, end])
        .filter(|piece| !piece.trim().is_empty())
        .collect()
}

/// Stateful MLLP parser for partial TCP reads.
///
/// # Example
///
/// ```
/// use hl7link_protocol::{StreamParser, ParserState};
///
/// let mut parser = StreamParser::new();
/// parser.feed(b"\x0BMSH|1\x1C\r\x0BMSH|2\x1C\r\x0BMSH|3");
///
/// let texts: Vec<String> = parser.drain_frames().map(|f| f.to_string()).collect();
/// assert_eq!(texts, ["MSH|1", "MSH|2"]);
/// assert_eq!(parser.state(), ParserState::ReadingPayload);
/// ```
#[derive(Debug)]
pub struct StreamParser {
    /// Bytes not yet part of an extracted frame.
    buffer: BytesMut,

    extractor: FrameExtractor,

    /// Complete frames waiting to be taken.
    frames: VecDeque<Frame>,

    /// Buffered bytes allowed while no frame completes.
    max_buffer_size: usize,
}

impl StreamParser {
    /// Create a parser for the default MLLP markers.
    pub fn new() -> Self {
        Self::with_markers(FrameMarkers::default())
    }

    pub fn with_markers(markers: FrameMarkers) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            extractor: FrameExtractor::new(markers),
            frames: VecDeque::new(),
            max_buffer_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Limit how many bytes may accumulate without completing a frame.
    ///
    /// Past the limit the buffer is dropped and parsing restarts with the next
    /// start byte.
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    pub fn markers(&self) -> FrameMarkers {
        self.extractor.markers()
    }

    /// Append bytes and extract every frame they complete.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while let Some(frame) = self.extractor.extract(&mut self.buffer) {
            self.frames.push_back(frame);
        }

        if self.buffer.len() > self.max_buffer_size {
            self.buffer.clear();
            self.extractor.reset();
        }
    }

    /// Take the oldest complete frame.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    /// Bytes buffered towards the next frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The buffered residual, exactly as received.
    pub fn residual(&self) -> &[u8] {
        &self.buffer
    }

    pub fn state(&self) -> ParserState {
        if self.buffer.contains(&self.markers().start) {
            ParserState::ReadingPayload
        } else {
            ParserState::WaitingStart
        }
    }

    /// Drop buffered bytes and queued frames.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
        self.extractor.reset();
    }

    /// Iterate over and remove all queued frames.
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { parser: self }
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`StreamParser::drain_frames`].
pub struct DrainFrames<'a> {
    parser: &'a mut StreamParser,
}

impl Iterator for DrainFrames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.parser.frames_available();
        (len, Some(len))
    }
}

impl ExactSizeIterator for DrainFrames<'_> {}
