//! Tokio codec for MLLP framing.
//!
//! [`MllpCodec`] plugs frame extraction into `tokio_util`'s [`Framed`] so that
//! a TCP stream reads as a stream of [`Frame`]s and accepts [`Message`]s or
//! [`Frame`]s as a sink.
//!
//! ```text
//! TCP Stream -> Decoder -> Frame (payload only)
//! Message / Frame -> Encoder -> TCP Stream (<VT> payload <FS><CR>)
//! ```
//!
//! Decoding yields raw frames rather than parsed messages: a payload that is
//! not valid UTF-8 is the caller's malformed-frame case and must not tear down
//! the stream.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use hl7link_protocol::{Delimiters, Message, MllpCodec};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> hl7link_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:2575").await?;
//! let mut framed = Framed::new(stream, MllpCodec::new());
//!
//! framed.send(Message::parse("MSH|^~\\&|A|B|||20240315143000||ADT^A01|1|P|2.3")).await?;
//!
//! if let Some(Ok(reply)) = framed.next().await {
//!     let ack = reply.to_message(Delimiters::default())?;
//!     println!("ack for {:?}", ack.find_segment("MSA"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`Framed`]: tokio_util::codec::Framed

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use hl7link_core::constants::DEFAULT_MAX_FRAME_SIZE;
use hl7link_core::{Error, Result};

use crate::stream_parser::FrameExtractor;
use crate::{Frame, FrameMarkers, Message};

/// Tokio codec for MLLP frames.
#[derive(Debug, Clone)]
pub struct MllpCodec {
    extractor: FrameExtractor,

    /// Bytes allowed to accumulate without a complete frame.
    max_frame_size: usize,
}

impl MllpCodec {
    /// Codec with the default markers and frame size limit.
    pub fn new() -> Self {
        Self::with_markers(FrameMarkers::default())
    }

    pub fn with_markers(markers: FrameMarkers) -> Self {
        Self {
            extractor: FrameExtractor::new(markers),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Override the frame size limit.
    ///
    /// # Example
    ///
    /// ```
    /// use hl7link_protocol::MllpCodec;
    ///
    /// let codec = MllpCodec::new().with_max_frame_size(64 * 1024);
    /// assert_eq!(codec.max_frame_size(), 64 * 1024);
    /// ```
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn markers(&self) -> FrameMarkers {
        self.extractor.markers()
    }
}

impl Default for MllpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MllpCodec {
    type Item = Frame;
    type Error = Error;

    /// Extract the next frame from `src`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] when more than `max_frame_size` bytes
    /// are buffered without completing a frame.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.extractor.extract(src) {
            return Ok(Some(frame));
        }

        if src.len() > self.max_frame_size {
            let size = src.len();
            src.clear();
            self.extractor.reset();
            return Err(Error::FrameTooLarge {
                size,
                max_size: self.max_frame_size,
            });
        }

        Ok(None)
    }

    /// Like `decode`, but an unfinished frame at end of stream is dropped
    /// instead of reported.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for MllpCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        self.markers().wrap_into(item.as_bytes(), dst);
        Ok(())
    }
}

impl Encoder<Message> for MllpCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        self.markers().wrap_into(item.serialize().as_bytes(), dst);
        Ok(())
    }
}
