//! HL7 v2.x grammar and MLLP framing.
//!
//! # Components
//!
//! - [`Field`], [`Segment`], [`Message`]: the pipe-delimited object model.
//! - [`SegmentBuilder`], [`AcknowledgementBuilder`]: construction helpers.
//! - [`Frame`], [`StreamParser`]: MLLP frame extraction from byte streams.
//! - [`MllpCodec`]: `tokio_util` codec for `Framed` TCP streams.
//!
//! # Example
//!
//! ```
//! use hl7link_protocol::Message;
//!
//! let message = Message::parse("MSH|^~\\&|LAB|HOSP|||20240315143000||ADT^A01|MSG001|P|2.3\rPID|1||12345");
//! assert_eq!(message.message_type(), Some("ADT^A01"));
//! assert_eq!(message.message_control_id(), Some("MSG001"));
//! assert_eq!(message.find_segment("PID").and_then(|s| s.field(3)), Some("12345"));
//! ```

pub mod builder;
pub mod codec;
pub mod delimiters;
pub mod field;
pub mod frame;
pub mod message;
pub mod segment;
pub mod stream_parser;

pub use builder::{AcknowledgementBuilder, SegmentBuilder};
pub use codec::MllpCodec;
pub use delimiters::Delimiters;
pub use field::Field;
pub use frame::{Frame, FrameMarkers};
pub use message::Message;
pub use segment::Segment;
pub use stream_parser::{DrainFrames, FrameExtractor, ParserState, StreamParser, split_framed_text};
