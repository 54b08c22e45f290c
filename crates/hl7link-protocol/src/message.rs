use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use hl7link_core::constants::{
    DEFAULT_SEGMENT_SEPARATOR, MSH_CONTROL_ID, MSH_DATE_TIME, MSH_MESSAGE_TYPE, MSH_VERSION,
    SEGMENT_NAME_LEN, SEGMENT_TERMINATOR,
};
use hl7link_core::{Error, Result, parse_hl7_datetime};

use crate::{Delimiters, Segment};

/// An HL7 message: segments in wire order.
///
/// Parsing is total. Lines that do not start with a 3-character segment name
/// are dropped, everything else is kept in order. Header accessors read the
/// first segment when it is `MSH` and return `None` otherwise.
///
/// # Example
///
/// ```
/// use hl7link_protocol::Message;
///
/// let text = "MSH|^~\\&|LAB|HOSP|||20240315143000||ORU^R01|CTRL9|P|2.3\rOBX|1|NM|GLU||105\rOBX|2|NM|NA||140";
/// let message = Message::parse(text);
///
/// assert_eq!(message.message_type(), Some("ORU^R01"));
/// assert_eq!(message.find_segments("OBX").len(), 2);
/// assert_eq!(message.serialize(), text);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    segments: Vec<Segment>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse with the default delimiters.
    pub fn parse(text: &str) -> Self {
        Self::parse_with(text, Delimiters::default())
    }

    /// Parse `text`, splitting segments on `\r` and tolerating `\n` around
    /// each segment.
    pub fn parse_with(text: &str, delimiters: Delimiters) -> Self {
        let mut message = Self::new();
        for line in text.split(SEGMENT_TERMINATOR) {
            message.add(Segment::parse_with(line.trim_matches('\n'), delimiters));
        }
        message
    }

    /// Append `segment` if its name has exactly three characters.
    ///
    /// Returns whether the segment was added.
    pub fn add(&mut self, segment: Segment) -> bool {
        if segment.name().chars().count() != SEGMENT_NAME_LEN {
            return false;
        }
        self.segments.push(segment);
        true
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// The `MSH` segment, when it is the first segment.
    pub fn header(&self) -> Option<&Segment> {
        self.segments.first().filter(|s| s.is_header())
    }

    /// MSH-9, e.g. `ADT^A01`.
    pub fn message_type(&self) -> Option<&str> {
        self.header_field(MSH_MESSAGE_TYPE)
    }

    /// MSH-10.
    pub fn message_control_id(&self) -> Option<&str> {
        self.header_field(MSH_CONTROL_ID)
    }

    /// MSH-12.
    pub fn version(&self) -> Option<&str> {
        self.header_field(MSH_VERSION)
    }

    /// MSH-7 parsed with [`parse_hl7_datetime`].
    pub fn message_date_time(&self) -> Option<DateTime<Local>> {
        self.header_field(MSH_DATE_TIME).and_then(parse_hl7_datetime)
    }

    fn header_field(&self, index: usize) -> Option<&str> {
        self.header().and_then(|msh| msh.field(index))
    }

    /// First segment named `name`.
    pub fn find_segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name() == name)
    }

    pub fn find_segment_mut(&mut self, name: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.name() == name)
    }

    /// All segments named `name`, in message order.
    pub fn find_segments(&self, name: &str) -> Vec<&Segment> {
        self.segments.iter().filter(|s| s.name() == name).collect()
    }

    /// Nearest segment named `name` before `current`.
    ///
    /// `current` must be a reference into this message; an equal segment
    /// owned elsewhere is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReference`] if `current` is not part of this
    /// message.
    pub fn find_previous_segment(&self, name: &str, current: &Segment) -> Result<Option<&Segment>> {
        let position = self.position_of(current)?;
        Ok(self.segments[..position]
            .iter()
            .rev()
            .find(|s| s.name() == name))
    }

    /// Nearest segment named `name` after `current`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReference`] if `current` is not part of this
    /// message.
    pub fn find_next_segment(&self, name: &str, current: &Segment) -> Result<Option<&Segment>> {
        let position = self.position_of(current)?;
        Ok(self.segments[position + 1..]
            .iter()
            .find(|s| s.name() == name))
    }

    fn position_of(&self, current: &Segment) -> Result<usize> {
        self.segments
            .iter()
            .position(|s| std::ptr::eq(s, current))
            .ok_or_else(|| Error::InvalidReference {
                name: current.name().to_string(),
            })
    }

    /// Serialize with `\r` between segments.
    pub fn serialize(&self) -> String {
        self.serialize_with(DEFAULT_SEGMENT_SEPARATOR)
    }

    /// Serialize with a custom segment separator. Trailing `\r`/`\n` are
    /// trimmed.
    pub fn serialize_with(&self, separator: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&segment.serialize());
            out.push_str(separator);
        }
        let trimmed = out.trim_end_matches(['\r', '\n']).len();
        out.truncate(trimmed);
        out
    }
}

impl FromStr for Message {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
