use chrono::{DateTime, Local};
use uuid::Uuid;

use hl7link_core::constants::{
    ACK_CODE_ACCEPT, ACK_MESSAGE_TYPE, ACK_PROCESSING_ID, ACK_SEGMENT, DEFAULT_ACK_VERSION,
    DEFAULT_DATETIME_FORMAT, ENCODING_CHARACTERS_TAIL, HEADER_SEGMENT, MSH_CONTROL_ID,
    MSH_DATE_TIME, MSH_ENCODING_CHARACTERS, MSH_MESSAGE_TYPE, MSH_PROCESSING_ID, MSH_VERSION,
};
use hl7link_core::format_hl7_datetime;

use crate::{Delimiters, Message, Segment};

/// Builder for segments with a fluent API
///
/// # Example
///
/// ```
/// use hl7link_protocol::SegmentBuilder;
///
/// let pid = SegmentBuilder::new("PID")
///     .field(1, "1")
///     .field(3, "12345")
///     .build();
/// assert_eq!(pid.serialize(), "PID|1||12345");
/// ```
#[derive(Debug, Clone)]
pub struct SegmentBuilder {
    segment: Segment,
}

impl SegmentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            segment: Segment::new(name),
        }
    }

    pub fn with_delimiters(name: impl Into<String>, delimiters: Delimiters) -> Self {
        Self {
            segment: Segment::with_delimiters(name, delimiters),
        }
    }

    /// Set field `index` (empty values leave it unset)
    pub fn field(mut self, index: usize, value: impl Into<String>) -> Self {
        self.segment.set_field(index, value);
        self
    }

    /// Set field `index` from components joined with the component delimiter
    pub fn components<I, S>(mut self, index: usize, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let delimiter = self.segment.delimiters().component;
        let mut value = String::new();
        for (i, component) in components.into_iter().enumerate() {
            if i > 0 {
                value.push(delimiter);
            }
            value.push_str(component.as_ref());
        }
        self.segment.set_field(index, value);
        self
    }

    pub fn build(self) -> Segment {
        self.segment
    }
}

/// Builds the positive acknowledgement sent for every accepted message.
///
/// ```text
/// MSH|^~\&|||||<now>||ACK|<uuid>|P|<version>
/// MSA|AA|<received control id>
/// ```
///
/// # Example
///
/// ```
/// use hl7link_protocol::AcknowledgementBuilder;
///
/// let ack = AcknowledgementBuilder::new().build(Some("MSG001"));
/// assert_eq!(ack.message_type(), Some("ACK"));
/// assert_eq!(ack.find_segment("MSA").and_then(|s| s.field(2)), Some("MSG001"));
/// ```
#[derive(Debug, Clone)]
pub struct AcknowledgementBuilder {
    datetime_format: String,
    version: String,
    delimiters: Delimiters,
}

impl AcknowledgementBuilder {
    pub fn new() -> Self {
        Self {
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            version: DEFAULT_ACK_VERSION.to_string(),
            delimiters: Delimiters::default(),
        }
    }

    /// `chrono` strftime format used for MSH-7
    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }

    /// Value written to MSH-12
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Acknowledge `control_id`, stamped now with a fresh control ID.
    pub fn build(&self, control_id: Option<&str>) -> Message {
        self.build_with(control_id, Local::now(), &Uuid::new_v4().to_string())
    }

    /// Acknowledge `control_id` with an explicit timestamp and own control ID.
    pub fn build_with(
        &self,
        control_id: Option<&str>,
        timestamp: DateTime<Local>,
        own_control_id: &str,
    ) -> Message {
        let encoding_characters =
            format!("{}{}", self.delimiters.component, ENCODING_CHARACTERS_TAIL);
        let msh = SegmentBuilder::with_delimiters(HEADER_SEGMENT, self.delimiters)
            .field(MSH_ENCODING_CHARACTERS, encoding_characters)
            .field(
                MSH_DATE_TIME,
                format_hl7_datetime(&timestamp, &self.datetime_format),
            )
            .field(MSH_MESSAGE_TYPE, ACK_MESSAGE_TYPE)
            .field(MSH_CONTROL_ID, own_control_id)
            .field(MSH_PROCESSING_ID, ACK_PROCESSING_ID)
            .field(MSH_VERSION, self.version.as_str())
            .build();

        let msa = SegmentBuilder::with_delimiters(ACK_SEGMENT, self.delimiters)
            .field(1, ACK_CODE_ACCEPT)
            .field(2, control_id.unwrap_or_default())
            .build();

        let mut ack = Message::new();
        ack.add(msh);
        ack.add(msa);
        ack
    }
}

impl Default for AcknowledgementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hl7link_core::constants::ACCEPTANCE_MARKER;

    #[test]
    fn test_segment_builder() {
        let seg = SegmentBuilder::new("PV1")
            .field(2, "I")
            .components(3, ["WARD", "101", "A"])
            .field(4, "")
            .build();
        assert_eq!(seg.serialize(), "PV1||I|WARD^101^A");
    }

    #[test]
    fn test_ack_layout() {
        let timestamp = Local.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();
        let ack = AcknowledgementBuilder::new().build_with(Some("MSG001"), timestamp, "ACK-1");

        assert_eq!(
            ack.serialize(),
            "MSH|^~\\&|||||20240315143000||ACK|ACK-1|P|2.3\rMSA|AA|MSG001"
        );
        assert!(ack.serialize().contains(ACCEPTANCE_MARKER));
    }

    #[test]
    fn test_ack_encoding_characters_follow_delimiters() {
        let timestamp = Local.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();
        let ack = AcknowledgementBuilder::new()
            .delimiters(Delimiters::new('|', '#'))
            .build_with(Some("MSG001"), timestamp, "ACK-1");

        assert_eq!(ack.header().unwrap().field(2), Some("#~\\&"));
        assert!(ack.serialize().starts_with("MSH|#~\\&|"));
    }

    #[test]
    fn test_ack_echoes_control_id() {
        let ack = AcknowledgementBuilder::new().build(Some("CTRL123"));
        let msa = ack.find_segment("MSA").unwrap();
        assert_eq!(msa.field(1), Some("AA"));
        assert_eq!(msa.field(2), Some("CTRL123"));
        assert_eq!(ack.message_type(), Some("ACK"));
        assert_eq!(ack.version(), Some("2.3"));
    }

    #[test]
    fn test_ack_control_ids_unique() {
        let builder = AcknowledgementBuilder::new();
        let a = builder.build(Some("X"));
        let b = builder.build(Some("X"));
        assert_ne!(a.message_control_id(), b.message_control_id());
        assert!(Uuid::parse_str(a.message_control_id().unwrap()).is_ok());
    }

    #[test]
    fn test_ack_without_control_id() {
        let ack = AcknowledgementBuilder::new().build(None);
        assert_eq!(ack.find_segment("MSA").unwrap().serialize(), "MSA|AA");
    }

    #[test]
    fn test_ack_custom_version_and_format() {
        let timestamp = Local.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();
        let ack = AcknowledgementBuilder::new()
            .version("2.5.1")
            .datetime_format("%Y%m%d%H%M")
            .build_with(Some("1"), timestamp, "2");
        assert_eq!(ack.version(), Some("2.5.1"));
        assert_eq!(ack.header().unwrap().field(7), Some("202403151430"));
    }
}
