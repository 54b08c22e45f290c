use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use hl7link_core::constants::{HEADER_SEGMENT, MSH_FIELD_SEPARATOR};

use crate::{Delimiters, Field};

/// One line of an HL7 message: a 3-letter name followed by numbered fields.
///
/// Fields are stored sparsely by index; index 0 is the segment name. Unset and
/// empty fields read as `None` and serialize as empty slots.
///
/// The header segment (`MSH`) is special: field 1 *is* the field delimiter, so
/// it always reads back as the delimiter and cannot be overwritten, and the
/// token following the name on the wire is MSH-2.
///
/// # Example
///
/// ```
/// use hl7link_protocol::Segment;
///
/// let msh = Segment::parse("MSH|^~\\&|APP");
/// assert_eq!(msh.field(1), Some("|"));
/// assert_eq!(msh.field(2), Some("^~\\&"));
/// assert_eq!(msh.field(3), Some("APP"));
/// assert_eq!(msh.serialize(), "MSH|^~\\&|APP");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    fields: BTreeMap<usize, String>,
    delimiters: Delimiters,
}

impl Segment {
    /// Create an empty segment named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_delimiters(name, Delimiters::default())
    }

    pub fn with_delimiters(name: impl Into<String>, delimiters: Delimiters) -> Self {
        let mut segment = Self {
            fields: BTreeMap::new(),
            delimiters,
        };
        segment.set_field(0, name);
        segment
    }

    /// Parse one segment line with the default delimiters.
    pub fn parse(text: &str) -> Self {
        Self::parse_with(text, Delimiters::default())
    }

    /// Parse one segment line.
    ///
    /// Leading and trailing field delimiters are ignored. Parsing never fails:
    /// text without a name yields a segment whose [`name`](Self::name) is empty.
    pub fn parse_with(text: &str, delimiters: Delimiters) -> Self {
        let mut segment = Self {
            fields: BTreeMap::new(),
            delimiters,
        };

        let mut tokens = text.trim_matches(delimiters.field).split(delimiters.field);
        let name = tokens.next().unwrap_or_default();
        segment.set_field(0, name);

        // MSH-1 is the delimiter itself, so the first token after the name is MSH-2
        let first = if name == HEADER_SEGMENT { 2 } else { 1 };
        for (index, token) in (first..).zip(tokens) {
            segment.set_field(index, token);
        }
        segment
    }

    /// Segment name, or `""` when none was set.
    pub fn name(&self) -> &str {
        self.fields.get(&0).map_or("", String::as_str)
    }

    pub fn is_header(&self) -> bool {
        self.name() == HEADER_SEGMENT
    }

    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }

    /// Raw text of field `index`, or `None` if unset.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(&index).map(String::as_str)
    }

    /// Field `index` split into components. Unset fields give an empty view.
    pub fn field_components(&self, index: usize) -> Field {
        Field::parse_with(self.field(index).unwrap_or_default(), self.delimiters.component)
    }

    /// Set field `index`. An empty value removes the field; MSH-1 is never
    /// changed.
    pub fn set_field(&mut self, index: usize, value: impl Into<String>) {
        if index == MSH_FIELD_SEPARATOR && self.is_header() {
            return;
        }
        let value = value.into();
        if index == 0 {
            // MSH-1 is stored as the literal delimiter while the segment is a header
            if value == HEADER_SEGMENT {
                self.fields
                    .insert(MSH_FIELD_SEPARATOR, self.delimiters.field.to_string());
            } else if self.is_header() {
                self.fields.remove(&MSH_FIELD_SEPARATOR);
            }
        }
        if value.is_empty() {
            self.fields.remove(&index);
        } else {
            self.fields.insert(index, value);
        }
    }

    /// Highest index with a value (0 for a name-only segment).
    pub fn max_index(&self) -> usize {
        self.fields.keys().next_back().copied().unwrap_or(0)
    }

    /// Render back to wire text with this segment's field delimiter.
    pub fn serialize(&self) -> String {
        let delimiter = self.delimiters.field;
        let max = self.max_index();
        let mut out = String::with_capacity(self.fields.values().map(|v| v.len() + 1).sum());

        out.push_str(self.name());
        if self.is_header() {
            out.push(delimiter);
            for index in 2..=max {
                if index > 2 {
                    out.push(delimiter);
                }
                out.push_str(self.field(index).unwrap_or_default());
            }
        } else {
            for index in 1..=max {
                out.push(delimiter);
                out.push_str(self.field(index).unwrap_or_default());
            }
        }
        out
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_regular_segment() {
        let pid = Segment::parse("PID|1||12345^^^HOSP||DOE^JOHN");
        assert_eq!(pid.name(), "PID");
        assert_eq!(pid.field(1), Some("1"));
        assert_eq!(pid.field(2), None);
        assert_eq!(pid.field(3), Some("12345^^^HOSP"));
        assert_eq!(pid.field(5), Some("DOE^JOHN"));
        assert_eq!(pid.field(6), None);
    }

    #[test]
    fn test_header_field_one_is_delimiter() {
        let mut msh = Segment::parse("MSH|^~\\&|APP|FAC");
        assert_eq!(msh.field(1), Some("|"));
        msh.set_field(1, "X");
        assert_eq!(msh.field(1), Some("|"));
        assert_eq!(msh.serialize(), "MSH|^~\\&|APP|FAC");
    }

    #[test]
    fn test_only_leading_msh_shifts_indices() {
        let seg = Segment::parse("ZZZ|MSH|A");
        assert_eq!(seg.field(1), Some("MSH"));
        assert_eq!(seg.field(2), Some("A"));
    }

    #[test]
    fn test_set_empty_removes() {
        let mut seg = Segment::parse("PID|1|2|3");
        seg.set_field(3, "");
        assert_eq!(seg.field(3), None);
        assert_eq!(seg.serialize(), "PID|1|2");
    }

    #[test]
    fn test_serialize_fills_gaps() {
        let mut seg = Segment::new("OBX");
        seg.set_field(5, "VALUE");
        assert_eq!(seg.serialize(), "OBX|||||VALUE");
    }

    #[rstest]
    #[case("PID|1||12345")]
    #[case("MSH|^~\\&|LAB|HOSP|||20240315143000||ADT^A01|MSG001|P|2.3")]
    #[case("EVN|A01|20240315143000")]
    #[case("NTE")]
    fn test_parse_serialize_preserves_text(#[case] text: &str) {
        assert_eq!(Segment::parse(text).serialize(), text);
    }

    #[test]
    fn test_trailing_delimiters_trimmed() {
        assert_eq!(Segment::parse("PID|1|||").serialize(), "PID|1");
    }

    #[test]
    fn test_header_name_only() {
        assert_eq!(Segment::new("MSH").serialize(), "MSH|");
    }

    #[test]
    fn test_empty_text() {
        let seg = Segment::parse("");
        assert_eq!(seg.name(), "");
        assert_eq!(seg.max_index(), 0);
    }

    #[test]
    fn test_custom_delimiters() {
        let delimiters = Delimiters::new('#', '&');
        let seg = Segment::parse_with("MSH#A&B#C", delimiters);
        assert_eq!(seg.field(1), Some("#"));
        assert_eq!(seg.field(2), Some("A&B"));
        assert_eq!(seg.field_components(2).component(1), Some("B"));
        assert_eq!(seg.serialize(), "MSH#A&B#C");
    }

    #[test]
    fn test_renaming_header_drops_separator() {
        let mut seg = Segment::parse("MSH|^~\\&|APP");
        seg.set_field(0, "ZMS");
        assert_eq!(seg.field(1), None);
        assert_eq!(seg.serialize(), "ZMS||^~\\&|APP");
    }

    #[test]
    fn test_field_components_of_unset_field() {
        let seg = Segment::new("PV1");
        assert!(!seg.field_components(3).is_present());
    }
}
