use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use hl7link_core::constants::COMPONENT_DELIMITER;

/// A field split into its components.
///
/// Components keep the position they had in the raw text (0-based) but empty
/// components are not stored, so `component` returns `None` for them. The raw
/// text is kept as-is and is what [`Field::as_str`] and `Display` return.
///
/// A `Field` is a read-only view built from a segment's field string; editing
/// components never writes back to the segment.
///
/// # Example
///
/// ```
/// use hl7link_protocol::Field;
///
/// let field = Field::parse("DOE^JOHN^^III");
/// assert_eq!(field.component(0), Some("DOE"));
/// assert_eq!(field.component(1), Some("JOHN"));
/// assert_eq!(field.component(2), None);
/// assert_eq!(field.component(3), Some("III"));
/// assert!(field.is_present());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    raw: String,
    components: BTreeMap<usize, String>,
}

impl Field {
    /// Parse with the default component delimiter (`^`).
    pub fn parse(raw: &str) -> Self {
        Self::parse_with(raw, COMPONENT_DELIMITER)
    }

    /// Parse with a custom component delimiter.
    pub fn parse_with(raw: &str, delimiter: char) -> Self {
        let components = raw
            .split(delimiter)
            .enumerate()
            .filter(|(_, value)| !value.is_empty())
            .map(|(index, value)| (index, value.to_string()))
            .collect();

        Self {
            raw: raw.to_string(),
            components,
        }
    }

    /// Component at `index`, or `None` when absent or empty.
    pub fn component(&self, index: usize) -> Option<&str> {
        self.components.get(&index).map(String::as_str)
    }

    /// Set a component. An empty value removes it.
    pub fn set_component(&mut self, index: usize, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.components.remove(&index);
        } else {
            self.components.insert(index, value);
        }
    }

    /// Non-empty components in index order.
    pub fn components(&self) -> impl Iterator<Item = (usize, &str)> {
        self.components.iter().map(|(i, v)| (*i, v.as_str()))
    }

    /// Number of stored (non-empty) components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// A field is present iff its raw text is non-empty.
    pub fn is_present(&self) -> bool {
        !self.raw.is_empty()
    }

    /// The raw text this field was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn into_string(self) -> String {
        self.raw
    }
}

impl FromStr for Field {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Field {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_components() {
        let field = Field::parse("ADT^A01");
        assert_eq!(field.component(0), Some("ADT"));
        assert_eq!(field.component(1), Some("A01"));
        assert_eq!(field.component(2), None);
        assert_eq!(field.len(), 2);
    }

    #[test]
    fn test_empty_components_not_stored() {
        let field = Field::parse("^^X^");
        assert_eq!(field.len(), 1);
        assert_eq!(field.component(0), None);
        assert_eq!(field.component(2), Some("X"));
        assert_eq!(field.as_str(), "^^X^");
    }

    #[rstest]
    #[case("", false)]
    #[case("^", true)]
    #[case("A", true)]
    fn test_presence(#[case] raw: &str, #[case] present: bool) {
        assert_eq!(Field::parse(raw).is_present(), present);
    }

    #[test]
    fn test_custom_delimiter() {
        let field = Field::parse_with("A&B", '&');
        assert_eq!(field.component(1), Some("B"));
    }

    #[test]
    fn test_set_component() {
        let mut field = Field::parse("A^B");
        field.set_component(5, "Z");
        field.set_component(0, "");
        assert_eq!(field.component(0), None);
        assert_eq!(field.component(5), Some("Z"));
        // raw text is unaffected
        assert_eq!(field.to_string(), "A^B");
    }

    #[test]
    fn test_from_str_and_display() {
        let field: Field = "X^Y".parse().unwrap();
        assert_eq!(field.to_string(), "X^Y");
        assert_eq!(
            field.components().collect::<Vec<_>>(),
            vec![(0, "X"), (1, "Y")]
        );
    }
}
