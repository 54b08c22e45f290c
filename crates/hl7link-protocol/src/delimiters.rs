use hl7link_core::constants::{COMPONENT_DELIMITER, FIELD_DELIMITER};
use serde::{Deserialize, Serialize};

/// Field and component delimiters used to parse and serialize a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delimiters {
    /// Separates fields within a segment (default `|`).
    pub field: char,
    /// Separates components within a field (default `^`).
    pub component: char,
}

impl Delimiters {
    pub const fn new(field: char, component: char) -> Self {
        Self { field, component }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::new(FIELD_DELIMITER, COMPONENT_DELIMITER)
    }
}
