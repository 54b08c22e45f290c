//! Protocol constants shared by the grammar, codec and socket interfaces.
//!
//! # Wire Format
//!
//! HL7 v2.x messages travel over TCP wrapped in MLLP frames:
//!
//! ```text
//! <VT>MSH|^~\&|SENDER|...<CR>PID|...<CR><FS><CR>
//! ```
//!
//! Where:
//! - `<VT>` - Start block marker (0x0B)
//! - `<FS>` - End block marker (0x1C)
//! - `<CR>` - Frame terminator (0x0D), also the segment terminator inside the payload
//!
//! # Grammar
//!
//! | Delimiter | Name | Purpose | Example |
//! |-----------|------|---------|---------|
//! | `\r` | SEGMENT_TERMINATOR | Separates segments | `MSH|...\rPID|...` |
//! | `\|` | FIELD_DELIMITER | Separates fields of a segment | `PID|1||12345` |
//! | `^` | COMPONENT_DELIMITER | Separates components of a field | `ADT^A01` |
//!
//! # Usage
//!
//! ```
//! use hl7link_core::constants::*;
//!
//! assert_eq!(MLLP_START_BLOCK, 0x0B);
//! assert_eq!(FIELD_DELIMITER, '|');
//!
//! use std::time::Duration;
//! let retry = Duration::from_secs(DEFAULT_RETRY_DELAY_SECS);
//! assert_eq!(retry.as_secs(), 10);
//! ```

// ============================================================================
// MLLP Framing
// ============================================================================

/// Start block marker (VT).
///
/// ```text
/// <VT>MSH|...<FS><CR>
/// ^^^^
/// ```
pub const MLLP_START_BLOCK: u8 = 0x0B;

/// End block marker (FS).
///
/// ```text
/// <VT>MSH|...<FS><CR>
///            ^^^^
/// ```
pub const MLLP_END_BLOCK: u8 = 0x1C;

/// Frame terminator (CR), sent right after the end block marker.
pub const MLLP_TERMINATOR: u8 = 0x0D;

/// Upper bound on bytes buffered while waiting for a complete frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

// ============================================================================
// HL7 Grammar
// ============================================================================

/// Segment terminator inside an HL7 payload.
pub const SEGMENT_TERMINATOR: char = '\r';

/// Default separator used when serializing a message.
pub const DEFAULT_SEGMENT_SEPARATOR: &str = "\r";

/// Field delimiter, also the literal value of MSH-1.
pub const FIELD_DELIMITER: char = '|';

/// Component delimiter.
pub const COMPONENT_DELIMITER: char = '^';

/// Repetition, escape and subcomponent characters written to MSH-2 of
/// generated messages, after the component delimiter.
pub const ENCODING_CHARACTERS_TAIL: &str = "~\\&";

/// Name of the header segment.
pub const HEADER_SEGMENT: &str = "MSH";

/// Every segment name has exactly this many characters.
pub const SEGMENT_NAME_LEN: usize = 3;

// ============================================================================
// Header Field Positions
// ============================================================================

/// MSH-1: field separator (read-only).
pub const MSH_FIELD_SEPARATOR: usize = 1;

/// MSH-2: encoding characters.
pub const MSH_ENCODING_CHARACTERS: usize = 2;

/// MSH-7: date/time of message.
pub const MSH_DATE_TIME: usize = 7;

/// MSH-9: message type (e.g. `ADT^A01`).
pub const MSH_MESSAGE_TYPE: usize = 9;

/// MSH-10: message control ID.
pub const MSH_CONTROL_ID: usize = 10;

/// MSH-11: processing ID.
pub const MSH_PROCESSING_ID: usize = 11;

/// MSH-12: version ID.
pub const MSH_VERSION: usize = 12;

// ============================================================================
// Acknowledgements
// ============================================================================

/// Message type of generated acknowledgements.
pub const ACK_MESSAGE_TYPE: &str = "ACK";

/// Processing ID written to acknowledgements (production).
pub const ACK_PROCESSING_ID: &str = "P";

/// HL7 version written to acknowledgements unless configured otherwise.
pub const DEFAULT_ACK_VERSION: &str = "2.3";

/// Acknowledgement segment name.
pub const ACK_SEGMENT: &str = "MSA";

/// MSA-1 code for "application accept".
pub const ACK_CODE_ACCEPT: &str = "AA";

/// A reply containing this text counts as a positive acknowledgement.
pub const ACCEPTANCE_MARKER: &str = "MSA|AA";

// ============================================================================
// Timestamps
// ============================================================================

/// Default `chrono` format for generated HL7 timestamps.
///
/// Uses the 24-hour `%H`. Older deployments defaulted to a 12-hour `hh`
/// pattern, which drops the AM/PM distinction from MSH-7; set
/// `datetime_format` explicitly to reproduce it.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y%m%d%H%M%S";

// ============================================================================
// Statistics
// ============================================================================

/// Failure counter key used when no message type is known.
pub const FAILURE_KEY_ALL: &str = "ALL";

// ============================================================================
// Network Defaults
// ============================================================================

/// Conventional MLLP port.
pub const DEFAULT_MLLP_PORT: u16 = 2575;

/// Inbound: receive window after which a silent connection is recycled.
pub const DEFAULT_IDLE_WINDOW_SECS: u64 = 60;

/// Inbound: timeout for writing an acknowledgement.
pub const DEFAULT_ACK_SEND_TIMEOUT_SECS: u64 = 60;

/// Inbound: delay before re-binding after an address conflict.
pub const DEFAULT_BIND_RETRY_DELAY_SECS: u64 = 3;

/// Inbound: cap on the exponential bind backoff.
pub const MAX_BIND_RETRY_DELAY_SECS: u64 = 60;

/// Inbound: bind attempts before giving up.
pub const DEFAULT_MAX_BIND_RETRIES: u32 = 5;

/// Outbound: connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Outbound: send timeout.
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

/// Outbound: acknowledgement receive timeout.
pub const DEFAULT_RECEIVE_TIMEOUT_SECS: u64 = 10;

/// Outbound: wait after a failed delivery.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;

/// Outbound: wait while the queue is empty.
pub const DEFAULT_IDLE_DELAY_SECS: u64 = 1;

/// Outbound: maximum number of queued messages.
pub const DEFAULT_MAX_QUEUE_LEN: usize = 10_000;

/// File system: directory scan interval.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;

/// File system: suffix appended to files once processed.
pub const PROCESSED_SUFFIX: &str = ".processed";

/// Capacity of each interface event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_distinct() {
        assert_ne!(MLLP_START_BLOCK, MLLP_END_BLOCK);
        assert_ne!(MLLP_END_BLOCK, MLLP_TERMINATOR);
        assert_ne!(MLLP_START_BLOCK, MLLP_TERMINATOR);
    }

    #[test]
    fn test_acceptance_marker_matches_ack_layout() {
        let msa = format!("{ACK_SEGMENT}{FIELD_DELIMITER}{ACK_CODE_ACCEPT}");
        assert_eq!(msa, ACCEPTANCE_MARKER);
    }

    #[test]
    fn test_default_datetime_format_is_24_hour() {
        assert!(DEFAULT_DATETIME_FORMAT.contains("%H"));
        assert!(!DEFAULT_DATETIME_FORMAT.contains("%I"));
    }

    #[test]
    fn test_header_positions_ordered() {
        assert!(MSH_DATE_TIME < MSH_MESSAGE_TYPE);
        assert!(MSH_MESSAGE_TYPE < MSH_CONTROL_ID);
        assert!(MSH_CONTROL_ID < MSH_VERSION);
    }
}
