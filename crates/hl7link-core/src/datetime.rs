//! HL7 `TS` timestamp helpers.
//!
//! Received timestamps are accepted in three shapes, tried in order:
//!
//! | Format | Example | Interpretation |
//! |--------|---------|----------------|
//! | `yyyyMMddHHmmss±zzzz` | `20240315143000+0100` | explicit UTC offset |
//! | `yyyyMMddHHmmss` | `20240315143000` | local time |
//! | `yyyyMMddHHmm` | `202403151430` | local time |
//!
//! Generated timestamps use a `chrono` strftime format, [`DEFAULT_DATETIME_FORMAT`]
//! unless an interface is configured otherwise.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::fmt::Display;

use crate::constants::DEFAULT_DATETIME_FORMAT;

const FORMAT_WITH_OFFSET: &str = "%Y%m%d%H%M%S%z";
const FORMAT_SECONDS: &str = "%Y%m%d%H%M%S";
const FORMAT_MINUTES: &str = "%Y%m%d%H%M";

/// Parse an HL7 timestamp.
///
/// Returns `None` when the text matches none of the accepted formats, or when
/// a local time does not exist (DST gap). Ambiguous local times resolve to the
/// earlier instant.
///
/// # Example
///
/// ```
/// use hl7link_core::parse_hl7_datetime;
///
/// assert!(parse_hl7_datetime("20240315143000").is_some());
/// assert!(parse_hl7_datetime("20240315143000+0000").is_some());
/// assert!(parse_hl7_datetime("not a date").is_none());
/// ```
pub fn parse_hl7_datetime(text: &str) -> Option<DateTime<Local>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_str(text, FORMAT_WITH_OFFSET) {
        return Some(dt.with_timezone(&Local));
    }

    [FORMAT_SECONDS, FORMAT_MINUTES].iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
    })
}

/// Format a timestamp for an outgoing message.
///
/// `format` uses `chrono` strftime syntax. A format `chrono` cannot interpret
/// falls back to [`DEFAULT_DATETIME_FORMAT`].
pub fn format_hl7_datetime<Tz>(dt: &DateTime<Tz>, format: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let format = if is_valid_format(format) {
        format
    } else {
        DEFAULT_DATETIME_FORMAT
    };
    dt.format(format).to_string()
}

/// Returns `true` if `chrono` can render `format`.
pub fn is_valid_format(format: &str) -> bool {
    !format.is_empty() && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Utc};
    use rstest::rstest;

    #[rstest]
    #[case("20240315143000", 14, 30, 0)]
    #[case("202403151430", 14, 30, 0)]
    #[case("20241231235959", 23, 59, 59)]
    fn test_parse_local_formats(
        #[case] input: &str,
        #[case] hour: u32,
        #[case] minute: u32,
        #[case] second: u32,
    ) {
        let dt = parse_hl7_datetime(input).unwrap();
        assert_eq!(dt.hour(), hour);
        assert_eq!(dt.minute(), minute);
        assert_eq!(dt.second(), second);
    }

    #[rstest]
    #[case("20240315143000+0000")]
    #[case("20240315153000+0100")]
    #[case("20240315093000-0500")]
    fn test_parse_with_offset_normalizes_instant(#[case] input: &str) {
        let dt = parse_hl7_datetime(input).unwrap().with_timezone(&Utc);
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 14);
        assert_eq!(dt.minute(), 30);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("2024")]
    #[case("20241315143000")]
    #[case("yesterday")]
    #[case("2024031514")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(parse_hl7_datetime(input).is_none());
    }

    #[test]
    fn test_format_default_is_24_hour() {
        let dt = Local.with_ymd_and_hms(2024, 3, 15, 17, 5, 9).unwrap();
        assert_eq!(
            format_hl7_datetime(&dt, DEFAULT_DATETIME_FORMAT),
            "20240315170509"
        );
    }

    #[test]
    fn test_format_custom() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 15, 17, 5, 9).unwrap();
        assert_eq!(format_hl7_datetime(&dt, "%Y-%m-%d"), "2024-03-15");
    }

    #[test]
    fn test_format_invalid_falls_back() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 15, 17, 5, 9).unwrap();
        assert_eq!(format_hl7_datetime(&dt, "%Q"), "20240315170509");
        assert_eq!(format_hl7_datetime(&dt, ""), "20240315170509");
    }

    #[test]
    fn test_format_then_parse() {
        let dt = Local.with_ymd_and_hms(2023, 11, 2, 8, 45, 0).unwrap();
        let text = format_hl7_datetime(&dt, DEFAULT_DATETIME_FORMAT);
        assert_eq!(parse_hl7_datetime(&text), Some(dt));
    }
}
