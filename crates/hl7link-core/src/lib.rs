//! Shared building blocks for the hl7link workspace.
//!
//! This crate holds everything the grammar, codec and network layers agree on:
//!
//! - [`constants`]: MLLP markers, HL7 delimiters, header field positions and
//!   the default timings used by the socket interfaces.
//! - [`error`]: the workspace-wide [`Error`] type and [`Result`] alias.
//! - [`datetime`]: parsing and formatting of HL7 `TS` timestamps.
//! - [`statistics`]: the thread-safe counters every interface reports into.

pub mod constants;
pub mod datetime;
pub mod error;
pub mod statistics;

pub use datetime::{format_hl7_datetime, parse_hl7_datetime};
pub use error::{Error, Result};
pub use statistics::{InterfaceStatistics, StatisticsSnapshot};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
