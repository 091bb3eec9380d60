//! Utility modules for hostpulse.

mod time_parser;

pub use time_parser::{MalformedTimestamp, format_instant, normalize_timestamp};
