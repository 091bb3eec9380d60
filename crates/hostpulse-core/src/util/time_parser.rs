//! Timestamp normalization for snapshots served by the remote service.
//!
//! The service persists timestamps in a store that drops zone information, so
//! the same instant may arrive as `2024-01-01T00:00:00Z`,
//! `2024-01-01T00:00:00+00:00` or the naive `2024-01-01T00:00:00`. Naive values
//! are UTC.
//!
//! A string counts as zoned when it contains `Z` or `+`. A negative offset
//! such as `-05:00` is therefore not recognized, gets a `Z` appended and fails
//! to parse.

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// A timestamp that could not be turned into an instant.
///
/// Recoverable: the sample carrying it is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to parse timestamp '{input}': {reason}")]
pub struct MalformedTimestamp {
    pub input: String,
    pub reason: String,
}

/// Converts a possibly zone-less timestamp into a UTC instant.
///
/// | Input | Interpretation |
/// |-------|----------------|
/// | `2024-01-01T00:00:00Z` | as-is |
/// | `2024-01-01T02:00:00+02:00` | as-is |
/// | `2024-01-01T00:00:00` | UTC |
/// | `2024-01-01 00:00:00.123` | UTC, space separator accepted |
///
/// ```
/// use hostpulse_core::util::normalize_timestamp;
///
/// let naive = normalize_timestamp("2024-01-01T00:00:00").unwrap();
/// let zoned = normalize_timestamp("2024-01-01T00:00:00Z").unwrap();
/// assert_eq!(naive, zoned);
/// ```
pub fn normalize_timestamp(raw: &str) -> Result<DateTime<Utc>, MalformedTimestamp> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(MalformedTimestamp {
            input: raw.to_string(),
            reason: "empty timestamp".to_string(),
        });
    }

    let marked: Cow<'_, str> = if has_zone_marker(input) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}Z"))
    };

    try_parse_rfc3339(&marked).ok_or_else(|| MalformedTimestamp {
        input: raw.to_string(),
        reason: "expected ISO 8601 date-time (2024-01-01T00:00:00[Z|+hh:mm])".to_string(),
    })
}

/// Canonical string form of an instant (`Z`-suffixed RFC 3339).
///
/// Feeding the result back into [`normalize_timestamp`] yields the same instant.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn has_zone_marker(input: &str) -> bool {
    input.contains('Z') || input.contains('+')
}

fn try_parse_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    // `str(datetime)` style: date and time separated by a space
    if input.len() > 11 && input.as_bytes()[10] == b' ' {
        let with_t = format!("{}T{}", &input[..10], &input[11..]);
        if let Ok(dt) = DateTime::parse_from_rfc3339(&with_t) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    None
}
