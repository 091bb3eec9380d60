//! Formatting helpers for live tiles and listings.
//!
//! Pure functions only; nothing here knows about terminals or layout.

use chrono::{DateTime, Utc};

use crate::rates::RateUnit;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Memory tile value: gigabytes with one decimal, no suffix.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.1}", bytes as f64 / GIB)
}

/// Rate already scaled to `unit`, one decimal: `"12.5 KB/s"`.
pub fn format_rate(value: f64, unit: RateUnit) -> String {
    format!("{:.1} {}", value, unit.suffix())
}

/// Percentage with one decimal: `"42.0%"`.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Compact duration: `"45s"`, `"3m5s"`, `"2h10m"`, `"4d3h"`; `"-"` if negative.
pub fn format_duration(secs: i64) -> String {
    if secs < 0 {
        return "-".to_string();
    }
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d{}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Uptime since `boot`: `"{d}d {h}h"` from one day on, otherwise `"{h}h"`.
///
/// `"N/A"` without a boot time. A boot time in the future reads as `"0h"`.
pub fn format_uptime(boot: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(boot) = boot else {
        return "N/A".to_string();
    };
    let hours = (now - boot).num_hours().max(0);
    let days = hours / 24;
    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else {
        format!("{}h", hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_gb() {
        assert_eq!(format_gb(8 * 1024 * 1024 * 1024), "8.0");
        assert_eq!(format_gb(0), "0.0");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(12.345, RateUnit::KibPerSec), "12.3 KB/s");
        assert_eq!(format_rate(0.0, RateUnit::MibPerSec), "0.0 MB/s");
        assert_eq!(format_percent(42.0), "42.0%");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(-1), "-");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(185), "3m5s");
        assert_eq!(format_duration(7800), "2h10m");
        assert_eq!(format_duration(4 * 86400 + 3 * 3600), "4d3h");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(None, now()), "N/A");
        assert_eq!(format_uptime(Some(now() - Duration::minutes(59)), now()), "0h");
        assert_eq!(format_uptime(Some(now() - Duration::hours(5)), now()), "5h");
        assert_eq!(format_uptime(Some(now() - Duration::hours(24)), now()), "1d 0h");
        assert_eq!(
            format_uptime(Some(now() - Duration::hours(51) - Duration::minutes(30)), now()),
            "2d 3h"
        );
        assert_eq!(format_uptime(Some(now() + Duration::hours(2)), now()), "0h");
    }
}
