//! Rate computation for cumulative counters (network and disk byte totals).
//!
//! This module is the **single source of truth** for turning two counter
//! readings into a per-second rate. Live tiles and chart series both delegate
//! to [`rate`].
//!
//! Guards, applied identically to every counter:
//! - non-positive elapsed time (duplicate, skewed or out-of-order samples) → 0;
//! - counter regression (agent or host restart) → 0 for that tick only. The
//!   next pair of post-reset samples yields a correct rate again.
//!
//! Unit scaling happens after the guards, never inside them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{MetricKey, Snapshot};

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

pub const BYTES_PER_KIB: f64 = 1024.0;

pub const KIB_PER_MIB: f64 = 1024.0;

/// Display unit of a byte rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    BytesPerSec,
    KibPerSec,
    MibPerSec,
}

impl RateUnit {
    /// Scales a bytes/s rate into this unit.
    pub fn from_bytes_per_sec(&self, rate: f64) -> f64 {
        match self {
            RateUnit::BytesPerSec => rate,
            RateUnit::KibPerSec => bytes_to_kib(rate),
            RateUnit::MibPerSec => kib_to_mib(bytes_to_kib(rate)),
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            RateUnit::BytesPerSec => "B/s",
            RateUnit::KibPerSec => "KB/s",
            RateUnit::MibPerSec => "MB/s",
        }
    }
}

pub fn bytes_to_kib(v: f64) -> f64 {
    v / BYTES_PER_KIB
}

pub fn kib_to_mib(v: f64) -> f64 {
    v / KIB_PER_MIB
}

// ---------------------------------------------------------------------------
// Delta helpers
// ---------------------------------------------------------------------------

/// Compute counter delta, returning `None` on counter regression (reset).
pub fn delta(curr: u64, prev: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

/// Seconds from `prev` to `curr`; negative when `curr` is older.
pub fn elapsed_secs(curr: &DateTime<Utc>, prev: &DateTime<Utc>) -> f64 {
    let d = curr.signed_duration_since(*prev);
    match d.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => d.num_seconds() as f64,
    }
}

// ---------------------------------------------------------------------------
// Rate calculator
// ---------------------------------------------------------------------------

/// One reading of a cumulative counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSample {
    pub value: u64,
    pub instant: DateTime<Utc>,
}

impl CounterSample {
    pub fn new(value: u64, instant: DateTime<Utc>) -> Self {
        Self { value, instant }
    }
}

/// Per-second rate between two readings, in the counter's native unit.
///
/// Always finite and `>= 0`.
pub fn rate(curr: CounterSample, prev: CounterSample) -> f64 {
    let dt = elapsed_secs(&curr.instant, &prev.instant);
    if dt <= 0.0 {
        return 0.0;
    }
    match delta(curr.value, prev.value) {
        Some(d) => d as f64 / dt,
        None => 0.0,
    }
}

/// The cumulative counters carried by every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    NetworkSent,
    NetworkRecv,
    DiskReadBytes,
    DiskWriteBytes,
}

impl Counter {
    pub const ALL: [Counter; 4] = [
        Counter::NetworkSent,
        Counter::NetworkRecv,
        Counter::DiskReadBytes,
        Counter::DiskWriteBytes,
    ];

    pub fn sample(&self, snapshot: &Snapshot) -> CounterSample {
        let value = match self {
            Counter::NetworkSent => snapshot.network_sent,
            Counter::NetworkRecv => snapshot.network_recv,
            Counter::DiskReadBytes => snapshot.disk_read_bytes,
            Counter::DiskWriteBytes => snapshot.disk_write_bytes,
        };
        CounterSample::new(value, snapshot.instant)
    }

    pub fn key(&self) -> MetricKey {
        match self {
            Counter::NetworkSent => MetricKey::NetworkSent,
            Counter::NetworkRecv => MetricKey::NetworkRecv,
            Counter::DiskReadBytes => MetricKey::DiskReadBytes,
            Counter::DiskWriteBytes => MetricKey::DiskWriteBytes,
        }
    }

    /// Unit the dashboard shows this counter's rate in.
    pub fn display_unit(&self) -> RateUnit {
        match self {
            Counter::NetworkSent | Counter::NetworkRecv => RateUnit::KibPerSec,
            Counter::DiskReadBytes | Counter::DiskWriteBytes => RateUnit::MibPerSec,
        }
    }

    /// Display-unit rate between two snapshots.
    pub fn rate_between(&self, curr: &Snapshot, prev: &Snapshot) -> f64 {
        self.display_unit()
            .from_bytes_per_sec(rate(self.sample(curr), self.sample(prev)))
    }
}

// ---------------------------------------------------------------------------
// Derived rates
// ---------------------------------------------------------------------------

/// Live I/O rates for one entity at one tick. All fields are `>= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedRates {
    /// Upload, KB/s.
    pub network_up_kbps: f64,
    /// Download, KB/s.
    pub network_down_kbps: f64,
    /// Disk read, MB/s.
    pub disk_read_mbps: f64,
    /// Disk write, MB/s.
    pub disk_write_mbps: f64,
}

impl DerivedRates {
    pub fn between(curr: &Snapshot, prev: &Snapshot) -> Self {
        Self {
            network_up_kbps: Counter::NetworkSent.rate_between(curr, prev),
            network_down_kbps: Counter::NetworkRecv.rate_between(curr, prev),
            disk_read_mbps: Counter::DiskReadBytes.rate_between(curr, prev),
            disk_write_mbps: Counter::DiskWriteBytes.rate_between(curr, prev),
        }
    }

    pub fn get(&self, counter: Counter) -> f64 {
        match counter {
            Counter::NetworkSent => self.network_up_kbps,
            Counter::NetworkRecv => self.network_down_kbps,
            Counter::DiskReadBytes => self.disk_read_mbps,
            Counter::DiskWriteBytes => self.disk_write_mbps,
        }
    }
}

/// Display-unit rate at each snapshot relative to its predecessor.
///
/// The first point is 0 (no predecessor). Order follows the input, so a
/// skewed instant produces a 0 point rather than a negative one.
pub fn rate_series<'a, I>(snapshots: I, counter: Counter) -> Vec<(DateTime<Utc>, f64)>
where
    I: IntoIterator<Item = &'a Snapshot>,
{
    let mut out = Vec::new();
    let mut prev: Option<&Snapshot> = None;
    for s in snapshots {
        let r = match prev {
            Some(p) => counter.rate_between(s, p),
            None => 0.0,
        };
        out.push((s.instant, r));
        prev = Some(s);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_704_067_200 + secs, 0).single().unwrap()
    }

    fn s(value: u64, secs: i64) -> CounterSample {
        CounterSample::new(value, t(secs))
    }

    fn snap(secs: i64, sent: u64, recv: u64, read: u64, write: u64) -> Snapshot {
        Snapshot {
            instant: t(secs),
            cpu_usage: 0.0,
            memory_used: 0,
            memory_total: None,
            disk_usage: 0.0,
            network_sent: sent,
            network_recv: recv,
            disk_read_bytes: read,
            disk_write_bytes: write,
            process_count: 0,
            top_processes: Vec::new(),
            boot_time: None,
            uptime_seconds: None,
            uptime_human: None,
        }
    }

    #[test]
    fn delta_detects_regression() {
        assert_eq!(delta(10, 4), Some(6));
        assert_eq!(delta(4, 4), Some(0));
        assert_eq!(delta(4, 10), None);
        assert_eq!(delta(0, u64::MAX), None);
    }

    #[test]
    fn rate_is_delta_over_dt() {
        // 1000 @ 0s, 1500 @ 5s -> 100 B/s
        assert!((rate(s(1500, 5), s(1000, 0)) - 100.0).abs() < 1e-9);
        assert!((rate(s(1000, 10), s(0, 0)) - 100.0).abs() < 1e-9);
        assert_eq!(rate(s(1000, 10), s(1000, 0)), 0.0);
    }

    #[test]
    fn rate_handles_sub_second_intervals() {
        let prev = CounterSample::new(0, t(0));
        let curr = CounterSample::new(512, t(0) + chrono::Duration::milliseconds(250));
        assert!((rate(curr, prev) - 2048.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_dt_yields_zero() {
        // duplicate instant
        assert_eq!(rate(s(2000, 5), s(1000, 5)), 0.0);
        // out of order
        assert_eq!(rate(s(2000, 4), s(1000, 5)), 0.0);
        assert_eq!(rate(s(0, 0), s(u64::MAX, 100)), 0.0);
    }

    #[test]
    fn reset_yields_zero_then_recovers() {
        // 1500 @ 5s -> 200 @ 10s is a reset
        assert_eq!(rate(s(200, 10), s(1500, 5)), 0.0);
        // 200 @ 10s -> 700 @ 15s recovers: 500 / 5 = 100 B/s
        assert!((rate(s(700, 15), s(200, 10)) - 100.0).abs() < 1e-9);
        // counter wrapped to zero after a long uptime
        assert_eq!(rate(s(0, 20), s(u64::MAX, 15)), 0.0);
    }

    #[test]
    fn unit_conversion_is_post_processing() {
        assert_eq!(RateUnit::BytesPerSec.from_bytes_per_sec(2048.0), 2048.0);
        assert_eq!(RateUnit::KibPerSec.from_bytes_per_sec(2048.0), 2.0);
        assert_eq!(RateUnit::MibPerSec.from_bytes_per_sec(3.0 * 1024.0 * 1024.0), 3.0);
        assert_eq!(RateUnit::MibPerSec.suffix(), "MB/s");
    }

    #[test]
    fn derived_rates_use_display_units() {
        let prev = snap(0, 0, 0, 0, 0);
        let curr = snap(2, 2048, 4096, 2 * 1024 * 1024, 4 * 1024 * 1024);
        let r = DerivedRates::between(&curr, &prev);
        assert!((r.network_up_kbps - 1.0).abs() < 1e-9);
        assert!((r.network_down_kbps - 2.0).abs() < 1e-9);
        assert!((r.disk_read_mbps - 1.0).abs() < 1e-9);
        assert!((r.disk_write_mbps - 2.0).abs() < 1e-9);
        assert_eq!(r.get(Counter::NetworkRecv), r.network_down_kbps);
    }

    #[test]
    fn derived_rates_guard_each_counter_independently() {
        // Network counters reset (host reboot), disk counters keep counting.
        let prev = snap(0, 10_000, 10_000, 0, 0);
        let curr = snap(1, 5, 5, 1024 * 1024, 0);
        let r = DerivedRates::between(&curr, &prev);
        assert_eq!(r.network_up_kbps, 0.0);
        assert_eq!(r.network_down_kbps, 0.0);
        assert!((r.disk_read_mbps - 1.0).abs() < 1e-9);
        assert_eq!(r.disk_write_mbps, 0.0);
    }

    #[test]
    fn rate_series_starts_at_zero_and_suppresses_resets() {
        let snaps = [
            snap(0, 1000, 0, 0, 0),
            snap(5, 1000 + 5 * 1024, 0, 0, 0),
            snap(10, 200, 0, 0, 0),
            snap(15, 200 + 10 * 1024, 0, 0, 0),
        ];
        let series = rate_series(&snaps, Counter::NetworkSent);
        let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
        assert_eq!(series.len(), 4);
        assert_eq!(series[0].0, t(0));
        assert_eq!(values[0], 0.0);
        assert!((values[1] - 1.0).abs() < 1e-9);
        assert_eq!(values[2], 0.0);
        assert!((values[3] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rate_series_of_empty_input_is_empty() {
        let snaps: Vec<Snapshot> = Vec::new();
        assert!(rate_series(&snaps, Counter::DiskReadBytes).is_empty());
    }
}
