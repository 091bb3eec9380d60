//! Telemetry snapshots: wire form and normalized form.
//!
//! The remote service stores timestamps without zone information, so the wire
//! form keeps them as strings. `Snapshot::from_raw` anchors them in UTC via
//! [`normalize_timestamp`](crate::util::normalize_timestamp).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::util::{MalformedTimestamp, normalize_timestamp};

/// A wire snapshot that cannot enter a sample window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedSnapshot {
    #[error(transparent)]
    Timestamp(#[from] MalformedTimestamp),
    /// A cumulative counter was null or absent.
    #[error("missing counter '{0}'")]
    MissingCounter(&'static str),
}

/// One entry of a snapshot's process list, ordered by CPU usage.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TopProcess {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub pid: u32,

    /// CPU usage of the process (percent of one core).
    #[serde(default, deserialize_with = "null_as_default")]
    pub cpu_percent: f64,

    /// Resident memory as percent of total RAM.
    #[serde(default, deserialize_with = "null_as_default")]
    pub memory_percent: f64,
}

/// Snapshot as served by the remote service.
///
/// Source: `GET /metrics/{id}?limit=N`
///
/// Counters are cumulative since boot of the monitored machine. Fields that
/// older agents do not send are optional and read as zero. Null gauges read
/// as zero; a null network counter makes the row malformed.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct RawSnapshot {
    /// Collection time. May lack a zone designator even though it is UTC.
    pub timestamp: String,

    /// Total CPU usage (0-100).
    #[serde(default, deserialize_with = "null_as_default")]
    pub cpu_usage: f64,

    /// Used physical memory (bytes).
    #[serde(default, deserialize_with = "null_as_default")]
    pub memory_used: u64,

    /// Total physical memory (bytes).
    #[serde(default)]
    pub memory_total: Option<u64>,

    /// Usage of the primary disk (0-100).
    #[serde(default, deserialize_with = "null_as_default")]
    pub disk_usage: f64,

    /// Bytes sent over all interfaces since boot.
    #[serde(default)]
    pub network_sent: Option<u64>,

    /// Bytes received over all interfaces since boot.
    #[serde(default)]
    pub network_recv: Option<u64>,

    /// Bytes read from disk since boot.
    #[serde(default)]
    pub disk_read_bytes: Option<u64>,

    /// Bytes written to disk since boot.
    #[serde(default)]
    pub disk_write_bytes: Option<u64>,

    #[serde(default)]
    pub process_count: Option<u64>,

    #[serde(default)]
    pub top_processes: Option<Vec<TopProcess>>,

    /// Boot time of the monitored machine, raw.
    #[serde(default)]
    pub boot_time: Option<String>,

    #[serde(default)]
    pub uptime_seconds: Option<u64>,

    /// Uptime preformatted by the agent ("3d 4h 12m").
    #[serde(default)]
    pub uptime_human: Option<String>,
}

/// Point-in-time readings for one monitored machine, anchored in UTC.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Snapshot {
    pub instant: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_used: u64,
    pub memory_total: Option<u64>,
    pub disk_usage: f64,
    pub network_sent: u64,
    pub network_recv: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub process_count: u64,
    pub top_processes: Vec<TopProcess>,
    pub boot_time: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<u64>,
    pub uptime_human: Option<String>,
}

impl Snapshot {
    /// Normalizes a wire snapshot.
    ///
    /// Fails when the collection timestamp cannot be parsed or a network
    /// counter is missing. A malformed `boot_time` is dropped instead.
    pub fn from_raw(raw: RawSnapshot) -> Result<Self, MalformedSnapshot> {
        let instant = normalize_timestamp(&raw.timestamp)?;
        let network_sent = raw
            .network_sent
            .ok_or(MalformedSnapshot::MissingCounter("network_sent"))?;
        let network_recv = raw
            .network_recv
            .ok_or(MalformedSnapshot::MissingCounter("network_recv"))?;

        let boot_time = raw
            .boot_time
            .as_deref()
            .and_then(|b| match normalize_timestamp(b) {
                Ok(t) => Some(t),
                Err(e) => {
                    debug!(error = %e, "ignoring unparsable boot_time");
                    None
                }
            });

        Ok(Self {
            instant,
            cpu_usage: raw.cpu_usage,
            memory_used: raw.memory_used,
            memory_total: raw.memory_total,
            disk_usage: raw.disk_usage,
            network_sent,
            network_recv,
            disk_read_bytes: raw.disk_read_bytes.unwrap_or(0),
            disk_write_bytes: raw.disk_write_bytes.unwrap_or(0),
            process_count: raw.process_count.unwrap_or(0),
            top_processes: raw.top_processes.unwrap_or_default(),
            boot_time,
            uptime_seconds: raw.uptime_seconds,
            uptime_human: raw.uptime_human,
        })
    }

    /// Reads one raw series value.
    pub fn value(&self, key: MetricKey) -> f64 {
        match key {
            MetricKey::CpuUsage => self.cpu_usage,
            MetricKey::MemoryUsed => self.memory_used as f64,
            MetricKey::DiskUsage => self.disk_usage,
            MetricKey::NetworkSent => self.network_sent as f64,
            MetricKey::NetworkRecv => self.network_recv as f64,
            MetricKey::DiskReadBytes => self.disk_read_bytes as f64,
            MetricKey::DiskWriteBytes => self.disk_write_bytes as f64,
            MetricKey::ProcessCount => self.process_count as f64,
        }
    }
}

/// Keys of the raw per-snapshot series exposed for charting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    CpuUsage,
    MemoryUsed,
    DiskUsage,
    NetworkSent,
    NetworkRecv,
    DiskReadBytes,
    DiskWriteBytes,
    ProcessCount,
}

impl MetricKey {
    pub const ALL: [MetricKey; 8] = [
        MetricKey::CpuUsage,
        MetricKey::MemoryUsed,
        MetricKey::DiskUsage,
        MetricKey::NetworkSent,
        MetricKey::NetworkRecv,
        MetricKey::DiskReadBytes,
        MetricKey::DiskWriteBytes,
        MetricKey::ProcessCount,
    ];

    /// Wire field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::CpuUsage => "cpu_usage",
            MetricKey::MemoryUsed => "memory_used",
            MetricKey::DiskUsage => "disk_usage",
            MetricKey::NetworkSent => "network_sent",
            MetricKey::NetworkRecv => "network_recv",
            MetricKey::DiskReadBytes => "disk_read_bytes",
            MetricKey::DiskWriteBytes => "disk_write_bytes",
            MetricKey::ProcessCount => "process_count",
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const WIRE: &str = r#"{
        "id": 812,
        "system_id": 3,
        "timestamp": "2024-01-01T00:00:05.250000",
        "cpu_usage": 12.5,
        "cpu_per_core": [10.0, 15.0],
        "memory_total": 17179869184,
        "memory_used": 8589934592,
        "disk_usage": 61.2,
        "disk_read_bytes": null,
        "network_sent": 1500,
        "network_recv": 98000,
        "process_count": 211,
        "boot_time": "2023-12-30T08:00:00",
        "uptime_human": "1d 16h 0m",
        "top_processes": [
            {"pid": 4, "name": "System", "cpu_percent": null, "memory_percent": 0.1},
            {"pid": 1200, "name": "chrome.exe", "cpu_percent": 7.5, "memory_percent": 4.25}
        ]
    }"#;

    #[test]
    fn decodes_wire_snapshot_with_missing_and_null_fields() {
        let raw: RawSnapshot = serde_json::from_str(WIRE).unwrap();
        let snap = Snapshot::from_raw(raw).unwrap();

        assert_eq!(
            snap.instant,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap()
                + chrono::Duration::milliseconds(250)
        );
        assert_eq!(snap.disk_read_bytes, 0);
        assert_eq!(snap.disk_write_bytes, 0);
        assert_eq!(snap.process_count, 211);
        assert_eq!(snap.top_processes.len(), 2);
        assert_eq!(snap.top_processes[0].cpu_percent, 0.0);
        assert_eq!(snap.top_processes[1].name, "chrome.exe");
        assert_eq!(
            snap.boot_time,
            Some(Utc.with_ymd_and_hms(2023, 12, 30, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn malformed_timestamp_rejects_snapshot() {
        let raw = RawSnapshot {
            timestamp: "yesterday".into(),
            network_sent: Some(0),
            network_recv: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Snapshot::from_raw(raw),
            Err(MalformedSnapshot::Timestamp(_))
        ));
    }

    #[test]
    fn null_counter_rejects_only_that_row() {
        let rows: Vec<RawSnapshot> = serde_json::from_str(
            r#"[
                {"timestamp": "2024-01-01T00:00:01", "cpu_usage": null,
                 "memory_used": null, "disk_usage": 40.0,
                 "network_sent": null, "network_recv": 10},
                {"timestamp": "2024-01-01T00:00:00", "cpu_usage": null,
                 "memory_used": 1024, "disk_usage": null,
                 "network_sent": 5, "network_recv": 10}
            ]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);

        let mut rows = rows.into_iter();
        assert_eq!(
            Snapshot::from_raw(rows.next().unwrap()),
            Err(MalformedSnapshot::MissingCounter("network_sent"))
        );
        let snap = Snapshot::from_raw(rows.next().unwrap()).unwrap();
        assert_eq!(snap.cpu_usage, 0.0);
        assert_eq!(snap.disk_usage, 0.0);
        assert_eq!(snap.memory_used, 1024);
        assert_eq!(snap.network_sent, 5);
    }

    #[test]
    fn malformed_boot_time_is_dropped() {
        let raw = RawSnapshot {
            timestamp: "2024-01-01T00:00:00".into(),
            network_sent: Some(0),
            network_recv: Some(0),
            boot_time: Some("not a time".into()),
            ..Default::default()
        };
        let snap = Snapshot::from_raw(raw).unwrap();
        assert!(snap.boot_time.is_none());
    }

    #[test]
    fn value_reads_each_key() {
        let raw: RawSnapshot = serde_json::from_str(WIRE).unwrap();
        let snap = Snapshot::from_raw(raw).unwrap();
        assert_eq!(snap.value(MetricKey::CpuUsage), 12.5);
        assert_eq!(snap.value(MetricKey::NetworkSent), 1500.0);
        assert_eq!(snap.value(MetricKey::NetworkRecv), 98000.0);
        assert_eq!(snap.value(MetricKey::ProcessCount), 211.0);
        assert_eq!(MetricKey::DiskWriteBytes.as_str(), "disk_write_bytes");
    }
}
