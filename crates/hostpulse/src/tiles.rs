//! Plain-text rendering of live views.

use chrono::{DateTime, Utc};

use hostpulse_core::EntityView;
use hostpulse_core::fmt::{format_duration, format_gb, format_percent, format_rate};
use hostpulse_core::monitor::FleetView;
use hostpulse_core::rates::Counter;
use hostpulse_core::util::normalize_timestamp;

/// One status line for the detail view.
pub fn entity_line(view: &EntityView, now: DateTime<Utc>) -> String {
    let name = view
        .record
        .as_ref()
        .map(|r| r.display_name().to_string())
        .unwrap_or_else(|| format!("#{}", view.entity));

    let mut line = match &view.latest {
        Some(s) => format!(
            "{name}  cpu {}  mem {} GB  disk {}  net ↑{} ↓{}  io r{} w{}  procs {}  up {}",
            format_percent(s.cpu_usage),
            format_gb(s.memory_used),
            format_percent(s.disk_usage),
            rate(view, Counter::NetworkSent),
            rate(view, Counter::NetworkRecv),
            rate(view, Counter::DiskReadBytes),
            rate(view, Counter::DiskWriteBytes),
            s.process_count,
            view.uptime(now),
        ),
        None => format!("{name}  waiting for data"),
    };

    if let Some(status) = &view.status {
        if let Some(e) = &status.critical_error {
            line.push_str(&format!("  [stale: {e}]"));
        }
        for kind in &status.non_critical_failures {
            line.push_str(&format!("  [{kind} unavailable]"));
        }
    }
    if !view.auxiliary.is_empty() {
        line.push_str(&format!("  tickets {}", view.auxiliary.len()));
    }
    line
}

fn rate(view: &EntityView, counter: Counter) -> String {
    format_rate(view.rates.get(counter), counter.display_unit())
}

/// Summary header plus one line per machine for the overview.
pub fn fleet_lines(view: &FleetView, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = Vec::with_capacity(view.entities.len() + 1);
    let mut header = format!(
        "systems {}  online {}  offline {}  alerts {}",
        view.total(),
        view.online(),
        view.offline(),
        view.alerts.len()
    );
    if let Some(e) = view.status.as_ref().and_then(|s| s.critical_error.as_ref()) {
        header.push_str(&format!("  [stale: {e}]"));
    }
    lines.push(header);

    for e in &view.entities {
        let state = if e.is_active { "online " } else { "offline" };
        let seen = e
            .last_seen
            .as_deref()
            .and_then(|s| normalize_timestamp(s).ok())
            .map(|t| format!("{} ago", format_duration((now - t).num_seconds())))
            .unwrap_or_else(|| "never".to_string());
        let alerts = view.alerts_for(e.id).count();
        let mut line = format!("  {state}  {:<24} last seen {seen}", e.display_name());
        if alerts > 0 {
            line.push_str(&format!("  alerts {alerts}"));
        }
        lines.push(line);
    }
    lines
}
