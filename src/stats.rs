//! Statistics aggregation
//!
//! Pure folds over the store's history: alerts and maintenance records are
//! counted by timestamp, and total uptime is reconstructed per transmitter
//! from its status-change audit trail. Nothing here mutates state, so a
//! snapshot computed twice over the same history is identical.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{
    Alert, LogEntry, MaintenanceRecord, Severity, StatisticsSnapshot, Transmitter,
    TransmitterStatus,
};

/// Seconds a single transmitter spent online within `[from, until]`,
/// replayed from its `transmitter_added` / `status_change` log entries.
fn online_secs(
    transmitter_id: Uuid,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    logs: &[LogEntry],
) -> u64 {
    let mut changes: Vec<(DateTime<Utc>, TransmitterStatus)> = logs
        .iter()
        .filter(|l| l.transmitter_id == Some(transmitter_id))
        .filter(|l| l.action == "status_change" || l.action == "transmitter_added")
        .filter_map(|l| TransmitterStatus::parse(&l.details).map(|s| (l.timestamp, s)))
        .collect();
    changes.sort_by_key(|(at, _)| *at);

    if changes.is_empty() {
        return 0;
    }

    let mut total = 0i64;
    let mut current: Option<TransmitterStatus> = None;
    let mut segment_start = from;

    for (at, status) in changes {
        if at > until {
            break;
        }
        if current == Some(TransmitterStatus::Online) {
            let end = at.max(segment_start);
            total += (end - segment_start).num_seconds();
        }
        segment_start = at.max(from);
        current = Some(status);
    }

    if current == Some(TransmitterStatus::Online) && segment_start < until {
        total += (until - segment_start).num_seconds();
    }

    total.max(0) as u64
}

/// Fold history into a snapshot for `[from, to]`.
///
/// Open-ended online segments are closed at `now` (the underlying history
/// can still grow within the same period, which is why snapshots are never
/// cached by the core).
pub fn fold_statistics(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
    transmitters: &[&Transmitter],
    alerts: &[&Alert],
    maintenance: &[&MaintenanceRecord],
    logs: &[LogEntry],
) -> StatisticsSnapshot {
    let until = to.min(now);

    let total_uptime_secs = transmitters
        .iter()
        .map(|t| online_secs(t.id, from, until, logs))
        .sum();

    // Power and signal averages cover the units currently on air.
    let online: Vec<_> = transmitters
        .iter()
        .filter(|t| t.status == TransmitterStatus::Online)
        .collect();
    let (average_power_output, average_signal_quality) = if online.is_empty() {
        (0.0, 0.0)
    } else {
        let n = online.len() as f64;
        (
            online.iter().map(|t| t.power_output).sum::<f64>() / n,
            online.iter().map(|t| t.signal_quality).sum::<f64>() / n,
        )
    };

    let in_window: Vec<_> = alerts
        .iter()
        .filter(|a| a.detected_at >= from && a.detected_at <= to)
        .collect();
    let total_alerts = in_window.len();
    let critical_alerts = in_window
        .iter()
        .filter(|a| a.severity == Severity::Critical)
        .count();

    let maintenance_count = maintenance
        .iter()
        .filter(|m| m.start_time >= from && m.start_time <= to)
        .count();

    StatisticsSnapshot {
        period_start: from,
        period_end: to,
        total_uptime_secs,
        average_power_output,
        average_signal_quality,
        total_alerts,
        critical_alerts,
        maintenance_count,
    }
}
