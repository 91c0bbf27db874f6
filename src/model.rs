//! Domain entities for the transmission control core
//!
//! All types are serde-serializable so collaborating modules (dashboards,
//! reports) can consume snapshots directly.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::Role;

/// Lifecycle state of a transmitter
///
/// Transitions are only legal along the edges encoded in
/// [`TransmitterStatus::can_transition`]; everything else is rejected with
/// `InvalidTransition` and leaves the entity unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmitterStatus {
    Offline,
    Standby,
    Online,
    Maintenance,
    Error,
    Backup,
}

impl TransmitterStatus {
    /// The transition edge table.
    ///
    /// Drivers: command outcomes, diagnostics failures, backup failover
    /// activation, and maintenance start/end. Self-transitions are not edges.
    pub fn can_transition(self, to: TransmitterStatus) -> bool {
        use TransmitterStatus::*;

        matches!(
            (self, to),
            (Offline, Standby)
                | (Offline, Online)
                | (Standby, Online)
                | (Standby, Offline)
                | (Standby, Maintenance)
                | (Standby, Error)
                | (Standby, Backup)
                | (Online, Standby)
                | (Online, Offline)
                | (Online, Maintenance)
                | (Online, Error)
                | (Online, Backup)
                | (Maintenance, Standby)
                | (Maintenance, Offline)
                | (Maintenance, Online)
                | (Error, Standby)
                | (Error, Offline)
                | (Backup, Online)
                | (Backup, Standby)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransmitterStatus::Offline => "offline",
            TransmitterStatus::Standby => "standby",
            TransmitterStatus::Online => "online",
            TransmitterStatus::Maintenance => "maintenance",
            TransmitterStatus::Error => "error",
            TransmitterStatus::Backup => "backup",
        }
    }

    pub fn parse(s: &str) -> Option<TransmitterStatus> {
        match s {
            "offline" => Some(TransmitterStatus::Offline),
            "standby" => Some(TransmitterStatus::Standby),
            "online" => Some(TransmitterStatus::Online),
            "maintenance" => Some(TransmitterStatus::Maintenance),
            "error" => Some(TransmitterStatus::Error),
            "backup" => Some(TransmitterStatus::Backup),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransmitterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remote control instruction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommandKind {
    PowerOn,
    PowerOff,
    Standby,
    Reset,
}

impl RemoteCommandKind {
    /// Whether the command is legal for a transmitter currently in `status`.
    ///
    /// Commands never apply to units in `Maintenance` or `Error`; those
    /// states are left via maintenance completion and alert resolution.
    pub fn allowed_from(self, status: TransmitterStatus) -> bool {
        use TransmitterStatus::*;

        match self {
            RemoteCommandKind::PowerOn => matches!(status, Offline | Standby),
            RemoteCommandKind::PowerOff => matches!(status, Online | Standby),
            RemoteCommandKind::Standby => matches!(status, Offline | Online | Backup),
            RemoteCommandKind::Reset => matches!(status, Online),
        }
    }

    /// Status transitions committed when the command completes, in order.
    ///
    /// `Reset` passes through `Offline` before settling back to `Online`;
    /// both edges are committed together at completion.
    pub fn resulting_statuses(self) -> &'static [TransmitterStatus] {
        match self {
            RemoteCommandKind::PowerOn => &[TransmitterStatus::Online],
            RemoteCommandKind::PowerOff => &[TransmitterStatus::Offline],
            RemoteCommandKind::Standby => &[TransmitterStatus::Standby],
            RemoteCommandKind::Reset => &[TransmitterStatus::Offline, TransmitterStatus::Online],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteCommandKind::PowerOn => "power_on",
            RemoteCommandKind::PowerOff => "power_off",
            RemoteCommandKind::Standby => "standby",
            RemoteCommandKind::Reset => "reset",
        }
    }
}

impl std::fmt::Display for RemoteCommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert severity, ordered for triage: critical > high > medium > low
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified abnormal-condition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SignalDegraded,
    Overheat,
    SignalLoss,
    CommandTimeout,
    FailoverFailed,
    PowerInstability,
    BackupUnreachable,
    EmergencyShutdown,
    Manual,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::SignalDegraded => "signal_degraded",
            AlertKind::Overheat => "overheat",
            AlertKind::SignalLoss => "signal_loss",
            AlertKind::CommandTimeout => "command_timeout",
            AlertKind::FailoverFailed => "failover_failed",
            AlertKind::PowerInstability => "power_instability",
            AlertKind::BackupUnreachable => "backup_unreachable",
            AlertKind::EmergencyShutdown => "emergency_shutdown",
            AlertKind::Manual => "manual",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The entity an alert points at: exactly one of transmitter or channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "entity", content = "id")]
pub enum AlertSource {
    Transmitter(Uuid),
    Channel(Uuid),
}

/// A managed broadcast unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transmitter {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub model: String,
    pub serial: String,
    pub status: TransmitterStatus,

    /// Output power in kW
    pub power_output: f64,

    /// Signal quality, 0-100
    pub signal_quality: f64,

    /// Component temperature in °C
    pub temperature: f64,

    /// Derived 0-100 condition indicator, recomputed on every telemetry
    /// tick. Never written by commands or collaborator updates.
    pub health_score: f64,

    /// Accumulated seconds spent online
    pub uptime_secs: u64,

    pub is_backup: bool,

    /// Carrier frequency in MHz
    pub frequency_mhz: f64,

    pub access_roles: HashSet<Role>,
}

/// Operational state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Idle,
}

/// A transmission channel bound to one transmitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub transmitter_id: Uuid,
    pub name: String,
    pub frequency_mhz: f64,
    pub power: f64,
    pub signal_quality: f64,
    pub status: ChannelStatus,
    pub access_roles: HashSet<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntennaKind {
    Directional,
    Omnidirectional,
    Panel,
}

/// A radiating element attached to a transmitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Antenna {
    pub id: Uuid,
    pub transmitter_id: Uuid,
    pub kind: AntennaKind,

    /// Azimuth in degrees
    pub orientation_deg: f64,

    pub access_roles: HashSet<Role>,
}

/// A detected abnormal condition
///
/// Unresolved alerts are unique per `(kind, source)`; raising a duplicate
/// updates the existing row instead of creating a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: Severity,
    pub source: AlertSource,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,

    /// Inherited from the source entity at raise time
    pub access_roles: HashSet<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceKind {
    Scheduled,
    Preventive,
    Corrective,
    Emergency,
}

/// A service event on a transmitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub transmitter_id: Uuid,
    pub kind: MaintenanceKind,
    pub description: String,
    pub performed_by: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<u64>,
}

/// Which member of a backup pairing currently carries the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairMember {
    Primary,
    Backup,
}

/// A primary/backup transmitter pairing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSystem {
    pub id: Uuid,
    pub name: String,
    pub primary_id: Uuid,
    pub backup_id: Uuid,

    /// Exactly one member carries the feed at a time
    pub active_member: PairMember,

    pub auto_switch_enabled: bool,
    pub switch_count: u32,
    pub access_roles: HashSet<Role>,
}

impl BackupSystem {
    /// Id of the member currently carrying the feed
    pub fn active_id(&self) -> Uuid {
        match self.active_member {
            PairMember::Primary => self.primary_id,
            PairMember::Backup => self.backup_id,
        }
    }

    /// Id of the member currently standing by
    pub fn inactive_id(&self) -> Uuid {
        match self.active_member {
            PairMember::Primary => self.backup_id,
            PairMember::Backup => self.primary_id,
        }
    }
}

/// Terminal and in-flight states of a dispatched command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A dispatched control instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCommand {
    pub id: Uuid,
    pub transmitter_id: Uuid,
    pub command: RemoteCommandKind,
    pub requested_by: String,
    pub issued_at: DateTime<Utc>,

    /// Set only once execution has reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,

    pub status: CommandStatus,

    /// Recorded on every terminal outcome, including failures
    pub result: Option<String>,
}

/// Immutable audit record, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub transmitter_id: Option<Uuid>,
    pub channel_id: Option<Uuid>,
    pub action: String,
    pub performed_by: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// Aggregated metrics for a period, derived and recomputed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_uptime_secs: u64,
    pub average_power_output: f64,
    pub average_signal_quality: f64,
    pub total_alerts: usize,
    pub critical_alerts: usize,
    pub maintenance_count: usize,
}
