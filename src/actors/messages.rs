//! Message types for actor communication
//!
//! Commands are request/response messages sent to a specific actor via
//! mpsc, answered through a oneshot. Events are broadcast notifications
//! published to multiple subscribers and must stay cloneable.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::TelemetryReading;
use crate::access::{Caller, Role};
use crate::error::CoreResult;
use crate::model::{
    Alert, AlertKind, AlertSource, Antenna, BackupSystem, Channel, LogEntry, MaintenanceRecord,
    RemoteCommand, RemoteCommandKind, Severity, StatisticsSnapshot, Transmitter,
    TransmitterStatus,
};
use crate::store::{
    AntennaUpdate, ChannelUpdate, NewAntenna, NewBackupSystem, NewChannel, NewMaintenance,
    NewTransmitter, TransmitterUpdate,
};

/// What happened to an alert row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertChange {
    /// A new row was created
    Raised,

    /// An unresolved row was deduplicated into (message/timestamp refresh)
    Updated,

    Resolved,
}

/// Event published on every alert raise, dedup update, or resolution.
///
/// Subscribers are expected to filter on `notified_roles`; the broadcast
/// channel may lag and drop events for slow subscribers, which is
/// acceptable because the store rows remain authoritative.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub alert: Alert,
    pub change: AlertChange,
    pub notified_roles: Vec<Role>,
}

/// Event published after each applied telemetry reading.
///
/// Drives the backup failover controller's degradation tracking.
#[derive(Debug, Clone)]
pub struct HealthEvent {
    pub transmitter_id: Uuid,
    pub health_score: f64,
    pub at: DateTime<Utc>,
}

/// Commands understood by the entity store actor
#[derive(Debug)]
pub enum StoreCommand {
    AddTransmitter {
        caller: Caller,
        spec: NewTransmitter,
        respond_to: oneshot::Sender<CoreResult<Transmitter>>,
    },
    UpdateTransmitter {
        caller: Caller,
        id: Uuid,
        update: TransmitterUpdate,
        respond_to: oneshot::Sender<CoreResult<Transmitter>>,
    },
    DeleteTransmitter {
        caller: Caller,
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<()>>,
    },
    GetTransmitter {
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<Transmitter>>,
    },
    ListTransmitters {
        respond_to: oneshot::Sender<CoreResult<Vec<Transmitter>>>,
    },

    AddChannel {
        caller: Caller,
        spec: NewChannel,
        respond_to: oneshot::Sender<CoreResult<Channel>>,
    },
    UpdateChannel {
        caller: Caller,
        id: Uuid,
        update: ChannelUpdate,
        respond_to: oneshot::Sender<CoreResult<Channel>>,
    },
    DeleteChannel {
        caller: Caller,
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<()>>,
    },
    GetChannel {
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<Channel>>,
    },
    ListChannels {
        respond_to: oneshot::Sender<CoreResult<Vec<Channel>>>,
    },

    AddAntenna {
        caller: Caller,
        spec: NewAntenna,
        respond_to: oneshot::Sender<CoreResult<Antenna>>,
    },
    UpdateAntenna {
        caller: Caller,
        id: Uuid,
        update: AntennaUpdate,
        respond_to: oneshot::Sender<CoreResult<Antenna>>,
    },
    DeleteAntenna {
        caller: Caller,
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<()>>,
    },
    ListAntennas {
        respond_to: oneshot::Sender<CoreResult<Vec<Antenna>>>,
    },

    /// Collaborator-facing, access-checked alert creation
    CreateAlert {
        caller: Caller,
        kind: AlertKind,
        severity: Severity,
        source: AlertSource,
        message: String,
        respond_to: oneshot::Sender<CoreResult<Alert>>,
    },
    /// System-internal raise (telemetry loop, dispatcher, diagnostics)
    RaiseAlert {
        kind: AlertKind,
        severity: Severity,
        source: AlertSource,
        message: String,
        respond_to: oneshot::Sender<CoreResult<Alert>>,
    },
    ResolveAlert {
        caller: Option<Caller>,
        id: Uuid,
        resolved_by: String,
        resolution: String,
        respond_to: oneshot::Sender<CoreResult<Alert>>,
    },
    ActiveAlerts {
        severity: Option<Severity>,
        respond_to: oneshot::Sender<CoreResult<Vec<Alert>>>,
    },

    AddMaintenance {
        caller: Caller,
        spec: NewMaintenance,
        respond_to: oneshot::Sender<CoreResult<MaintenanceRecord>>,
    },
    CompleteMaintenance {
        caller: Caller,
        id: Uuid,
        end_time: DateTime<Utc>,
        respond_to: oneshot::Sender<CoreResult<MaintenanceRecord>>,
    },
    MaintenanceRecords {
        upcoming_only: bool,
        respond_to: oneshot::Sender<CoreResult<Vec<MaintenanceRecord>>>,
    },

    AddBackupSystem {
        caller: Caller,
        spec: NewBackupSystem,
        respond_to: oneshot::Sender<CoreResult<BackupSystem>>,
    },
    ListBackupSystems {
        respond_to: oneshot::Sender<CoreResult<Vec<BackupSystem>>>,
    },
    GetBackupSystem {
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<BackupSystem>>,
    },
    /// Swap the active roles of a pairing. `caller` is `None` for the
    /// automatic failover path.
    ActivateBackup {
        caller: Option<Caller>,
        id: Uuid,
        performed_by: String,
        respond_to: oneshot::Sender<CoreResult<BackupSystem>>,
    },

    EmergencyShutdown {
        caller: Caller,
        id: Uuid,
        reason: String,
        respond_to: oneshot::Sender<CoreResult<Transmitter>>,
    },

    RecordTelemetry {
        id: Uuid,
        reading: TelemetryReading,
        at: DateTime<Utc>,
        respond_to: oneshot::Sender<CoreResult<f64>>,
    },
    ApplyTransition {
        id: Uuid,
        to: TransmitterStatus,
        performed_by: String,
        respond_to: oneshot::Sender<CoreResult<TransmitterStatus>>,
    },

    InsertCommand {
        row: RemoteCommand,
        respond_to: oneshot::Sender<CoreResult<()>>,
    },
    MarkCommandRunning {
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<()>>,
    },
    /// Commit a successful execution: transitions plus terminal row
    CompleteCommand {
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<RemoteCommand>>,
    },
    /// Record a terminal failure without touching transmitter state
    FailCommand {
        id: Uuid,
        reason: String,
        respond_to: oneshot::Sender<CoreResult<RemoteCommand>>,
    },
    GetCommand {
        id: Uuid,
        respond_to: oneshot::Sender<CoreResult<RemoteCommand>>,
    },

    RecentLogs {
        limit: usize,
        respond_to: oneshot::Sender<CoreResult<Vec<LogEntry>>>,
    },
    Statistics {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        respond_to: oneshot::Sender<CoreResult<StatisticsSnapshot>>,
    },

    /// Gracefully shut down the store actor
    Shutdown,
}

/// Commands that can be sent to the telemetry actor
#[derive(Debug)]
pub enum TelemetryCommand {
    /// Run one tick immediately (bypassing the interval timer)
    TickNow {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Update the tick interval; takes effect immediately
    UpdateInterval { interval_secs: u64 },

    /// Gracefully shut down the telemetry actor
    Shutdown,
}

/// Commands that can be sent to the command dispatcher
#[derive(Debug)]
pub enum DispatcherCommand {
    Send {
        transmitter_id: Uuid,
        command: RemoteCommandKind,
        caller: Caller,
        /// Answered once the command is validated and recorded
        respond_to: oneshot::Sender<CoreResult<CommandTicket>>,
    },
    EmergencyShutdown {
        transmitter_id: Uuid,
        caller: Caller,
        reason: String,
        respond_to: oneshot::Sender<CoreResult<Transmitter>>,
    },
    Shutdown,
}

/// Receipt for an accepted remote command.
///
/// The ticket id identifies the stored `RemoteCommand` row; `completion`
/// resolves with the terminal row. Dropping the receiver is the
/// fire-and-forget mode, awaiting it is the synchronous mode.
#[derive(Debug)]
pub struct CommandTicket {
    pub command_id: Uuid,
    pub completion: oneshot::Receiver<RemoteCommand>,
}

/// Commands that can be sent to the failover controller
#[derive(Debug)]
pub enum FailoverCommand {
    /// Operator-requested activation; always permitted
    Activate {
        backup_system_id: Uuid,
        caller: Caller,
        respond_to: oneshot::Sender<CoreResult<BackupSystem>>,
    },
    Shutdown,
}
