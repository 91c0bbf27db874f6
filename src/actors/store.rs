//! EntityStoreActor - single writer over the authoritative entity state
//!
//! Every component goes through [`StoreHandle`]; the actor applies one
//! message at a time, which serializes telemetry updates against command
//! transitions on the same transmitter and makes the failover swap atomic
//! to any concurrent reader. Alert and health events are published on
//! broadcast channels as mutations happen.

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use crate::TelemetryReading;
use crate::access::Caller;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Alert, AlertKind, AlertSource, Antenna, BackupSystem, Channel, LogEntry, MaintenanceRecord,
    RemoteCommand, Severity, StatisticsSnapshot, Transmitter, TransmitterStatus,
};
use crate::store::{
    AntennaUpdate, ChannelUpdate, NewAntenna, NewBackupSystem, NewChannel, NewMaintenance,
    NewTransmitter, StoreState, TransmitterUpdate,
};

use super::messages::{AlertChange, AlertEvent, HealthEvent, StoreCommand};

/// Buffer sizes for the store's channels
const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Actor owning the entity store
pub struct EntityStoreActor {
    state: StoreState,
    command_rx: mpsc::Receiver<StoreCommand>,
    alert_tx: broadcast::Sender<AlertEvent>,
    health_tx: broadcast::Sender<HealthEvent>,
}

impl EntityStoreActor {
    fn new(
        state: StoreState,
        command_rx: mpsc::Receiver<StoreCommand>,
        alert_tx: broadcast::Sender<AlertEvent>,
        health_tx: broadcast::Sender<HealthEvent>,
    ) -> Self {
        Self {
            state,
            command_rx,
            alert_tx,
            health_tx,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting entity store actor");

        while let Some(command) = self.command_rx.recv().await {
            if matches!(command, StoreCommand::Shutdown) {
                debug!("received shutdown command");
                break;
            }
            self.handle(command);
        }

        debug!("entity store actor stopped");
    }

    fn publish_alert(&self, alert: Alert, change: AlertChange) {
        let notified_roles = self.state.config().notifications.roles_for(alert.severity);
        // No subscribers is fine; events are a convenience, rows are truth.
        let _ = self.alert_tx.send(AlertEvent {
            alert,
            change,
            notified_roles,
        });
    }

    fn handle(&mut self, command: StoreCommand) {
        let now = Utc::now();

        match command {
            StoreCommand::AddTransmitter {
                caller,
                spec,
                respond_to,
            } => {
                let result = self.state.add_transmitter(&caller, spec, now);
                let _ = respond_to.send(result);
            }
            StoreCommand::UpdateTransmitter {
                caller,
                id,
                update,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.update_transmitter(&caller, id, update));
            }
            StoreCommand::DeleteTransmitter {
                caller,
                id,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.delete_transmitter(&caller, id));
            }
            StoreCommand::GetTransmitter { id, respond_to } => {
                let _ = respond_to.send(self.state.transmitter(id));
            }
            StoreCommand::ListTransmitters { respond_to } => {
                let _ = respond_to.send(Ok(self.state.list_transmitters()));
            }

            StoreCommand::AddChannel {
                caller,
                spec,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.add_channel(&caller, spec));
            }
            StoreCommand::UpdateChannel {
                caller,
                id,
                update,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.update_channel(&caller, id, update));
            }
            StoreCommand::DeleteChannel {
                caller,
                id,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.delete_channel(&caller, id));
            }
            StoreCommand::GetChannel { id, respond_to } => {
                let _ = respond_to.send(self.state.channel(id));
            }
            StoreCommand::ListChannels { respond_to } => {
                let _ = respond_to.send(Ok(self.state.list_channels()));
            }

            StoreCommand::AddAntenna {
                caller,
                spec,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.add_antenna(&caller, spec));
            }
            StoreCommand::UpdateAntenna {
                caller,
                id,
                update,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.update_antenna(&caller, id, update));
            }
            StoreCommand::DeleteAntenna {
                caller,
                id,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.delete_antenna(&caller, id));
            }
            StoreCommand::ListAntennas { respond_to } => {
                let _ = respond_to.send(Ok(self.state.list_antennas()));
            }

            StoreCommand::CreateAlert {
                caller,
                kind,
                severity,
                source,
                message,
                respond_to,
            } => {
                let result = self
                    .state
                    .create_alert(&caller, kind, severity, source, message, now);
                let _ = respond_to.send(match result {
                    Ok((alert, created)) => {
                        self.publish_alert(
                            alert.clone(),
                            if created {
                                AlertChange::Raised
                            } else {
                                AlertChange::Updated
                            },
                        );
                        Ok(alert)
                    }
                    Err(e) => Err(e),
                });
            }
            StoreCommand::RaiseAlert {
                kind,
                severity,
                source,
                message,
                respond_to,
            } => {
                let result = self.state.raise_alert(kind, severity, source, message, now);
                let _ = respond_to.send(match result {
                    Ok((alert, created)) => {
                        trace!(
                            "alert {} {}",
                            alert.kind,
                            if created { "raised" } else { "updated" }
                        );
                        self.publish_alert(
                            alert.clone(),
                            if created {
                                AlertChange::Raised
                            } else {
                                AlertChange::Updated
                            },
                        );
                        Ok(alert)
                    }
                    Err(e) => Err(e),
                });
            }
            StoreCommand::ResolveAlert {
                caller,
                id,
                resolved_by,
                resolution,
                respond_to,
            } => {
                let result =
                    self.state
                        .resolve_alert(caller.as_ref(), id, &resolved_by, resolution, now);
                let _ = respond_to.send(match result {
                    Ok(alert) => {
                        self.publish_alert(alert.clone(), AlertChange::Resolved);
                        Ok(alert)
                    }
                    Err(e) => Err(e),
                });
            }
            StoreCommand::ActiveAlerts {
                severity,
                respond_to,
            } => {
                let _ = respond_to.send(Ok(self.state.active_alerts(severity)));
            }

            StoreCommand::AddMaintenance {
                caller,
                spec,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.add_maintenance(&caller, spec, now));
            }
            StoreCommand::CompleteMaintenance {
                caller,
                id,
                end_time,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.complete_maintenance(&caller, id, end_time));
            }
            StoreCommand::MaintenanceRecords {
                upcoming_only,
                respond_to,
            } => {
                let _ = respond_to.send(Ok(self.state.maintenance_records(upcoming_only, now)));
            }

            StoreCommand::AddBackupSystem {
                caller,
                spec,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.add_backup_system(&caller, spec, now));
            }
            StoreCommand::ListBackupSystems { respond_to } => {
                let _ = respond_to.send(Ok(self.state.list_backup_systems()));
            }
            StoreCommand::GetBackupSystem { id, respond_to } => {
                let _ = respond_to.send(self.state.backup_system(id));
            }
            StoreCommand::ActivateBackup {
                caller,
                id,
                performed_by,
                respond_to,
            } => {
                let result = self
                    .state
                    .activate_backup(caller.as_ref(), id, &performed_by, now);
                let _ = respond_to.send(match result {
                    Ok((pairing, resolved)) => {
                        for alert in resolved {
                            self.publish_alert(alert, AlertChange::Resolved);
                        }
                        Ok(pairing)
                    }
                    Err(e) => Err(e),
                });
            }

            StoreCommand::EmergencyShutdown {
                caller,
                id,
                reason,
                respond_to,
            } => {
                let result = self.state.emergency_shutdown(&caller, id, &reason, now);
                let _ = respond_to.send(match result {
                    Ok((transmitter, alert, created)) => {
                        self.publish_alert(
                            alert,
                            if created {
                                AlertChange::Raised
                            } else {
                                AlertChange::Updated
                            },
                        );
                        Ok(transmitter)
                    }
                    Err(e) => Err(e),
                });
            }

            StoreCommand::RecordTelemetry {
                id,
                reading,
                at,
                respond_to,
            } => {
                let result = self.state.record_telemetry(id, reading, at);
                let _ = respond_to.send(match result {
                    Ok(health_score) => {
                        let _ = self.health_tx.send(HealthEvent {
                            transmitter_id: id,
                            health_score,
                            at,
                        });
                        Ok(health_score)
                    }
                    Err(e) => Err(e),
                });
            }
            StoreCommand::ApplyTransition {
                id,
                to,
                performed_by,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.apply_transition(id, to, &performed_by, now));
            }

            StoreCommand::InsertCommand { row, respond_to } => {
                self.state.insert_command(row);
                let _ = respond_to.send(Ok(()));
            }
            StoreCommand::MarkCommandRunning { id, respond_to } => {
                let _ = respond_to.send(self.state.mark_command_running(id));
            }
            StoreCommand::CompleteCommand { id, respond_to } => {
                let _ = respond_to.send(self.state.complete_command(id, now));
            }
            StoreCommand::FailCommand {
                id,
                reason,
                respond_to,
            } => {
                let _ = respond_to.send(self.state.fail_command(id, reason, now));
            }
            StoreCommand::GetCommand { id, respond_to } => {
                let _ = respond_to.send(self.state.command(id));
            }

            StoreCommand::RecentLogs { limit, respond_to } => {
                let _ = respond_to.send(Ok(self.state.recent_logs(limit)));
            }
            StoreCommand::Statistics {
                from,
                to,
                respond_to,
            } => {
                let _ = respond_to.send(Ok(self.state.statistics(from, to, now)));
            }

            StoreCommand::Shutdown => unreachable!("handled in run()"),
        }
    }
}

/// Handle for the entity store actor
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreCommand>,
    alert_tx: broadcast::Sender<AlertEvent>,
    health_tx: broadcast::Sender<HealthEvent>,
}

impl StoreHandle {
    /// Spawn the store actor with an empty state
    pub fn spawn(config: Config) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (alert_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (health_tx, _) = broadcast::channel(EVENT_BUFFER);

        let actor = EntityStoreActor::new(
            StoreState::new(config),
            command_rx,
            alert_tx.clone(),
            health_tx.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            sender: command_tx,
            alert_tx,
            health_tx,
        }
    }

    /// Subscribe to alert raise/update/resolve events
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertEvent> {
        self.alert_tx.subscribe()
    }

    /// Subscribe to per-tick health score events
    pub fn subscribe_health(&self) -> broadcast::Receiver<HealthEvent> {
        self.health_tx.subscribe()
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<CoreResult<T>>) -> StoreCommand,
    ) -> CoreResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| CoreError::ChannelClosed)?;
        rx.await.map_err(|_| CoreError::ChannelClosed)?
    }

    pub async fn add_transmitter(
        &self,
        caller: Caller,
        spec: NewTransmitter,
    ) -> CoreResult<Transmitter> {
        self.call(|respond_to| StoreCommand::AddTransmitter {
            caller,
            spec,
            respond_to,
        })
        .await
    }

    pub async fn update_transmitter(
        &self,
        caller: Caller,
        id: Uuid,
        update: TransmitterUpdate,
    ) -> CoreResult<Transmitter> {
        self.call(|respond_to| StoreCommand::UpdateTransmitter {
            caller,
            id,
            update,
            respond_to,
        })
        .await
    }

    pub async fn delete_transmitter(&self, caller: Caller, id: Uuid) -> CoreResult<()> {
        self.call(|respond_to| StoreCommand::DeleteTransmitter {
            caller,
            id,
            respond_to,
        })
        .await
    }

    pub async fn transmitter(&self, id: Uuid) -> CoreResult<Transmitter> {
        self.call(|respond_to| StoreCommand::GetTransmitter { id, respond_to })
            .await
    }

    pub async fn list_transmitters(&self) -> CoreResult<Vec<Transmitter>> {
        self.call(|respond_to| StoreCommand::ListTransmitters { respond_to })
            .await
    }

    pub async fn add_channel(&self, caller: Caller, spec: NewChannel) -> CoreResult<Channel> {
        self.call(|respond_to| StoreCommand::AddChannel {
            caller,
            spec,
            respond_to,
        })
        .await
    }

    pub async fn update_channel(
        &self,
        caller: Caller,
        id: Uuid,
        update: ChannelUpdate,
    ) -> CoreResult<Channel> {
        self.call(|respond_to| StoreCommand::UpdateChannel {
            caller,
            id,
            update,
            respond_to,
        })
        .await
    }

    pub async fn delete_channel(&self, caller: Caller, id: Uuid) -> CoreResult<()> {
        self.call(|respond_to| StoreCommand::DeleteChannel {
            caller,
            id,
            respond_to,
        })
        .await
    }

    pub async fn channel(&self, id: Uuid) -> CoreResult<Channel> {
        self.call(|respond_to| StoreCommand::GetChannel { id, respond_to })
            .await
    }

    pub async fn list_channels(&self) -> CoreResult<Vec<Channel>> {
        self.call(|respond_to| StoreCommand::ListChannels { respond_to })
            .await
    }

    pub async fn add_antenna(&self, caller: Caller, spec: NewAntenna) -> CoreResult<Antenna> {
        self.call(|respond_to| StoreCommand::AddAntenna {
            caller,
            spec,
            respond_to,
        })
        .await
    }

    pub async fn update_antenna(
        &self,
        caller: Caller,
        id: Uuid,
        update: AntennaUpdate,
    ) -> CoreResult<Antenna> {
        self.call(|respond_to| StoreCommand::UpdateAntenna {
            caller,
            id,
            update,
            respond_to,
        })
        .await
    }

    pub async fn delete_antenna(&self, caller: Caller, id: Uuid) -> CoreResult<()> {
        self.call(|respond_to| StoreCommand::DeleteAntenna {
            caller,
            id,
            respond_to,
        })
        .await
    }

    pub async fn list_antennas(&self) -> CoreResult<Vec<Antenna>> {
        self.call(|respond_to| StoreCommand::ListAntennas { respond_to })
            .await
    }

    pub async fn create_alert(
        &self,
        caller: Caller,
        kind: AlertKind,
        severity: Severity,
        source: AlertSource,
        message: impl Into<String>,
    ) -> CoreResult<Alert> {
        let message = message.into();
        self.call(|respond_to| StoreCommand::CreateAlert {
            caller,
            kind,
            severity,
            source,
            message,
            respond_to,
        })
        .await
    }

    /// System-internal raise; not access-checked.
    pub async fn raise_alert(
        &self,
        kind: AlertKind,
        severity: Severity,
        source: AlertSource,
        message: impl Into<String>,
    ) -> CoreResult<Alert> {
        let message = message.into();
        self.call(|respond_to| StoreCommand::RaiseAlert {
            kind,
            severity,
            source,
            message,
            respond_to,
        })
        .await
    }

    pub async fn resolve_alert(
        &self,
        caller: Option<Caller>,
        id: Uuid,
        resolved_by: impl Into<String>,
        resolution: impl Into<String>,
    ) -> CoreResult<Alert> {
        let resolved_by = resolved_by.into();
        let resolution = resolution.into();
        self.call(|respond_to| StoreCommand::ResolveAlert {
            caller,
            id,
            resolved_by,
            resolution,
            respond_to,
        })
        .await
    }

    pub async fn active_alerts(&self, severity: Option<Severity>) -> CoreResult<Vec<Alert>> {
        self.call(|respond_to| StoreCommand::ActiveAlerts {
            severity,
            respond_to,
        })
        .await
    }

    pub async fn add_maintenance(
        &self,
        caller: Caller,
        spec: NewMaintenance,
    ) -> CoreResult<MaintenanceRecord> {
        self.call(|respond_to| StoreCommand::AddMaintenance {
            caller,
            spec,
            respond_to,
        })
        .await
    }

    pub async fn complete_maintenance(
        &self,
        caller: Caller,
        id: Uuid,
        end_time: DateTime<Utc>,
    ) -> CoreResult<MaintenanceRecord> {
        self.call(|respond_to| StoreCommand::CompleteMaintenance {
            caller,
            id,
            end_time,
            respond_to,
        })
        .await
    }

    pub async fn maintenance_records(
        &self,
        upcoming_only: bool,
    ) -> CoreResult<Vec<MaintenanceRecord>> {
        self.call(|respond_to| StoreCommand::MaintenanceRecords {
            upcoming_only,
            respond_to,
        })
        .await
    }

    pub async fn add_backup_system(
        &self,
        caller: Caller,
        spec: NewBackupSystem,
    ) -> CoreResult<BackupSystem> {
        self.call(|respond_to| StoreCommand::AddBackupSystem {
            caller,
            spec,
            respond_to,
        })
        .await
    }

    pub async fn list_backup_systems(&self) -> CoreResult<Vec<BackupSystem>> {
        self.call(|respond_to| StoreCommand::ListBackupSystems { respond_to })
            .await
    }

    pub async fn backup_system(&self, id: Uuid) -> CoreResult<BackupSystem> {
        self.call(|respond_to| StoreCommand::GetBackupSystem { id, respond_to })
            .await
    }

    /// Swap a pairing's active roles. `caller` is `None` on the automatic
    /// failover path; manual activation passes the operator.
    pub async fn activate_backup(
        &self,
        caller: Option<Caller>,
        id: Uuid,
        performed_by: impl Into<String>,
    ) -> CoreResult<BackupSystem> {
        let performed_by = performed_by.into();
        self.call(|respond_to| StoreCommand::ActivateBackup {
            caller,
            id,
            performed_by,
            respond_to,
        })
        .await
    }

    pub async fn emergency_shutdown(
        &self,
        caller: Caller,
        id: Uuid,
        reason: impl Into<String>,
    ) -> CoreResult<Transmitter> {
        let reason = reason.into();
        self.call(|respond_to| StoreCommand::EmergencyShutdown {
            caller,
            id,
            reason,
            respond_to,
        })
        .await
    }

    pub async fn record_telemetry(
        &self,
        id: Uuid,
        reading: TelemetryReading,
        at: DateTime<Utc>,
    ) -> CoreResult<f64> {
        self.call(|respond_to| StoreCommand::RecordTelemetry {
            id,
            reading,
            at,
            respond_to,
        })
        .await
    }

    pub async fn apply_transition(
        &self,
        id: Uuid,
        to: TransmitterStatus,
        performed_by: impl Into<String>,
    ) -> CoreResult<TransmitterStatus> {
        let performed_by = performed_by.into();
        self.call(|respond_to| StoreCommand::ApplyTransition {
            id,
            to,
            performed_by,
            respond_to,
        })
        .await
    }

    pub async fn insert_command(&self, row: RemoteCommand) -> CoreResult<()> {
        self.call(|respond_to| StoreCommand::InsertCommand { row, respond_to })
            .await
    }

    pub async fn mark_command_running(&self, id: Uuid) -> CoreResult<()> {
        self.call(|respond_to| StoreCommand::MarkCommandRunning { id, respond_to })
            .await
    }

    pub async fn complete_command(&self, id: Uuid) -> CoreResult<RemoteCommand> {
        self.call(|respond_to| StoreCommand::CompleteCommand { id, respond_to })
            .await
    }

    pub async fn fail_command(
        &self,
        id: Uuid,
        reason: impl Into<String>,
    ) -> CoreResult<RemoteCommand> {
        let reason = reason.into();
        self.call(|respond_to| StoreCommand::FailCommand {
            id,
            reason,
            respond_to,
        })
        .await
    }

    pub async fn command(&self, id: Uuid) -> CoreResult<RemoteCommand> {
        self.call(|respond_to| StoreCommand::GetCommand { id, respond_to })
            .await
    }

    pub async fn recent_logs(&self, limit: usize) -> CoreResult<Vec<LogEntry>> {
        self.call(|respond_to| StoreCommand::RecentLogs { limit, respond_to })
            .await
    }

    pub async fn statistics_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<StatisticsSnapshot> {
        self.call(|respond_to| StoreCommand::Statistics {
            from,
            to,
            respond_to,
        })
        .await
    }

    /// Statistics for the current UTC day
    pub async fn today_statistics(&self) -> CoreResult<StatisticsSnapshot> {
        let now = Utc::now();
        let from = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        self.statistics_between(from, now).await
    }

    /// Shutdown the store actor
    pub async fn shutdown(&self) {
        if self.sender.send(StoreCommand::Shutdown).await.is_err() {
            warn!("store actor already stopped");
        }
    }
}
