//! Authoritative in-memory entity state
//!
//! `StoreState` owns every entity table and implements the domain operations
//! synchronously. The store actor wraps it as a single writer, which is what
//! makes cross-entity operations (the failover swap) atomic to concurrent
//! readers. Tests exercise the state directly.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::TelemetryReading;
use crate::access::{Caller, Role, ensure_write_access};
use crate::config::{Config, HealthConfig};
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Alert, AlertKind, AlertSource, Antenna, AntennaKind, BackupSystem, Channel, ChannelStatus,
    CommandStatus, LogEntry, MaintenanceKind, MaintenanceRecord, PairMember, RemoteCommand,
    Severity, StatisticsSnapshot, Transmitter, TransmitterStatus,
};
use crate::stats;

/// Input for creating a transmitter
#[derive(Debug, Clone)]
pub struct NewTransmitter {
    pub name: String,
    pub location: String,
    pub model: String,
    pub serial: String,
    pub frequency_mhz: f64,
    pub is_backup: bool,
    pub status: TransmitterStatus,
    pub access_roles: HashSet<Role>,
}

/// Descriptive-field update for a transmitter.
///
/// Status and health score are owned by the state machine and the telemetry
/// loop; they cannot be written here.
#[derive(Debug, Clone, Default)]
pub struct TransmitterUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub frequency_mhz: Option<f64>,
    pub is_backup: Option<bool>,
    pub access_roles: Option<HashSet<Role>>,
}

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub transmitter_id: Uuid,
    pub name: String,
    pub frequency_mhz: f64,
    pub power: f64,
    pub signal_quality: f64,
    pub status: ChannelStatus,
    pub access_roles: HashSet<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub frequency_mhz: Option<f64>,
    pub power: Option<f64>,
    pub signal_quality: Option<f64>,
    pub status: Option<ChannelStatus>,
    pub access_roles: Option<HashSet<Role>>,
}

#[derive(Debug, Clone)]
pub struct NewAntenna {
    pub transmitter_id: Uuid,
    pub kind: AntennaKind,
    pub orientation_deg: f64,
    pub access_roles: HashSet<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct AntennaUpdate {
    pub kind: Option<AntennaKind>,
    pub orientation_deg: Option<f64>,
    pub access_roles: Option<HashSet<Role>>,
}

#[derive(Debug, Clone)]
pub struct NewMaintenance {
    pub transmitter_id: Uuid,
    pub kind: MaintenanceKind,
    pub description: String,
    pub performed_by: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBackupSystem {
    pub name: String,
    pub primary_id: Uuid,
    pub backup_id: Uuid,
    pub auto_switch_enabled: bool,
    pub access_roles: HashSet<Role>,
}

/// Compute the derived 0-100 health score.
///
/// Weighted blend of signal quality, temperature deviation from nominal,
/// and unresolved alert pressure; each component clamped to 0..=100.
pub fn compute_health_score(
    config: &HealthConfig,
    signal_quality: f64,
    temperature: f64,
    unresolved_alerts: usize,
) -> f64 {
    let signal = signal_quality.clamp(0.0, 100.0);

    let deviation = (temperature - config.nominal_temperature).abs();
    let temp = (100.0 - deviation * config.temperature_penalty_per_degree).clamp(0.0, 100.0);

    let alerts =
        (100.0 - unresolved_alerts as f64 * config.alert_penalty).clamp(0.0, 100.0);

    let score = config.signal_weight * signal
        + config.temperature_weight * temp
        + config.alert_weight * alerts;

    score.clamp(0.0, 100.0)
}

pub struct StoreState {
    config: Config,
    transmitters: HashMap<Uuid, Transmitter>,
    channels: HashMap<Uuid, Channel>,
    antennas: HashMap<Uuid, Antenna>,
    alerts: HashMap<Uuid, Alert>,
    maintenance: HashMap<Uuid, MaintenanceRecord>,
    backups: HashMap<Uuid, BackupSystem>,
    commands: HashMap<Uuid, RemoteCommand>,

    /// Append-only audit trail
    logs: Vec<LogEntry>,

    /// Status to restore when maintenance completes
    prior_status: HashMap<Uuid, TransmitterStatus>,

    /// Last telemetry sample time, for uptime accounting
    last_sample: HashMap<Uuid, DateTime<Utc>>,
}

impl StoreState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transmitters: HashMap::new(),
            channels: HashMap::new(),
            antennas: HashMap::new(),
            alerts: HashMap::new(),
            maintenance: HashMap::new(),
            backups: HashMap::new(),
            commands: HashMap::new(),
            logs: Vec::new(),
            prior_status: HashMap::new(),
            last_sample: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn log(
        &mut self,
        transmitter_id: Option<Uuid>,
        channel_id: Option<Uuid>,
        action: impl Into<String>,
        performed_by: impl Into<String>,
        details: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) {
        self.logs.push(LogEntry {
            id: Uuid::new_v4(),
            transmitter_id,
            channel_id,
            action: action.into(),
            performed_by: performed_by.into(),
            timestamp,
            details: details.into(),
        });
    }

    // ========================================================================
    // Transmitters
    // ========================================================================

    pub fn add_transmitter(
        &mut self,
        caller: &Caller,
        spec: NewTransmitter,
        now: DateTime<Utc>,
    ) -> CoreResult<Transmitter> {
        ensure_write_access(&spec.access_roles, caller)?;

        let nominal = self.config.health.nominal_temperature;
        let transmitter = Transmitter {
            id: Uuid::new_v4(),
            name: spec.name,
            location: spec.location,
            model: spec.model,
            serial: spec.serial,
            status: spec.status,
            power_output: 0.0,
            signal_quality: 100.0,
            temperature: nominal,
            health_score: 100.0,
            uptime_secs: 0,
            is_backup: spec.is_backup,
            frequency_mhz: spec.frequency_mhz,
            access_roles: spec.access_roles,
        };

        self.log(
            Some(transmitter.id),
            None,
            "transmitter_added",
            caller.name.clone(),
            transmitter.status.as_str(),
            now,
        );

        self.transmitters.insert(transmitter.id, transmitter.clone());
        Ok(transmitter)
    }

    pub fn update_transmitter(
        &mut self,
        caller: &Caller,
        id: Uuid,
        update: TransmitterUpdate,
    ) -> CoreResult<Transmitter> {
        let transmitter = self
            .transmitters
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {id}")))?;
        ensure_write_access(&transmitter.access_roles, caller)?;

        if let Some(name) = update.name {
            transmitter.name = name;
        }
        if let Some(location) = update.location {
            transmitter.location = location;
        }
        if let Some(model) = update.model {
            transmitter.model = model;
        }
        if let Some(serial) = update.serial {
            transmitter.serial = serial;
        }
        if let Some(frequency) = update.frequency_mhz {
            transmitter.frequency_mhz = frequency;
        }
        if let Some(is_backup) = update.is_backup {
            transmitter.is_backup = is_backup;
        }
        if let Some(roles) = update.access_roles {
            transmitter.access_roles = roles;
        }

        Ok(transmitter.clone())
    }

    pub fn delete_transmitter(&mut self, caller: &Caller, id: Uuid) -> CoreResult<()> {
        let transmitter = self
            .transmitters
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {id}")))?;
        ensure_write_access(&transmitter.access_roles, caller)?;

        if self
            .backups
            .values()
            .any(|b| b.primary_id == id || b.backup_id == id)
        {
            return Err(CoreError::Validation(format!(
                "transmitter {id} is part of a backup pairing"
            )));
        }

        self.transmitters.remove(&id);
        self.channels.retain(|_, c| c.transmitter_id != id);
        self.antennas.retain(|_, a| a.transmitter_id != id);
        self.prior_status.remove(&id);
        self.last_sample.remove(&id);
        Ok(())
    }

    pub fn transmitter(&self, id: Uuid) -> CoreResult<Transmitter> {
        self.transmitters
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {id}")))
    }

    pub fn list_transmitters(&self) -> Vec<Transmitter> {
        let mut all: Vec<_> = self.transmitters.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Apply one status transition, enforcing the edge table.
    ///
    /// On entering `Offline` or `Error`, active channels of the transmitter
    /// are suspended so no channel stays `active` on a dead unit.
    pub fn apply_transition(
        &mut self,
        id: Uuid,
        to: TransmitterStatus,
        performed_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<TransmitterStatus> {
        let transmitter = self
            .transmitters
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {id}")))?;

        let from = transmitter.status;
        if !from.can_transition(to) {
            return Err(CoreError::InvalidTransition { from, to });
        }

        transmitter.status = to;

        if to != TransmitterStatus::Online {
            self.last_sample.remove(&id);
        }

        if matches!(to, TransmitterStatus::Offline | TransmitterStatus::Error) {
            for channel in self.channels.values_mut() {
                if channel.transmitter_id == id && channel.status == ChannelStatus::Active {
                    channel.status = ChannelStatus::Idle;
                }
            }
        }

        self.log(
            Some(id),
            None,
            "status_change",
            performed_by,
            to.as_str(),
            now,
        );

        Ok(to)
    }

    /// Apply a telemetry reading and recompute the derived health score.
    ///
    /// Uptime advances only while the unit is online. Returns the new score.
    pub fn record_telemetry(
        &mut self,
        id: Uuid,
        reading: TelemetryReading,
        at: DateTime<Utc>,
    ) -> CoreResult<f64> {
        let unresolved = self.unresolved_alert_count(id);

        let status = self
            .transmitters
            .get(&id)
            .map(|t| t.status)
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {id}")))?;

        let mut elapsed_secs = 0;
        if status == TransmitterStatus::Online {
            if let Some(last) = self.last_sample.get(&id) {
                let elapsed = (at - *last).num_seconds();
                if elapsed > 0 {
                    elapsed_secs = elapsed as u64;
                }
            }
            self.last_sample.insert(id, at);
        }

        let health = &self.config.health;
        let transmitter = self.transmitters.get_mut(&id).expect("checked above");

        transmitter.signal_quality = reading.signal_quality.clamp(0.0, 100.0);
        transmitter.temperature = reading.temperature;
        transmitter.power_output = reading.power_output.max(0.0);
        transmitter.uptime_secs += elapsed_secs;

        let score = compute_health_score(
            health,
            transmitter.signal_quality,
            transmitter.temperature,
            unresolved,
        );
        transmitter.health_score = score;

        Ok(score)
    }

    // ========================================================================
    // Channels and antennas
    // ========================================================================

    fn check_channel_binding(&self, transmitter_id: Uuid, status: ChannelStatus) -> CoreResult<()> {
        let transmitter = self
            .transmitters
            .get(&transmitter_id)
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {transmitter_id}")))?;

        if status == ChannelStatus::Active
            && matches!(
                transmitter.status,
                TransmitterStatus::Offline | TransmitterStatus::Error
            )
        {
            return Err(CoreError::Validation(format!(
                "channel cannot be active while transmitter {} is {}",
                transmitter_id, transmitter.status
            )));
        }

        Ok(())
    }

    pub fn add_channel(&mut self, caller: &Caller, spec: NewChannel) -> CoreResult<Channel> {
        ensure_write_access(&spec.access_roles, caller)?;
        self.check_channel_binding(spec.transmitter_id, spec.status)?;

        let channel = Channel {
            id: Uuid::new_v4(),
            transmitter_id: spec.transmitter_id,
            name: spec.name,
            frequency_mhz: spec.frequency_mhz,
            power: spec.power,
            signal_quality: spec.signal_quality.clamp(0.0, 100.0),
            status: spec.status,
            access_roles: spec.access_roles,
        };

        self.channels.insert(channel.id, channel.clone());
        Ok(channel)
    }

    pub fn update_channel(
        &mut self,
        caller: &Caller,
        id: Uuid,
        update: ChannelUpdate,
    ) -> CoreResult<Channel> {
        let channel = self
            .channels
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("channel {id}")))?;
        ensure_write_access(&channel.access_roles, caller)?;

        if let Some(status) = update.status {
            self.check_channel_binding(channel.transmitter_id, status)?;
        }

        let channel = self.channels.get_mut(&id).expect("checked above");
        if let Some(name) = update.name {
            channel.name = name;
        }
        if let Some(frequency) = update.frequency_mhz {
            channel.frequency_mhz = frequency;
        }
        if let Some(power) = update.power {
            channel.power = power;
        }
        if let Some(signal) = update.signal_quality {
            channel.signal_quality = signal.clamp(0.0, 100.0);
        }
        if let Some(status) = update.status {
            channel.status = status;
        }
        if let Some(roles) = update.access_roles {
            channel.access_roles = roles;
        }

        Ok(channel.clone())
    }

    pub fn delete_channel(&mut self, caller: &Caller, id: Uuid) -> CoreResult<()> {
        let channel = self
            .channels
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("channel {id}")))?;
        ensure_write_access(&channel.access_roles, caller)?;

        self.channels.remove(&id);
        Ok(())
    }

    pub fn channel(&self, id: Uuid) -> CoreResult<Channel> {
        self.channels
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("channel {id}")))
    }

    pub fn list_channels(&self) -> Vec<Channel> {
        let mut all: Vec<_> = self.channels.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn add_antenna(&mut self, caller: &Caller, spec: NewAntenna) -> CoreResult<Antenna> {
        ensure_write_access(&spec.access_roles, caller)?;

        if !self.transmitters.contains_key(&spec.transmitter_id) {
            return Err(CoreError::NotFound(format!(
                "transmitter {}",
                spec.transmitter_id
            )));
        }

        let antenna = Antenna {
            id: Uuid::new_v4(),
            transmitter_id: spec.transmitter_id,
            kind: spec.kind,
            orientation_deg: spec.orientation_deg.rem_euclid(360.0),
            access_roles: spec.access_roles,
        };

        self.antennas.insert(antenna.id, antenna.clone());
        Ok(antenna)
    }

    pub fn update_antenna(
        &mut self,
        caller: &Caller,
        id: Uuid,
        update: AntennaUpdate,
    ) -> CoreResult<Antenna> {
        let antenna = self
            .antennas
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("antenna {id}")))?;
        ensure_write_access(&antenna.access_roles, caller)?;

        if let Some(kind) = update.kind {
            antenna.kind = kind;
        }
        if let Some(orientation) = update.orientation_deg {
            antenna.orientation_deg = orientation.rem_euclid(360.0);
        }
        if let Some(roles) = update.access_roles {
            antenna.access_roles = roles;
        }

        Ok(antenna.clone())
    }

    pub fn delete_antenna(&mut self, caller: &Caller, id: Uuid) -> CoreResult<()> {
        let antenna = self
            .antennas
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("antenna {id}")))?;
        ensure_write_access(&antenna.access_roles, caller)?;

        self.antennas.remove(&id);
        Ok(())
    }

    pub fn list_antennas(&self) -> Vec<Antenna> {
        let mut all: Vec<_> = self.antennas.values().cloned().collect();
        all.sort_by_key(|a| (a.transmitter_id, a.id));
        all
    }

    // ========================================================================
    // Alerts
    // ========================================================================

    fn source_access_roles(&self, source: AlertSource) -> CoreResult<HashSet<Role>> {
        match source {
            AlertSource::Transmitter(id) => self
                .transmitters
                .get(&id)
                .map(|t| t.access_roles.clone())
                .ok_or_else(|| CoreError::NotFound(format!("transmitter {id}"))),
            AlertSource::Channel(id) => self
                .channels
                .get(&id)
                .map(|c| c.access_roles.clone())
                .ok_or_else(|| CoreError::NotFound(format!("channel {id}"))),
        }
    }

    fn unresolved_alert_count(&self, transmitter_id: Uuid) -> usize {
        self.alerts
            .values()
            .filter(|a| !a.resolved && a.source == AlertSource::Transmitter(transmitter_id))
            .count()
    }

    /// Raise an alert, deduplicating against unresolved rows.
    ///
    /// An unresolved alert with the same `(kind, source)` is updated in
    /// place (message and timestamp); otherwise a new row is created with
    /// access roles inherited from the source entity. Returns the row and
    /// whether it was newly created.
    pub fn raise_alert(
        &mut self,
        kind: AlertKind,
        severity: Severity,
        source: AlertSource,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<(Alert, bool)> {
        let access_roles = self.source_access_roles(source)?;
        let message = message.into();

        if let Some(existing) = self
            .alerts
            .values_mut()
            .find(|a| !a.resolved && a.kind == kind && a.source == source)
        {
            existing.message = message;
            existing.detected_at = now;
            return Ok((existing.clone(), false));
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            kind,
            severity,
            source,
            message,
            detected_at: now,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            resolution: None,
            access_roles,
        };

        self.alerts.insert(alert.id, alert.clone());
        Ok((alert, true))
    }

    /// Collaborator-facing alert creation; access-checked against the
    /// source entity before delegating to [`StoreState::raise_alert`].
    pub fn create_alert(
        &mut self,
        caller: &Caller,
        kind: AlertKind,
        severity: Severity,
        source: AlertSource,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<(Alert, bool)> {
        let roles = self.source_access_roles(source)?;
        ensure_write_access(&roles, caller)?;
        self.raise_alert(kind, severity, source, message, now)
    }

    /// Resolve an alert.
    ///
    /// Resolving the last unresolved alert of a transmitter in `Error`
    /// returns the unit to `Standby`. `caller` is `None` for system-driven
    /// resolution (the failover controller).
    pub fn resolve_alert(
        &mut self,
        caller: Option<&Caller>,
        id: Uuid,
        resolved_by: &str,
        resolution: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<Alert> {
        let alert = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("alert {id}")))?;

        if let Some(caller) = caller {
            ensure_write_access(&alert.access_roles, caller)?;
        }

        if alert.resolved {
            return Err(CoreError::AlreadyResolved(id));
        }

        alert.resolved = true;
        alert.resolved_by = Some(resolved_by.to_string());
        alert.resolved_at = Some(now);
        alert.resolution = Some(resolution.into());

        let resolved = alert.clone();
        let (transmitter_id, channel_id) = match resolved.source {
            AlertSource::Transmitter(tid) => (Some(tid), None),
            AlertSource::Channel(cid) => (None, Some(cid)),
        };

        self.log(
            transmitter_id,
            channel_id,
            "alert_resolved",
            resolved_by,
            format!("{}: {}", resolved.kind, resolved.message),
            now,
        );

        if let Some(tid) = transmitter_id {
            let in_error = self
                .transmitters
                .get(&tid)
                .is_some_and(|t| t.status == TransmitterStatus::Error);
            if in_error && self.unresolved_alert_count(tid) == 0 {
                self.apply_transition(tid, TransmitterStatus::Standby, resolved_by, now)?;
            }
        }

        Ok(resolved)
    }

    /// Unresolved alerts in triage order: severity descending, ties broken
    /// by earliest detection.
    pub fn active_alerts(&self, severity: Option<Severity>) -> Vec<Alert> {
        let mut active: Vec<_> = self
            .alerts
            .values()
            .filter(|a| !a.resolved && severity.is_none_or(|s| a.severity == s))
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.detected_at.cmp(&b.detected_at))
        });
        active
    }

    pub fn alert(&self, id: Uuid) -> CoreResult<Alert> {
        self.alerts
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("alert {id}")))
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Record a maintenance event. A record whose start time has already
    /// arrived moves the transmitter to `Maintenance` (remembering the prior
    /// status); future-dated records are schedule-only.
    pub fn add_maintenance(
        &mut self,
        caller: &Caller,
        spec: NewMaintenance,
        now: DateTime<Utc>,
    ) -> CoreResult<MaintenanceRecord> {
        let transmitter = self
            .transmitters
            .get(&spec.transmitter_id)
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {}", spec.transmitter_id)))?;
        ensure_write_access(&transmitter.access_roles, caller)?;

        let record = MaintenanceRecord {
            id: Uuid::new_v4(),
            transmitter_id: spec.transmitter_id,
            kind: spec.kind,
            description: spec.description,
            performed_by: spec.performed_by,
            start_time: spec.start_time,
            end_time: None,
            duration_secs: None,
        };

        if spec.start_time <= now {
            let current = transmitter.status;
            if current.can_transition(TransmitterStatus::Maintenance) {
                self.prior_status.insert(spec.transmitter_id, current);
                self.apply_transition(
                    spec.transmitter_id,
                    TransmitterStatus::Maintenance,
                    &record.performed_by,
                    now,
                )?;
            }
        }

        self.log(
            Some(spec.transmitter_id),
            None,
            "maintenance_started",
            record.performed_by.clone(),
            record.description.clone(),
            spec.start_time,
        );

        self.maintenance.insert(record.id, record.clone());
        Ok(record)
    }

    /// Close a maintenance record and restore the transmitter's prior
    /// status (falling back to `Standby`).
    pub fn complete_maintenance(
        &mut self,
        caller: &Caller,
        id: Uuid,
        end_time: DateTime<Utc>,
    ) -> CoreResult<MaintenanceRecord> {
        let record = self
            .maintenance
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("maintenance record {id}")))?
            .clone();

        let transmitter = self
            .transmitters
            .get(&record.transmitter_id)
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {}", record.transmitter_id)))?;
        ensure_write_access(&transmitter.access_roles, caller)?;
        let transmitter_status = transmitter.status;

        if record.end_time.is_some() {
            return Err(CoreError::Validation(format!(
                "maintenance record {id} is already completed"
            )));
        }
        if end_time < record.start_time {
            return Err(CoreError::Validation(
                "maintenance end time precedes start time".to_string(),
            ));
        }

        if transmitter_status == TransmitterStatus::Maintenance {
            let prior = self
                .prior_status
                .remove(&record.transmitter_id)
                .unwrap_or(TransmitterStatus::Standby);
            let restore = if TransmitterStatus::Maintenance.can_transition(prior) {
                prior
            } else {
                TransmitterStatus::Standby
            };
            self.apply_transition(record.transmitter_id, restore, &caller.name, end_time)?;
        }

        let record = self.maintenance.get_mut(&id).expect("checked above");
        record.end_time = Some(end_time);
        record.duration_secs = Some((end_time - record.start_time).num_seconds().max(0) as u64);
        let record = record.clone();

        self.log(
            Some(record.transmitter_id),
            None,
            "maintenance_completed",
            caller.name.clone(),
            record.description.clone(),
            end_time,
        );

        Ok(record)
    }

    pub fn maintenance_records(&self, upcoming_only: bool, now: DateTime<Utc>) -> Vec<MaintenanceRecord> {
        let mut records: Vec<_> = self
            .maintenance
            .values()
            .filter(|r| !upcoming_only || r.start_time > now)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.start_time);
        records
    }

    // ========================================================================
    // Backup pairings
    // ========================================================================

    pub fn add_backup_system(
        &mut self,
        caller: &Caller,
        spec: NewBackupSystem,
        now: DateTime<Utc>,
    ) -> CoreResult<BackupSystem> {
        ensure_write_access(&spec.access_roles, caller)?;

        if spec.primary_id == spec.backup_id {
            return Err(CoreError::Validation(
                "primary and backup transmitter must differ".to_string(),
            ));
        }
        for id in [spec.primary_id, spec.backup_id] {
            if !self.transmitters.contains_key(&id) {
                return Err(CoreError::NotFound(format!("transmitter {id}")));
            }
            if self
                .backups
                .values()
                .any(|b| b.primary_id == id || b.backup_id == id)
            {
                return Err(CoreError::Validation(format!(
                    "transmitter {id} is already part of a backup pairing"
                )));
            }
        }

        let pairing = BackupSystem {
            id: Uuid::new_v4(),
            name: spec.name,
            primary_id: spec.primary_id,
            backup_id: spec.backup_id,
            active_member: PairMember::Primary,
            auto_switch_enabled: spec.auto_switch_enabled,
            switch_count: 0,
            access_roles: spec.access_roles,
        };

        self.log(
            Some(spec.primary_id),
            None,
            "backup_pairing_added",
            caller.name.clone(),
            pairing.name.clone(),
            now,
        );

        self.backups.insert(pairing.id, pairing.clone());
        Ok(pairing)
    }

    pub fn list_backup_systems(&self) -> Vec<BackupSystem> {
        let mut all: Vec<_> = self.backups.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn backup_system(&self, id: Uuid) -> CoreResult<BackupSystem> {
        self.backups
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("backup system {id}")))
    }

    /// Swap the active roles of a backup pairing.
    ///
    /// Both member transitions are validated before anything is written, so
    /// either all three effects commit (demotion, promotion, switch count)
    /// or none do. Telemetry alerts on the demoted member are auto-resolved
    /// since the backup now carries the feed; the resolved rows are returned
    /// alongside the updated pairing so they can be published.
    pub fn activate_backup(
        &mut self,
        caller: Option<&Caller>,
        id: Uuid,
        performed_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<(BackupSystem, Vec<Alert>)> {
        let pairing = self
            .backups
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("backup system {id}")))?
            .clone();

        if let Some(caller) = caller {
            ensure_write_access(&pairing.access_roles, caller)?;
        }

        let demote_id = pairing.active_id();
        let promote_id = pairing.inactive_id();

        let demote_status = self.transmitter(demote_id)?.status;
        let promote_status = self.transmitter(promote_id)?.status;

        // Validate every edge up front; nothing is mutated on failure.
        if promote_status != TransmitterStatus::Online
            && !promote_status.can_transition(TransmitterStatus::Online)
        {
            return Err(CoreError::InvalidTransition {
                from: promote_status,
                to: TransmitterStatus::Online,
            });
        }
        if demote_status != TransmitterStatus::Standby
            && !demote_status.can_transition(TransmitterStatus::Standby)
        {
            return Err(CoreError::InvalidTransition {
                from: demote_status,
                to: TransmitterStatus::Standby,
            });
        }

        if demote_status != TransmitterStatus::Standby {
            self.apply_transition(demote_id, TransmitterStatus::Standby, performed_by, now)?;
        }
        if promote_status != TransmitterStatus::Online {
            self.apply_transition(promote_id, TransmitterStatus::Online, performed_by, now)?;
        }

        let pairing = self.backups.get_mut(&id).expect("checked above");
        pairing.active_member = match pairing.active_member {
            PairMember::Primary => PairMember::Backup,
            PairMember::Backup => PairMember::Primary,
        };
        pairing.switch_count += 1;
        let updated = pairing.clone();

        self.log(
            Some(promote_id),
            None,
            "backup_activated",
            performed_by,
            format!("{} now carries the feed", updated.name),
            now,
        );

        // The degraded unit is no longer on air; close its telemetry alerts.
        let superseded: Vec<Uuid> = self
            .alerts
            .values()
            .filter(|a| {
                !a.resolved
                    && a.source == AlertSource::Transmitter(demote_id)
                    && matches!(a.kind, AlertKind::SignalDegraded | AlertKind::Overheat)
            })
            .map(|a| a.id)
            .collect();
        let mut resolved = Vec::with_capacity(superseded.len());
        for alert_id in superseded {
            resolved.push(self.resolve_alert(
                None,
                alert_id,
                performed_by,
                "superseded by backup activation",
                now,
            )?);
        }

        Ok((updated, resolved))
    }

    // ========================================================================
    // Remote commands and emergency shutdown
    // ========================================================================

    pub fn insert_command(&mut self, command: RemoteCommand) {
        self.commands.insert(command.id, command);
    }

    pub fn command(&self, id: Uuid) -> CoreResult<RemoteCommand> {
        self.commands
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("command {id}")))
    }

    pub fn mark_command_running(&mut self, id: Uuid) -> CoreResult<()> {
        let command = self
            .commands
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("command {id}")))?;
        command.status = CommandStatus::Running;
        Ok(())
    }

    /// Commit a successfully executed command: re-check legality against the
    /// current status (an emergency shutdown may have raced the execution),
    /// apply the resulting transitions, and record the terminal row.
    pub fn complete_command(&mut self, id: Uuid, now: DateTime<Utc>) -> CoreResult<RemoteCommand> {
        let command = self
            .commands
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("command {id}")))?
            .clone();

        let transmitter = self.transmitter(command.transmitter_id)?;

        if !command.command.allowed_from(transmitter.status) {
            let row = self.commands.get_mut(&id).expect("checked above");
            row.status = CommandStatus::Failed;
            row.completed_at = Some(now);
            row.result = Some(format!(
                "no longer legal from state {}",
                transmitter.status
            ));
            return Ok(row.clone());
        }

        for &next in command.command.resulting_statuses() {
            self.apply_transition(command.transmitter_id, next, &command.requested_by, now)?;
        }

        self.log(
            Some(command.transmitter_id),
            None,
            format!("Remote command: {}", command.command),
            command.requested_by.clone(),
            "completed".to_string(),
            now,
        );

        let row = self.commands.get_mut(&id).expect("checked above");
        row.status = CommandStatus::Completed;
        row.completed_at = Some(now);
        row.result = Some("ok".to_string());
        Ok(row.clone())
    }

    /// Record a terminal failure without touching transmitter state.
    pub fn fail_command(
        &mut self,
        id: Uuid,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<RemoteCommand> {
        let command = self
            .commands
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("command {id}")))?;
        command.status = CommandStatus::Failed;
        command.completed_at = Some(now);
        command.result = Some(reason.into());
        Ok(command.clone())
    }

    /// Force a transmitter offline, bypassing the command queue, and raise a
    /// critical alert unconditionally. Returns the transmitter and the
    /// raised alert row (with its created/updated flag) for publication.
    pub fn emergency_shutdown(
        &mut self,
        caller: &Caller,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<(Transmitter, Alert, bool)> {
        let transmitter = self
            .transmitters
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("transmitter {id}")))?;
        ensure_write_access(&transmitter.access_roles, caller)?;

        if transmitter.status != TransmitterStatus::Offline {
            self.apply_transition(id, TransmitterStatus::Offline, &caller.name, now)?;
        }

        self.log(
            Some(id),
            None,
            "emergency_shutdown",
            caller.name.clone(),
            reason,
            now,
        );

        let (alert, created) = self.raise_alert(
            AlertKind::EmergencyShutdown,
            Severity::Critical,
            AlertSource::Transmitter(id),
            format!("emergency shutdown: {reason}"),
            now,
        )?;

        Ok((self.transmitter(id)?, alert, created))
    }

    // ========================================================================
    // Logs and statistics
    // ========================================================================

    pub fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        let mut logs: Vec<_> = self.logs.iter().cloned().collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        logs.truncate(limit);
        logs
    }

    /// Fold history into a statistics snapshot for the window. Idempotent
    /// and side-effect-free.
    pub fn statistics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StatisticsSnapshot {
        let transmitters: Vec<_> = self.transmitters.values().collect();
        let alerts: Vec<_> = self.alerts.values().collect();
        let maintenance: Vec<_> = self.maintenance.values().collect();

        stats::fold_statistics(from, to, now, &transmitters, &alerts, &maintenance, &self.logs)
    }
}
