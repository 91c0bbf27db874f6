//! BackupFailoverActor - automatic switchover on sustained degradation
//!
//! Subscribes to the store's health event stream. When the active member of
//! a pairing with auto-switch enabled stays below the configured health
//! floor for longer than the debounce window, the pairing is activated; a
//! transient dip that recovers within the window resets the tracking and
//! never switches. A failed auto-switch is retried once after a short
//! backoff before surfacing a critical alert.
//!
//! Manual activation goes through the same actor and is always permitted,
//! regardless of the auto-switch setting.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::access::Caller;
use crate::config::FailoverConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{AlertKind, AlertSource, BackupSystem, Severity};

use super::messages::{FailoverCommand, HealthEvent};
use super::store::StoreHandle;

/// Name recorded on automatic switches and their audit entries
const CONTROLLER: &str = "failover-controller";

/// Actor driving backup pairings
pub struct BackupFailoverActor {
    store: StoreHandle,
    config: FailoverConfig,
    command_rx: mpsc::Receiver<FailoverCommand>,
    health_rx: broadcast::Receiver<HealthEvent>,

    /// Pairing id -> when the active member first breached the floor
    breaches: HashMap<Uuid, DateTime<Utc>>,
}

impl BackupFailoverActor {
    pub fn new(
        store: StoreHandle,
        config: FailoverConfig,
        command_rx: mpsc::Receiver<FailoverCommand>,
        health_rx: broadcast::Receiver<HealthEvent>,
    ) -> Self {
        Self {
            store,
            config,
            command_rx,
            health_rx,
            breaches: HashMap::new(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting failover controller");

        loop {
            tokio::select! {
                result = self.health_rx.recv() => {
                    match result {
                        Ok(event) => self.handle_health_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("failover controller lagged, skipped {skipped} health events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("health channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        FailoverCommand::Activate { backup_system_id, caller, respond_to } => {
                            let performed_by = caller.name.clone();
                            let result = self
                                .store
                                .activate_backup(Some(caller), backup_system_id, performed_by)
                                .await;
                            if result.is_ok() {
                                self.breaches.remove(&backup_system_id);
                            }
                            let _ = respond_to.send(result);
                        }

                        FailoverCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("failover controller stopped");
    }

    /// Track floor breaches of active members and switch once the debounce
    /// window is exhausted.
    #[instrument(skip(self, event), fields(transmitter_id = %event.transmitter_id))]
    async fn handle_health_event(&mut self, event: HealthEvent) {
        let pairings = match self.store.list_backup_systems().await {
            Ok(pairings) => pairings,
            Err(e) => {
                error!("failed to list backup systems: {e}");
                return;
            }
        };

        for pairing in pairings {
            if pairing.active_id() != event.transmitter_id {
                continue;
            }

            if event.health_score >= self.config.health_floor {
                // Recovered within the window; a transient dip never switches.
                if self.breaches.remove(&pairing.id).is_some() {
                    debug!("{}: health recovered, breach cleared", pairing.name);
                }
                continue;
            }

            if !pairing.auto_switch_enabled {
                continue;
            }

            let since = *self.breaches.entry(pairing.id).or_insert(event.at);
            let debounce = Duration::seconds(self.config.debounce_secs as i64);

            if event.at - since >= debounce {
                info!(
                    "{}: health {:.1} below floor {:.1} for {}s, switching to backup",
                    pairing.name,
                    event.health_score,
                    self.config.health_floor,
                    (event.at - since).num_seconds()
                );
                self.breaches.remove(&pairing.id);
                self.auto_activate(&pairing).await;
            }
        }
    }

    /// Activate with a single retry after backoff; surface a critical alert
    /// if both attempts fail.
    async fn auto_activate(&mut self, pairing: &BackupSystem) {
        let first = self
            .store
            .activate_backup(None, pairing.id, CONTROLLER)
            .await;

        let Err(first_error) = first else {
            info!("{}: backup activated", pairing.name);
            return;
        };

        warn!(
            "{}: auto-switch failed, retrying once: {first_error}",
            pairing.name
        );
        tokio::time::sleep(std::time::Duration::from_secs(
            self.config.retry_backoff_secs,
        ))
        .await;

        if let Err(retry_error) = self
            .store
            .activate_backup(None, pairing.id, CONTROLLER)
            .await
        {
            error!("{}: auto-switch retry failed: {retry_error}", pairing.name);

            if let Err(e) = self
                .store
                .raise_alert(
                    AlertKind::FailoverFailed,
                    Severity::Critical,
                    AlertSource::Transmitter(pairing.active_id()),
                    format!(
                        "automatic failover of {} failed twice: {retry_error}",
                        pairing.name
                    ),
                )
                .await
            {
                error!("failed to raise failover alert: {e}");
            }
        }
    }
}

/// Handle for the failover controller
#[derive(Clone)]
pub struct FailoverHandle {
    sender: mpsc::Sender<FailoverCommand>,
}

impl FailoverHandle {
    /// Spawn a failover controller subscribed to the store's health stream
    pub fn spawn(store: StoreHandle, config: FailoverConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let health_rx = store.subscribe_health();

        let actor = BackupFailoverActor::new(store, config, cmd_rx, health_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Manually activate a pairing; permitted regardless of the
    /// auto-switch setting.
    pub async fn activate(
        &self,
        backup_system_id: Uuid,
        caller: Caller,
    ) -> CoreResult<BackupSystem> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(FailoverCommand::Activate {
                backup_system_id,
                caller,
                respond_to: tx,
            })
            .await
            .map_err(|_| CoreError::ChannelClosed)?;
        rx.await.map_err(|_| CoreError::ChannelClosed)?
    }

    /// Shutdown the failover controller
    pub async fn shutdown(&self) {
        let _ = self.sender.send(FailoverCommand::Shutdown).await;
    }
}
