//! TelemetryActor - periodic refresh of live transmitter metrics
//!
//! Every tick, one reading per online transmitter is pulled from the
//! configured [`TelemetrySource`], applied through the store (which
//! recomputes the derived health score), and evaluated against the alert
//! thresholds. A failure while processing one transmitter is logged and
//! never aborts the rest of the tick.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::config::{TelemetryConfig, ThresholdConfig};
use crate::error::CoreError;
use crate::model::{AlertKind, AlertSource, Severity, Transmitter, TransmitterStatus};
use crate::telemetry::TelemetrySource;

use super::messages::TelemetryCommand;
use super::store::StoreHandle;

/// Actor that drives the telemetry loop
pub struct TelemetryActor {
    store: StoreHandle,
    source: Box<dyn TelemetrySource>,
    thresholds: ThresholdConfig,
    command_rx: mpsc::Receiver<TelemetryCommand>,
    interval_duration: Duration,
}

impl TelemetryActor {
    pub fn new(
        store: StoreHandle,
        source: Box<dyn TelemetrySource>,
        config: &TelemetryConfig,
        thresholds: ThresholdConfig,
        command_rx: mpsc::Receiver<TelemetryCommand>,
    ) -> Self {
        Self {
            store,
            source,
            thresholds,
            command_rx,
            interval_duration: Duration::from_secs(config.interval_secs),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting telemetry actor");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("telemetry tick failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        TelemetryCommand::TickNow { respond_to } => {
                            debug!("received TickNow command");
                            let result = self.tick().await;
                            let _ = respond_to.send(result);
                        }

                        TelemetryCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs);
                            ticker = interval(self.interval_duration);
                        }

                        TelemetryCommand::Shutdown => {
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

        debug!("telemetry actor stopped");
    }

    /// Run one full tick over the fleet.
    ///
    /// Per-transmitter failures are contained; only a store that has gone
    /// away entirely aborts the tick.
    async fn tick(&mut self) -> Result<()> {
        let transmitters = self.store.list_transmitters().await?;

        for transmitter in transmitters
            .iter()
            .filter(|t| t.status == TransmitterStatus::Online)
        {
            if let Err(e) = self.process(transmitter).await {
                error!(
                    "{}: telemetry update failed, continuing with remaining units: {:#}",
                    transmitter.name, e
                );
            }
        }

        Ok(())
    }

    #[instrument(skip(self, transmitter), fields(transmitter = %transmitter.name))]
    async fn process(&mut self, transmitter: &Transmitter) -> Result<()> {
        let reading = self.source.sample(transmitter).await?;

        let health = self
            .store
            .record_telemetry(transmitter.id, reading, Utc::now())
            .await?;

        trace!(
            "applied reading: signal {:.1}, temp {:.1}, health {:.1}",
            reading.signal_quality, reading.temperature, health
        );

        if reading.signal_quality < self.thresholds.signal_floor {
            self.store
                .raise_alert(
                    AlertKind::SignalDegraded,
                    Severity::High,
                    AlertSource::Transmitter(transmitter.id),
                    format!(
                        "signal quality {:.1} below floor {:.1}",
                        reading.signal_quality, self.thresholds.signal_floor
                    ),
                )
                .await?;
        }

        let temperature_limit = self.thresholds.temperature_limit_for(&transmitter.model);
        if reading.temperature > temperature_limit {
            self.store
                .raise_alert(
                    AlertKind::Overheat,
                    Severity::Critical,
                    AlertSource::Transmitter(transmitter.id),
                    format!(
                        "temperature {:.1}°C above limit {:.1}°C for model {}",
                        reading.temperature, temperature_limit, transmitter.model
                    ),
                )
                .await?;
        }

        Ok(())
    }
}

/// Handle for controlling the telemetry actor
#[derive(Clone)]
pub struct TelemetryHandle {
    sender: mpsc::Sender<TelemetryCommand>,
}

impl TelemetryHandle {
    /// Spawn a new telemetry actor
    pub fn spawn(
        store: StoreHandle,
        source: Box<dyn TelemetrySource>,
        config: &TelemetryConfig,
        thresholds: ThresholdConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = TelemetryActor::new(store, source, config, thresholds, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run one tick immediately, bypassing the interval timer
    pub async fn tick_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TelemetryCommand::TickNow { respond_to: tx })
            .await
            .map_err(|_| CoreError::ChannelClosed)?;
        rx.await.map_err(|_| CoreError::ChannelClosed)?
    }

    /// Update the tick interval
    pub async fn update_interval(&self, interval_secs: u64) {
        let _ = self
            .sender
            .send(TelemetryCommand::UpdateInterval { interval_secs })
            .await;
    }

    /// Shutdown the telemetry actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(TelemetryCommand::Shutdown).await;
    }
}
