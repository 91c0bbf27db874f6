//! Diagnostics and channel testing
//!
//! On-demand check batteries, run by operators against a transmitter or a
//! channel. Both operations are read-mostly: failing checks raise alerts
//! through the store (and a failed power-stability check drives the unit to
//! `Error`), but nothing here writes metrics or channel status directly.

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::actors::store::StoreHandle;
use crate::config::ThresholdConfig;
use crate::error::CoreResult;
use crate::model::{AlertKind, AlertSource, Severity, TransmitterStatus};

/// Minimum power output (kW) for an online unit to count as stable
const MIN_STABLE_POWER: f64 = 0.5;

/// Result of a transmitter diagnostics run
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub passed: bool,
    pub issues: Vec<String>,
}

/// Result of a synthetic channel test
#[derive(Debug, Clone)]
pub struct ChannelTestReport {
    pub passed: bool,
    pub signal_quality: f64,
    pub bitrate_mbps: f64,
}

/// Runner for the fixed diagnostics battery
#[derive(Clone)]
pub struct DiagnosticsRunner {
    store: StoreHandle,
    thresholds: ThresholdConfig,
}

impl DiagnosticsRunner {
    pub fn new(store: StoreHandle, thresholds: ThresholdConfig) -> Self {
        Self { store, thresholds }
    }

    /// Execute the fixed battery: power stability, signal integrity,
    /// temperature, backup connectivity.
    ///
    /// Every failing check lands in `issues`; checks with an alert
    /// threshold additionally raise the matching alert. A failed power
    /// stability check drives the transmitter to `Error`.
    #[instrument(skip(self))]
    pub async fn run_diagnostics(&self, transmitter_id: Uuid) -> CoreResult<DiagnosticsReport> {
        let transmitter = self.store.transmitter(transmitter_id).await?;
        let mut issues = Vec::new();

        // Power stability: an online unit radiating (almost) nothing is
        // an amplifier fault.
        if transmitter.status == TransmitterStatus::Online
            && transmitter.power_output < MIN_STABLE_POWER
        {
            issues.push(format!(
                "power output unstable: {:.2} kW while online",
                transmitter.power_output
            ));

            self.store
                .raise_alert(
                    AlertKind::PowerInstability,
                    Severity::High,
                    AlertSource::Transmitter(transmitter_id),
                    format!("power output {:.2} kW while online", transmitter.power_output),
                )
                .await?;

            self.store
                .apply_transition(transmitter_id, TransmitterStatus::Error, "diagnostics")
                .await?;
        }

        // Signal integrity
        if transmitter.signal_quality < self.thresholds.signal_floor {
            issues.push(format!(
                "signal integrity degraded: {:.1} below floor {:.1}",
                transmitter.signal_quality, self.thresholds.signal_floor
            ));

            self.store
                .raise_alert(
                    AlertKind::SignalDegraded,
                    Severity::High,
                    AlertSource::Transmitter(transmitter_id),
                    format!(
                        "signal quality {:.1} below floor {:.1}",
                        transmitter.signal_quality, self.thresholds.signal_floor
                    ),
                )
                .await?;
        }

        // Temperature
        let temperature_limit = self.thresholds.temperature_limit_for(&transmitter.model);
        if transmitter.temperature > temperature_limit {
            issues.push(format!(
                "temperature {:.1}°C above limit {:.1}°C",
                transmitter.temperature, temperature_limit
            ));

            self.store
                .raise_alert(
                    AlertKind::Overheat,
                    Severity::Critical,
                    AlertSource::Transmitter(transmitter_id),
                    format!(
                        "temperature {:.1}°C above limit {:.1}°C for model {}",
                        transmitter.temperature, temperature_limit, transmitter.model
                    ),
                )
                .await?;
        }

        // Backup connectivity: the paired partner must be reachable
        // (not offline or faulted) to be able to take over.
        for pairing in self.store.list_backup_systems().await? {
            let partner_id = if pairing.primary_id == transmitter_id {
                pairing.backup_id
            } else if pairing.backup_id == transmitter_id {
                pairing.primary_id
            } else {
                continue;
            };

            let partner = self.store.transmitter(partner_id).await?;
            if matches!(
                partner.status,
                TransmitterStatus::Offline | TransmitterStatus::Error
            ) {
                issues.push(format!(
                    "backup partner {} unreachable ({})",
                    partner.name, partner.status
                ));

                self.store
                    .raise_alert(
                        AlertKind::BackupUnreachable,
                        Severity::Medium,
                        AlertSource::Transmitter(transmitter_id),
                        format!("backup partner {} is {}", partner.name, partner.status),
                    )
                    .await?;
            }
        }

        let passed = issues.is_empty();
        debug!(
            "diagnostics for {}: {}",
            transmitter.name,
            if passed { "passed" } else { "failed" }
        );

        Ok(DiagnosticsReport { passed, issues })
    }

    /// Synthetic signal/bitrate check against a channel.
    ///
    /// The achievable bitrate scales with carried power and signal quality.
    /// A failing test raises a medium `signal_loss` alert referencing the
    /// channel; channel status itself is never touched here.
    #[instrument(skip(self))]
    pub async fn test_channel(&self, channel_id: Uuid) -> CoreResult<ChannelTestReport> {
        let channel = self.store.channel(channel_id).await?;

        let signal_quality = channel.signal_quality;
        let bitrate_mbps = channel.power * (signal_quality / 100.0) * 2.4;
        let passed = signal_quality >= self.thresholds.signal_floor;

        if !passed {
            self.store
                .raise_alert(
                    AlertKind::SignalLoss,
                    Severity::Medium,
                    AlertSource::Channel(channel_id),
                    format!(
                        "channel test failed: signal quality {:.1} below floor {:.1}",
                        signal_quality, self.thresholds.signal_floor
                    ),
                )
                .await?;
        }

        debug!(
            "channel test for {}: {} (signal {:.1}, {:.1} Mbps)",
            channel.name,
            if passed { "passed" } else { "failed" },
            signal_quality,
            bitrate_mbps
        );

        Ok(ChannelTestReport {
            passed,
            signal_quality,
            bitrate_mbps,
        })
    }
}
