//! Telemetry ingestion
//!
//! The telemetry loop is decoupled from any particular data source through
//! the [`TelemetrySource`] trait: the same tick → evaluate-thresholds →
//! alert contract runs against a random-walk simulation, a polled hardware
//! gateway, or anything a deployment plugs in.

pub mod gateway;
pub mod simulated;

use async_trait::async_trait;

use crate::TelemetryReading;
use crate::config::TelemetrySourceConfig;
use crate::model::Transmitter;

pub use gateway::GatewaySource;
pub use simulated::SimulatedSource;

/// A provider of live transmitter measurements
///
/// Implementations may keep internal state (an RNG, an HTTP client) and are
/// driven by the telemetry actor, one call per online transmitter per tick.
/// Errors are per-transmitter: a failed sample is logged and skipped without
/// aborting the rest of the tick.
#[async_trait]
pub trait TelemetrySource: Send {
    async fn sample(&mut self, transmitter: &Transmitter) -> anyhow::Result<TelemetryReading>;
}

/// Build a source from its configuration
pub fn source_from_config(config: &TelemetrySourceConfig) -> Box<dyn TelemetrySource> {
    match config {
        TelemetrySourceConfig::Simulated => Box::new(SimulatedSource::new()),
        TelemetrySourceConfig::Gateway { url, token } => {
            Box::new(GatewaySource::new(url.clone(), token.clone()))
        }
    }
}
