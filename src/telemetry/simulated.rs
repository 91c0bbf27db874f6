//! Random-walk telemetry simulation
//!
//! Jitters each metric around the transmitter's previous value, so the
//! simulated fleet drifts instead of jumping. Useful for development and
//! for exercising the full tick → threshold → alert pipeline in tests.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::TelemetryReading;
use crate::model::{Transmitter, TransmitterStatus};

use super::TelemetrySource;

pub struct SimulatedSource {
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySource for SimulatedSource {
    async fn sample(&mut self, transmitter: &Transmitter) -> anyhow::Result<TelemetryReading> {
        let signal_quality =
            (transmitter.signal_quality + self.rng.gen_range(-3.0..3.0)).clamp(0.0, 100.0);

        let temperature = (transmitter.temperature + self.rng.gen_range(-1.5..1.5)).max(0.0);

        let power_output = if transmitter.status == TransmitterStatus::Online {
            (transmitter.power_output.max(5.0) + self.rng.gen_range(-0.5..0.5)).max(0.0)
        } else {
            0.0
        };

        Ok(TelemetryReading {
            signal_quality,
            temperature,
            power_output,
        })
    }
}
