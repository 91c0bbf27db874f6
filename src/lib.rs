pub mod access;
pub mod actors;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod stats;
pub mod store;
pub mod telemetry;

use serde::{Deserialize, Serialize};

/// One live measurement for a transmitter, as produced by a telemetry
/// source (simulated or polled from a hardware gateway).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Signal quality, 0-100
    pub signal_quality: f64,

    /// Component temperature in °C
    pub temperature: f64,

    /// Output power in kW
    pub power_output: f64,
}
