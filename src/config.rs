use std::collections::HashMap;

use tracing::trace;

use crate::access::Role;
use crate::model::Severity;

/// Telemetry source configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum TelemetrySourceConfig {
    /// Random-walk simulation (no hardware required)
    Simulated,

    /// HTTP-polled hardware gateway
    Gateway {
        /// Base URL of the gateway, e.g. "http://10.0.4.12:9900"
        url: String,

        /// Optional shared secret sent with every poll
        token: Option<String>,
    },
}

impl Default for TelemetrySourceConfig {
    fn default() -> Self {
        TelemetrySourceConfig::Simulated
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TelemetryConfig {
    /// Seconds between telemetry ticks
    #[serde(default = "default_tick_interval")]
    pub interval_secs: u64,

    #[serde(default)]
    pub source: TelemetrySourceConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_tick_interval(),
            source: TelemetrySourceConfig::default(),
        }
    }
}

fn default_tick_interval() -> u64 {
    5
}

/// Alert-raising thresholds evaluated on every telemetry tick
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ThresholdConfig {
    /// Signal quality below this raises a high-severity alert
    #[serde(default = "default_signal_floor")]
    pub signal_floor: f64,

    /// Temperature limit (°C) for models not listed in `temperature_limits`
    #[serde(default = "default_temperature_limit")]
    pub default_temperature_limit: f64,

    /// Per-model temperature limits (°C); exceeding one raises a critical alert
    #[serde(default)]
    pub temperature_limits: HashMap<String, f64>,
}

impl ThresholdConfig {
    pub fn temperature_limit_for(&self, model: &str) -> f64 {
        self.temperature_limits
            .get(model)
            .copied()
            .unwrap_or(self.default_temperature_limit)
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            signal_floor: default_signal_floor(),
            default_temperature_limit: default_temperature_limit(),
            temperature_limits: HashMap::new(),
        }
    }
}

fn default_signal_floor() -> f64 {
    50.0
}

fn default_temperature_limit() -> f64 {
    75.0
}

/// Weights and reference points for the derived health score.
///
/// health = signal_weight * signal
///        + temperature_weight * (100 - |temp - nominal| * penalty_per_degree)
///        + alert_weight * (100 - unresolved_alerts * alert_penalty)
/// with each component clamped to 0..=100. Weights should sum to 1.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_signal_weight")]
    pub signal_weight: f64,

    #[serde(default = "default_temperature_weight")]
    pub temperature_weight: f64,

    #[serde(default = "default_alert_weight")]
    pub alert_weight: f64,

    /// Temperature (°C) considered ideal for the fleet
    #[serde(default = "default_nominal_temperature")]
    pub nominal_temperature: f64,

    /// Health points lost per °C of deviation from nominal
    #[serde(default = "default_temperature_penalty")]
    pub temperature_penalty_per_degree: f64,

    /// Health points lost per unresolved alert
    #[serde(default = "default_alert_penalty")]
    pub alert_penalty: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            signal_weight: default_signal_weight(),
            temperature_weight: default_temperature_weight(),
            alert_weight: default_alert_weight(),
            nominal_temperature: default_nominal_temperature(),
            temperature_penalty_per_degree: default_temperature_penalty(),
            alert_penalty: default_alert_penalty(),
        }
    }
}

fn default_signal_weight() -> f64 {
    0.5
}

fn default_temperature_weight() -> f64 {
    0.3
}

fn default_alert_weight() -> f64 {
    0.2
}

fn default_nominal_temperature() -> f64 {
    45.0
}

fn default_temperature_penalty() -> f64 {
    2.0
}

fn default_alert_penalty() -> f64 {
    15.0
}

/// Remote command execution bounds
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CommandConfig {
    /// Wall-clock bound on a single command execution
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,

    /// Simulated hardware settle time per command step
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_command_timeout(),
            settle_millis: default_settle_millis(),
        }
    }
}

fn default_command_timeout() -> u64 {
    10
}

fn default_settle_millis() -> u64 {
    250
}

/// Automatic failover tuning
#[derive(Debug, Clone, serde::Deserialize)]
pub struct FailoverConfig {
    /// Health score below which the active member is considered degraded
    #[serde(default = "default_health_floor")]
    pub health_floor: f64,

    /// How long the breach must persist before switching (anti-flapping)
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,

    /// Pause before the single retry of a failed auto-switch
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            health_floor: default_health_floor(),
            debounce_secs: default_debounce(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}

fn default_health_floor() -> f64 {
    40.0
}

fn default_debounce() -> u64 {
    30
}

fn default_retry_backoff() -> u64 {
    5
}

/// Which roles are notified per alert severity
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_critical_roles")]
    pub critical: Vec<Role>,

    #[serde(default = "default_critical_roles")]
    pub high: Vec<Role>,

    #[serde(default = "default_medium_roles")]
    pub medium: Vec<Role>,

    #[serde(default = "default_low_roles")]
    pub low: Vec<Role>,
}

impl NotificationConfig {
    pub fn roles_for(&self, severity: Severity) -> Vec<Role> {
        match severity {
            Severity::Critical => self.critical.clone(),
            Severity::High => self.high.clone(),
            Severity::Medium => self.medium.clone(),
            Severity::Low => self.low.clone(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            critical: default_critical_roles(),
            high: default_critical_roles(),
            medium: default_medium_roles(),
            low: default_low_roles(),
        }
    }
}

fn default_critical_roles() -> Vec<Role> {
    vec![Role::Admin, Role::Manager, Role::Engineer]
}

fn default_medium_roles() -> Vec<Role> {
    vec![Role::Manager, Role::Engineer]
}

fn default_low_roles() -> Vec<Role> {
    vec![Role::Engineer]
}

/// Transmitter inventory entry, seeded into the store at startup
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TransmitterSeed {
    pub name: String,
    pub location: String,
    pub model: String,
    pub serial: String,
    pub frequency_mhz: f64,

    #[serde(default)]
    pub is_backup: bool,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub failover: FailoverConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Optional startup inventory
    pub transmitters: Option<Vec<TransmitterSeed>>,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
