//! HTTP-polled hardware gateway source
//!
//! Polls a site gateway that fronts the actual transmitter hardware and
//! exposes one JSON telemetry document per unit, keyed by serial number.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::trace;

use crate::TelemetryReading;
use crate::model::Transmitter;

use super::TelemetrySource;

pub struct GatewaySource {
    /// HTTP client (reused across requests for efficiency)
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewaySource {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            base_url,
            token,
        }
    }
}

#[async_trait]
impl TelemetrySource for GatewaySource {
    async fn sample(&mut self, transmitter: &Transmitter) -> anyhow::Result<TelemetryReading> {
        let url = format!(
            "{}/transmitters/{}/telemetry",
            self.base_url.trim_end_matches('/'),
            transmitter.serial
        );

        trace!("requesting telemetry from {url}");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header("X-GATEWAY-TOKEN", token);
        }

        let response = request.send().await.context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        let reading: TelemetryReading =
            serde_json::from_str(&body).context("failed to parse telemetry JSON")?;

        trace!("successfully parsed telemetry for {}", transmitter.serial);

        Ok(reading)
    }
}
