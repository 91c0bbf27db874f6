//! Telemetry ingestion: gateway polling, simulated loop, config loading

use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use transmission_control::actors::telemetry::TelemetryHandle;
use transmission_control::config::read_config_file;
use transmission_control::model::TransmitterStatus;
use transmission_control::telemetry::{GatewaySource, SimulatedSource, TelemetrySource};

use super::helpers::*;

#[tokio::test]
async fn gateway_source_parses_telemetry_document() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/transmitters/SN-TX-1/telemetry"))
        .and(header("X-GATEWAY-TOKEN", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "signal_quality": 72.5,
            "temperature": 44.0,
            "power_output": 9.5,
        })))
        .mount(&mock_server)
        .await;

    let mut source = GatewaySource::new(mock_server.uri(), Some("s3cret".to_string()));

    let store = spawn_store();
    let transmitter = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    let reading = source.sample(&transmitter).await.unwrap();
    assert_eq!(reading.signal_quality, 72.5);
    assert_eq!(reading.temperature, 44.0);
    assert_eq!(reading.power_output, 9.5);

    store.shutdown().await;
}

#[tokio::test]
async fn gateway_source_surfaces_http_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let mut source = GatewaySource::new(mock_server.uri(), None);

    let store = spawn_store();
    let transmitter = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    let result = source.sample(&transmitter).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("503"));

    store.shutdown().await;
}

/// One failing unit must not abort the rest of the tick.
#[tokio::test]
async fn tick_survives_single_transmitter_failure() {
    let store = spawn_store();
    let config = test_config();

    let failing = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let healthy = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Online))
        .await
        .unwrap();

    let source = PartiallyFailingSource {
        failing_serial: failing.serial.clone(),
        reading: reading(80.0, 45.0, 10.0),
    };
    let telemetry = TelemetryHandle::spawn(
        store.clone(),
        Box::new(source),
        &config.telemetry,
        config.thresholds.clone(),
    );

    telemetry.tick_now().await.unwrap();

    // The healthy unit got its reading applied regardless.
    let updated = store.transmitter(healthy.id).await.unwrap();
    assert_eq!(updated.signal_quality, 80.0);
    assert_eq!(updated.power_output, 10.0);

    telemetry.shutdown().await;
    store.shutdown().await;
}

/// The simulated source drives the full tick pipeline.
#[tokio::test]
async fn simulated_source_updates_online_fleet() {
    let store = spawn_store();
    let config = test_config();

    let online = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let standby = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Standby))
        .await
        .unwrap();

    let telemetry = TelemetryHandle::spawn(
        store.clone(),
        Box::new(SimulatedSource::seeded(42)),
        &config.telemetry,
        config.thresholds.clone(),
    );

    telemetry.tick_now().await.unwrap();

    let updated = store.transmitter(online.id).await.unwrap();
    assert!(updated.power_output > 0.0, "online unit should radiate");

    // Standby units are not sampled.
    let untouched = store.transmitter(standby.id).await.unwrap();
    assert_eq!(untouched.power_output, 0.0);

    telemetry.shutdown().await;
    store.shutdown().await;
}

#[tokio::test]
async fn config_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    std::fs::write(
        &path,
        serde_json::json!({
            "telemetry": {"interval_secs": 2},
            "thresholds": {"signal_floor": 60.0, "temperature_limits": {"NX-8000": 65.0}},
            "failover": {"health_floor": 35.0, "debounce_secs": 10},
            "transmitters": [
                {"name": "TX-1", "location": "north mast", "model": "NX-8000",
                 "serial": "0001", "frequency_mhz": 602.0}
            ]
        })
        .to_string(),
    )
    .unwrap();

    let config = read_config_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.telemetry.interval_secs, 2);
    assert_eq!(config.thresholds.signal_floor, 60.0);
    assert_eq!(config.thresholds.temperature_limit_for("NX-8000"), 65.0);
    assert_eq!(config.failover.health_floor, 35.0);
    assert_eq!(config.transmitters.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{not json").unwrap();

    assert!(read_config_file(path.to_str().unwrap()).is_err());
}
