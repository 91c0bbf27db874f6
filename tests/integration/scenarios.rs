//! End-to-end operator scenarios across the actor pipeline

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use transmission_control::actors::dispatcher::{DispatcherHandle, SimulatedExecutor};
use transmission_control::actors::telemetry::TelemetryHandle;
use transmission_control::diagnostics::DiagnosticsRunner;
use transmission_control::model::{
    AlertKind, AlertSource, ChannelStatus, CommandStatus, RemoteCommandKind, Severity,
    TransmitterStatus,
};
use transmission_control::store::NewChannel;

use super::helpers::*;

/// Scenario A: powering on an offline transmitter brings it online and
/// leaves an audit entry.
#[tokio::test]
async fn power_on_brings_unit_online_with_audit_log() {
    let store = spawn_store();
    let config = test_config();
    let dispatcher = DispatcherHandle::spawn(
        store.clone(),
        Arc::new(SimulatedExecutor::new(&config.commands)),
        &config.commands,
    );

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Offline))
        .await
        .unwrap();
    assert_eq!(t1.power_output, 0.0);

    let outcome = dispatcher
        .send_and_wait(t1.id, RemoteCommandKind::PowerOn, engineer())
        .await
        .unwrap();

    assert_eq!(outcome.status, CommandStatus::Completed);
    assert_eq!(
        store.transmitter(t1.id).await.unwrap().status,
        TransmitterStatus::Online
    );

    let logs = store.recent_logs(20).await.unwrap();
    assert!(
        logs.iter()
            .any(|l| l.action == "Remote command: power_on" && l.transmitter_id == Some(t1.id))
    );

    dispatcher.shutdown().await;
    store.shutdown().await;
}

/// Scenario B: a low-signal unit raises one high alert on the first tick;
/// a second, worse tick updates it instead of duplicating.
#[tokio::test]
async fn low_signal_alert_deduplicates_across_ticks() {
    let store = spawn_store();
    let config = test_config();

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    let source = ScriptedSource::new(vec![reading(40.0, 45.0, 10.0), reading(35.0, 45.0, 10.0)]);
    let telemetry = TelemetryHandle::spawn(
        store.clone(),
        Box::new(source),
        &config.telemetry,
        config.thresholds.clone(),
    );

    telemetry.tick_now().await.unwrap();

    let alerts = store.active_alerts(Some(Severity::High)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::SignalDegraded);
    assert_eq!(alerts[0].source, AlertSource::Transmitter(t1.id));
    let first_id = alerts[0].id;

    telemetry.tick_now().await.unwrap();

    let alerts = store.active_alerts(Some(Severity::High)).await.unwrap();
    assert_eq!(alerts.len(), 1, "second tick must update, not duplicate");
    assert_eq!(alerts[0].id, first_id);
    assert!(alerts[0].message.contains("35.0"));

    telemetry.shutdown().await;
    store.shutdown().await;
}

/// Scenario D: a failing channel test reports the measured signal and
/// raises exactly one medium alert referencing the channel.
#[tokio::test]
async fn failing_channel_test_raises_one_medium_alert() {
    let store = spawn_store();
    let config = test_config();
    let runner = DiagnosticsRunner::new(store.clone(), config.thresholds.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let channel = store
        .add_channel(
            admin(),
            NewChannel {
                transmitter_id: t1.id,
                name: "CH-1".to_string(),
                frequency_mhz: 602.0,
                power: 8.0,
                signal_quality: 30.0,
                status: ChannelStatus::Active,
                access_roles: operator_roles(),
            },
        )
        .await
        .unwrap();

    let report = runner.test_channel(channel.id).await.unwrap();
    assert!(!report.passed);
    assert_eq!(report.signal_quality, 30.0);

    // A retest while unresolved must not add a second row.
    runner.test_channel(channel.id).await.unwrap();

    let alerts = store.active_alerts(Some(Severity::Medium)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::SignalLoss);
    assert_eq!(alerts[0].source, AlertSource::Channel(channel.id));

    store.shutdown().await;
}

/// Diagnostics on a healthy unit pass without raising anything.
#[tokio::test]
async fn diagnostics_pass_on_healthy_unit() {
    let store = spawn_store();
    let config = test_config();
    let runner = DiagnosticsRunner::new(store.clone(), config.thresholds.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    store
        .record_telemetry(t1.id, reading(90.0, 45.0, 10.0), chrono::Utc::now())
        .await
        .unwrap();

    let report = runner.run_diagnostics(t1.id).await.unwrap();
    assert!(report.passed, "unexpected issues: {:?}", report.issues);
    assert!(store.active_alerts(None).await.unwrap().is_empty());

    store.shutdown().await;
}

/// A dead amplifier fails the power stability check and drives the unit to
/// error state.
#[tokio::test]
async fn diagnostics_failure_drives_unit_to_error() {
    let store = spawn_store();
    let config = test_config();
    let runner = DiagnosticsRunner::new(store.clone(), config.thresholds.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    store
        .record_telemetry(t1.id, reading(90.0, 45.0, 0.0), chrono::Utc::now())
        .await
        .unwrap();

    let report = runner.run_diagnostics(t1.id).await.unwrap();
    assert!(!report.passed);
    assert!(report.issues.iter().any(|i| i.contains("power output")));
    assert_eq!(
        store.transmitter(t1.id).await.unwrap().status,
        TransmitterStatus::Error
    );

    store.shutdown().await;
}

/// Statistics computed twice with no intervening events are identical.
#[tokio::test]
async fn today_statistics_is_idempotent() {
    let store = spawn_store();

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    store
        .raise_alert(
            AlertKind::SignalDegraded,
            Severity::High,
            AlertSource::Transmitter(t1.id),
            "weak signal",
        )
        .await
        .unwrap();

    let first = store.today_statistics().await.unwrap();
    let second = store.today_statistics().await.unwrap();

    assert_eq!(first.total_alerts, second.total_alerts);
    assert_eq!(first.critical_alerts, second.critical_alerts);
    assert_eq!(first.maintenance_count, second.maintenance_count);
    assert_eq!(first.average_signal_quality, second.average_signal_quality);

    store.shutdown().await;
}

/// Write operations are rejected for roles outside the entity's access set.
#[tokio::test]
async fn viewer_writes_are_forbidden() {
    let store = spawn_store();

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    let result = store
        .emergency_shutdown(viewer(), t1.id, "not allowed")
        .await;
    assert_matches::assert_matches!(
        result,
        Err(transmission_control::error::CoreError::Forbidden(_))
    );

    store.shutdown().await;
}

/// Emergency shutdown bypasses everything and always raises critical.
#[tokio::test]
async fn emergency_shutdown_forces_offline() {
    let store = spawn_store();
    let config = test_config();
    let dispatcher = DispatcherHandle::spawn(
        store.clone(),
        Arc::new(SimulatedExecutor::new(&config.commands)),
        &config.commands,
    );

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    let transmitter = dispatcher
        .emergency_shutdown(t1.id, admin(), "smoke in the shelter")
        .await
        .unwrap();
    assert_eq!(transmitter.status, TransmitterStatus::Offline);

    let alerts = store.active_alerts(Some(Severity::Critical)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::EmergencyShutdown);

    // Give the suspended-channel bookkeeping a moment, then confirm the
    // unit stayed down.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        store.transmitter(t1.id).await.unwrap().status,
        TransmitterStatus::Offline
    );

    dispatcher.shutdown().await;
    store.shutdown().await;
}
