//! Backup failover controller: auto-switch, debounce, retry behavior

use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;

use transmission_control::actors::failover::FailoverHandle;
use transmission_control::model::{
    AlertKind, AlertSource, PairMember, Severity, TransmitterStatus,
};
use transmission_control::store::NewBackupSystem;

use super::helpers::*;

/// Scenario C: sustained health degradation of the active member triggers
/// an automatic switch to the backup.
#[tokio::test]
async fn sustained_degradation_triggers_auto_switch() {
    let store = spawn_store();
    let config = test_config();
    let failover = FailoverHandle::spawn(store.clone(), config.failover.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let t2 = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Standby))
        .await
        .unwrap();

    store
        .add_backup_system(
            admin(),
            NewBackupSystem {
                name: "north pair".to_string(),
                primary_id: t1.id,
                backup_id: t2.id,
                auto_switch_enabled: true,
                access_roles: operator_roles(),
            },
        )
        .await
        .unwrap();

    // Health collapses; with the debounce window elapsed the controller
    // must fire.
    store
        .record_telemetry(t1.id, reading(0.0, 90.0, 0.0), Utc::now())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let pairing = &store.list_backup_systems().await.unwrap()[0];
    assert_eq!(pairing.switch_count, 1);
    assert_eq!(pairing.active_member, PairMember::Backup);
    assert_eq!(
        store.transmitter(t2.id).await.unwrap().status,
        TransmitterStatus::Online
    );
    assert_eq!(
        store.transmitter(t1.id).await.unwrap().status,
        TransmitterStatus::Standby
    );

    failover.shutdown().await;
    store.shutdown().await;
}

/// A transient dip shorter than the debounce window never switches.
#[tokio::test]
async fn transient_dip_does_not_flap() {
    let store = spawn_store();
    let mut config = test_config();
    config.failover.debounce_secs = 3600;
    let failover = FailoverHandle::spawn(store.clone(), config.failover.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let t2 = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Standby))
        .await
        .unwrap();
    store
        .add_backup_system(
            admin(),
            NewBackupSystem {
                name: "north pair".to_string(),
                primary_id: t1.id,
                backup_id: t2.id,
                auto_switch_enabled: true,
                access_roles: operator_roles(),
            },
        )
        .await
        .unwrap();

    // Dip, then recover well inside the hour-long window.
    store
        .record_telemetry(t1.id, reading(0.0, 90.0, 0.0), Utc::now())
        .await
        .unwrap();
    store
        .record_telemetry(t1.id, reading(95.0, 45.0, 10.0), Utc::now())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let pairing = &store.list_backup_systems().await.unwrap()[0];
    assert_eq!(pairing.switch_count, 0);
    assert_eq!(pairing.active_member, PairMember::Primary);

    failover.shutdown().await;
    store.shutdown().await;
}

/// Degradation with auto-switch disabled is tracked but never acted on.
#[tokio::test]
async fn auto_switch_disabled_never_activates() {
    let store = spawn_store();
    let config = test_config();
    let failover = FailoverHandle::spawn(store.clone(), config.failover.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let t2 = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Standby))
        .await
        .unwrap();
    store
        .add_backup_system(
            admin(),
            NewBackupSystem {
                name: "north pair".to_string(),
                primary_id: t1.id,
                backup_id: t2.id,
                auto_switch_enabled: false,
                access_roles: operator_roles(),
            },
        )
        .await
        .unwrap();

    store
        .record_telemetry(t1.id, reading(0.0, 90.0, 0.0), Utc::now())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.list_backup_systems().await.unwrap()[0].switch_count, 0);

    failover.shutdown().await;
    store.shutdown().await;
}

/// Manual activation is always permitted, auto-switch setting or not.
#[tokio::test]
async fn manual_activation_always_permitted() {
    let store = spawn_store();
    let config = test_config();
    let failover = FailoverHandle::spawn(store.clone(), config.failover.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let t2 = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Standby))
        .await
        .unwrap();
    let pairing = store
        .add_backup_system(
            admin(),
            NewBackupSystem {
                name: "north pair".to_string(),
                primary_id: t1.id,
                backup_id: t2.id,
                auto_switch_enabled: false,
                access_roles: operator_roles(),
            },
        )
        .await
        .unwrap();

    let updated = failover.activate(pairing.id, engineer()).await.unwrap();
    assert_eq!(updated.switch_count, 1);
    assert_eq!(updated.active_member, PairMember::Backup);

    failover.shutdown().await;
    store.shutdown().await;
}

/// Switching away from a degraded unit auto-resolves its telemetry alerts.
#[tokio::test]
async fn activation_resolves_superseded_alerts() {
    let store = spawn_store();
    let config = test_config();
    let failover = FailoverHandle::spawn(store.clone(), config.failover.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let t2 = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Standby))
        .await
        .unwrap();
    let pairing = store
        .add_backup_system(
            admin(),
            NewBackupSystem {
                name: "north pair".to_string(),
                primary_id: t1.id,
                backup_id: t2.id,
                auto_switch_enabled: false,
                access_roles: operator_roles(),
            },
        )
        .await
        .unwrap();

    store
        .raise_alert(
            AlertKind::SignalDegraded,
            Severity::High,
            AlertSource::Transmitter(t1.id),
            "signal collapsed",
        )
        .await
        .unwrap();

    failover.activate(pairing.id, engineer()).await.unwrap();

    assert!(store.active_alerts(None).await.unwrap().is_empty());

    failover.shutdown().await;
    store.shutdown().await;
}

/// When both attempts of an auto-switch fail, a critical alert surfaces.
#[tokio::test]
async fn failed_auto_switch_retries_then_alerts() {
    let store = spawn_store();
    let config = test_config();
    let failover = FailoverHandle::spawn(store.clone(), config.failover.clone());

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();
    let t2 = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Standby))
        .await
        .unwrap();
    store
        .add_backup_system(
            admin(),
            NewBackupSystem {
                name: "north pair".to_string(),
                primary_id: t1.id,
                backup_id: t2.id,
                auto_switch_enabled: true,
                access_roles: operator_roles(),
            },
        )
        .await
        .unwrap();

    // Fault the backup so promotion is illegal and the switch cannot work.
    store
        .apply_transition(t2.id, TransmitterStatus::Error, "diagnostics")
        .await
        .unwrap();

    store
        .record_telemetry(t1.id, reading(0.0, 90.0, 0.0), Utc::now())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let pairing = &store.list_backup_systems().await.unwrap()[0];
    assert_eq!(pairing.switch_count, 0);

    let criticals = store.active_alerts(Some(Severity::Critical)).await.unwrap();
    assert!(
        criticals
            .iter()
            .any(|a| a.kind == AlertKind::FailoverFailed),
        "expected a failover_failed alert, got {criticals:?}"
    );

    failover.shutdown().await;
    store.shutdown().await;
}
