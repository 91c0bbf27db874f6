//! Concurrency behavior: swap atomicity under readers, parallel queries

use std::time::Duration;

use chrono::Utc;

use transmission_control::actors::failover::FailoverHandle;
use transmission_control::model::{PairMember, TransmitterStatus};
use transmission_control::store::NewBackupSystem;

use super::helpers::*;

/// Readers racing a failover swap must only ever observe the pre-swap or
/// post-swap assignment, never both units online or both standing by.
#[tokio::test]
async fn readers_never_observe_intermediate_swap_state() {
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

    let mut readers = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let (t1_id, t2_id) = (t1.id, t2.id);
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                // One message, one consistent snapshot of the whole table.
                let snapshot = store.list_transmitters().await.unwrap();
                let a = snapshot.iter().find(|t| t.id == t1_id).unwrap().status;
                let b = snapshot.iter().find(|t| t.id == t2_id).unwrap().status;

                let online = [a, b]
                    .iter()
                    .filter(|s| **s == TransmitterStatus::Online)
                    .count();
                assert_eq!(online, 1, "inconsistent pair state: {a:?}/{b:?}");
                assert!(
                    a == TransmitterStatus::Standby || b == TransmitterStatus::Standby,
                    "inconsistent pair state: {a:?}/{b:?}"
                );
            }
        }));
    }

    failover.activate(pairing.id, engineer()).await.unwrap();

    for reader in readers {
        reader.await.unwrap();
    }

    let pairing = store.backup_system(pairing.id).await.unwrap();
    assert_eq!(pairing.active_member, PairMember::Backup);
    assert_eq!(pairing.switch_count, 1);

    failover.shutdown().await;
    store.shutdown().await;
}

/// Parallel queries against the store all succeed while mutations flow.
#[tokio::test]
async fn concurrent_queries_during_mutation() {
    let store = spawn_store();

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                store
                    .record_telemetry(
                        t1.id,
                        reading(80.0 + (i % 10) as f64, 45.0, 10.0),
                        Utc::now(),
                    )
                    .await
                    .unwrap();
            }
        })
    };

    let mut queries = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        queries.push(tokio::spawn(async move {
            for _ in 0..20 {
                let transmitters = store.list_transmitters().await.unwrap();
                assert_eq!(transmitters.len(), 1);
                let _ = store.active_alerts(None).await.unwrap();
            }
        }));
    }

    writer.await.unwrap();
    for query in queries {
        query.await.unwrap();
    }

    store.shutdown().await;
}

/// Telemetry records and uptime accounting survive rapid updates.
#[tokio::test]
async fn rapid_telemetry_updates_no_loss() {
    let store = spawn_store();

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    let base = Utc::now();
    for i in 0..60 {
        store
            .record_telemetry(
                t1.id,
                reading(90.0, 45.0, 10.0),
                base + chrono::Duration::seconds(i),
            )
            .await
            .unwrap();
    }

    let updated = store.transmitter(t1.id).await.unwrap();
    assert_eq!(updated.uptime_secs, 59);

    store.shutdown().await;
}

/// Shutting down the store makes handles fail fast instead of hanging.
#[tokio::test]
async fn closed_store_reports_channel_closed() {
    let store = spawn_store();
    store.shutdown().await;

    // Give the actor a moment to drain and exit.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = store.list_transmitters().await;
    assert!(matches!(
        result,
        Err(transmission_control::error::CoreError::ChannelClosed)
    ));
}
