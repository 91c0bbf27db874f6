//! Command dispatcher behavior: validation, FIFO queueing, timeouts

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;

use transmission_control::actors::dispatcher::{
    CommandExecutor, DispatcherHandle, SimulatedExecutor,
};
use transmission_control::error::CoreError;
use transmission_control::model::{
    AlertKind, CommandStatus, RemoteCommandKind, Severity, Transmitter, TransmitterStatus,
};

use super::helpers::*;

/// Executor that never completes, for timeout tests
struct HangingExecutor;

#[async_trait]
impl CommandExecutor for HangingExecutor {
    async fn execute(
        &self,
        _transmitter: &Transmitter,
        _command: RemoteCommandKind,
    ) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[tokio::test]
async fn command_illegal_for_state_is_rejected() {
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

    // Already online; powering on makes no sense.
    let result = dispatcher
        .send(t1.id, RemoteCommandKind::PowerOn, engineer())
        .await;
    assert_matches!(result, Err(CoreError::InvalidTransition { .. }));

    // State untouched by the rejection.
    assert_eq!(
        store.transmitter(t1.id).await.unwrap().status,
        TransmitterStatus::Online
    );

    dispatcher.shutdown().await;
    store.shutdown().await;
}

/// A hung command times out, the transmitter keeps its pre-command status,
/// and a medium alert is raised.
#[tokio::test]
async fn timeout_never_mutates_transmitter_state() {
    let store = spawn_store();
    let config = test_config();
    let dispatcher = DispatcherHandle::spawn(
        store.clone(),
        Arc::new(HangingExecutor),
        &config.commands,
    );

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Standby))
        .await
        .unwrap();

    let outcome = dispatcher
        .send_and_wait(t1.id, RemoteCommandKind::PowerOn, engineer())
        .await
        .unwrap();

    assert_eq!(outcome.status, CommandStatus::Failed);
    assert_eq!(outcome.result.as_deref(), Some("timed out"));
    assert!(outcome.completed_at.is_some());

    assert_eq!(
        store.transmitter(t1.id).await.unwrap().status,
        TransmitterStatus::Standby,
        "timed-out command must not change state"
    );

    let alerts = store.active_alerts(Some(Severity::Medium)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::CommandTimeout);

    dispatcher.shutdown().await;
    store.shutdown().await;
}

/// Commands against a busy transmitter queue FIFO instead of racing.
#[tokio::test]
async fn commands_on_same_transmitter_run_fifo() {
    let store = spawn_store();
    let mut config = test_config();
    config.commands.settle_millis = 100;
    let dispatcher = DispatcherHandle::spawn(
        store.clone(),
        Arc::new(SimulatedExecutor::new(&config.commands)),
        &config.commands,
    );

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    // Both legal from Online at send time; the second waits for the first.
    let reset = dispatcher
        .send(t1.id, RemoteCommandKind::Reset, engineer())
        .await
        .unwrap();
    let power_off = dispatcher
        .send(t1.id, RemoteCommandKind::PowerOff, engineer())
        .await
        .unwrap();

    let reset_row = reset.completion.await.unwrap();
    let power_off_row = power_off.completion.await.unwrap();

    assert_eq!(reset_row.status, CommandStatus::Completed);
    assert_eq!(power_off_row.status, CommandStatus::Completed);
    assert!(reset_row.completed_at.unwrap() <= power_off_row.completed_at.unwrap());

    // Reset landed online, the queued power_off then took it down.
    assert_eq!(
        store.transmitter(t1.id).await.unwrap().status,
        TransmitterStatus::Offline
    );

    dispatcher.shutdown().await;
    store.shutdown().await;
}

/// Commands on different transmitters do not block each other.
#[tokio::test]
async fn commands_on_distinct_transmitters_run_concurrently() {
    let store = spawn_store();
    let mut config = test_config();
    config.commands.settle_millis = 150;
    let dispatcher = DispatcherHandle::spawn(
        store.clone(),
        Arc::new(SimulatedExecutor::new(&config.commands)),
        &config.commands,
    );

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Offline))
        .await
        .unwrap();
    let t2 = store
        .add_transmitter(admin(), transmitter_spec("TX-2", TransmitterStatus::Offline))
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let (a, b) = tokio::join!(
        dispatcher.send_and_wait(t1.id, RemoteCommandKind::PowerOn, engineer()),
        dispatcher.send_and_wait(t2.id, RemoteCommandKind::PowerOn, engineer()),
    );
    let elapsed = started.elapsed();

    assert_eq!(a.unwrap().status, CommandStatus::Completed);
    assert_eq!(b.unwrap().status, CommandStatus::Completed);
    // Serialized execution would need at least two settle periods.
    assert!(
        elapsed < Duration::from_millis(290),
        "commands appear to have run serially: {elapsed:?}"
    );

    dispatcher.shutdown().await;
    store.shutdown().await;
}

/// Emergency shutdown cancels queued work and discards the in-flight
/// command's result.
#[tokio::test]
async fn emergency_shutdown_cancels_pending_commands() {
    let store = spawn_store();
    let mut config = test_config();
    config.commands.settle_millis = 300;
    let dispatcher = DispatcherHandle::spawn(
        store.clone(),
        Arc::new(SimulatedExecutor::new(&config.commands)),
        &config.commands,
    );

    let t1 = store
        .add_transmitter(admin(), transmitter_spec("TX-1", TransmitterStatus::Online))
        .await
        .unwrap();

    let in_flight = dispatcher
        .send(t1.id, RemoteCommandKind::Reset, engineer())
        .await
        .unwrap();
    let queued = dispatcher
        .send(t1.id, RemoteCommandKind::PowerOff, engineer())
        .await
        .unwrap();

    let transmitter = dispatcher
        .emergency_shutdown(t1.id, admin(), "lightning strike")
        .await
        .unwrap();
    assert_eq!(transmitter.status, TransmitterStatus::Offline);

    let in_flight_row = in_flight.completion.await.unwrap();
    let queued_row = queued.completion.await.unwrap();
    assert_eq!(in_flight_row.status, CommandStatus::Failed);
    assert_eq!(
        in_flight_row.result.as_deref(),
        Some("cancelled by emergency shutdown")
    );
    assert_eq!(queued_row.status, CommandStatus::Failed);

    // The discarded reset must not have flipped the unit back on.
    assert_eq!(
        store.transmitter(t1.id).await.unwrap().status,
        TransmitterStatus::Offline
    );

    dispatcher.shutdown().await;
    store.shutdown().await;
}
