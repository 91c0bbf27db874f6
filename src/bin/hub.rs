use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, trace, warn, level_filters::LevelFilter};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

use transmission_control::access::{Caller, Role, default_access_roles};
use transmission_control::actors::dispatcher::{DispatcherHandle, SimulatedExecutor};
use transmission_control::actors::failover::FailoverHandle;
use transmission_control::actors::store::StoreHandle;
use transmission_control::actors::telemetry::TelemetryHandle;
use transmission_control::config::{Config, read_config_file};
use transmission_control::model::TransmitterStatus;
use transmission_control::store::NewTransmitter;
use transmission_control::telemetry::source_from_config;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("transmission_control", LevelFilter::TRACE),
        ("hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };

    let store = StoreHandle::spawn(config.clone());

    let operator = Caller::new("hub", Role::Admin);
    if let Some(seeds) = &config.transmitters {
        for seed in seeds {
            let spec = NewTransmitter {
                name: seed.name.clone(),
                location: seed.location.clone(),
                model: seed.model.clone(),
                serial: seed.serial.clone(),
                frequency_mhz: seed.frequency_mhz,
                is_backup: seed.is_backup,
                status: TransmitterStatus::Offline,
                access_roles: default_access_roles(),
            };
            match store.add_transmitter(operator.clone(), spec).await {
                Ok(transmitter) => debug!("seeded transmitter {}", transmitter.name),
                Err(e) => error!("failed to seed transmitter {}: {e}", seed.name),
            }
        }
    }

    let source = source_from_config(&config.telemetry.source);
    let telemetry = TelemetryHandle::spawn(
        store.clone(),
        source,
        &config.telemetry,
        config.thresholds.clone(),
    );

    let executor = Arc::new(SimulatedExecutor::new(&config.commands));
    let dispatcher = DispatcherHandle::spawn(store.clone(), executor, &config.commands);
    let failover = FailoverHandle::spawn(store.clone(), config.failover.clone());

    info!("transmission control hub running, ctrl-c to stop");

    let mut alerts = store.subscribe_alerts();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }

            result = alerts.recv() => {
                match result {
                    Ok(event) => {
                        info!(
                            "[{}] {} alert ({:?}): {}",
                            event.alert.severity,
                            event.alert.kind,
                            event.change,
                            event.alert.message
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("alert feed lagged, skipped {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    telemetry.shutdown().await;
    dispatcher.shutdown().await;
    failover.shutdown().await;
    store.shutdown().await;

    Ok(())
}
