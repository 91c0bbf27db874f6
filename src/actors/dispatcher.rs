//! CommandDispatcherActor - validated, queued remote command execution
//!
//! Commands are validated against the transmitter state machine at send
//! time, recorded in the store, and executed one at a time per transmitter
//! (FIFO) so two commands can never race transitions on the same entity.
//! Different transmitters execute concurrently.
//!
//! Execution runs through a pluggable [`CommandExecutor`] under a bounded
//! timeout. State transitions are committed only after the executor
//! succeeds, so a timed-out or failed command leaves the transmitter
//! exactly where it was; the commit itself re-checks legality in case an
//! emergency shutdown raced the execution.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::access::{Caller, ensure_write_access};
use crate::config::CommandConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    AlertKind, AlertSource, CommandStatus, RemoteCommand, RemoteCommandKind, Severity,
    Transmitter,
};

use super::messages::{CommandTicket, DispatcherCommand};
use super::store::StoreHandle;

/// Hardware-facing command execution seam.
///
/// The executor performs the (real or simulated) hardware interaction and
/// nothing else; state transitions are committed by the dispatcher after it
/// returns. Implementations must be cancellation-safe since they run under
/// a timeout.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        transmitter: &Transmitter,
        command: RemoteCommandKind,
    ) -> anyhow::Result<()>;
}

/// Executor that models hardware settle time with a sleep
pub struct SimulatedExecutor {
    settle: Duration,
}

impl SimulatedExecutor {
    pub fn new(config: &CommandConfig) -> Self {
        Self {
            settle: Duration::from_millis(config.settle_millis),
        }
    }
}

#[async_trait]
impl CommandExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        _transmitter: &Transmitter,
        command: RemoteCommandKind,
    ) -> anyhow::Result<()> {
        // A reset powers down and back up, so it settles twice.
        let settle = match command {
            RemoteCommandKind::Reset => self.settle * 2,
            _ => self.settle,
        };
        tokio::time::sleep(settle).await;
        Ok(())
    }
}

/// Result of one spawned execution task
#[derive(Debug)]
struct Execution {
    transmitter_id: Uuid,
    command_id: Uuid,
    outcome: ExecutionOutcome,
}

#[derive(Debug)]
enum ExecutionOutcome {
    Success,
    TimedOut,
    Failed(String),
}

#[derive(Debug)]
struct QueuedCommand {
    command_id: Uuid,
    kind: RemoteCommandKind,
}

/// Actor serializing command execution per transmitter
pub struct CommandDispatcherActor {
    store: StoreHandle,
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
    command_rx: mpsc::Receiver<DispatcherCommand>,

    /// Completion messages from spawned execution tasks
    done_tx: mpsc::Sender<Execution>,
    done_rx: mpsc::Receiver<Execution>,

    /// Waiting commands per transmitter (FIFO)
    queues: HashMap<Uuid, VecDeque<QueuedCommand>>,

    /// Transmitter -> currently executing command
    in_flight: HashMap<Uuid, Uuid>,

    /// Commands overtaken by an emergency shutdown; their results are
    /// discarded at completion instead of committed
    cancelled: HashSet<Uuid>,

    /// Completion channels handed out with tickets
    waiters: HashMap<Uuid, oneshot::Sender<RemoteCommand>>,
}

impl CommandDispatcherActor {
    pub fn new(
        store: StoreHandle,
        executor: Arc<dyn CommandExecutor>,
        config: &CommandConfig,
        command_rx: mpsc::Receiver<DispatcherCommand>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel(64);

        Self {
            store,
            executor,
            timeout: Duration::from_secs(config.timeout_secs),
            command_rx,
            done_tx,
            done_rx,
            queues: HashMap::new(),
            in_flight: HashMap::new(),
            cancelled: HashSet::new(),
            waiters: HashMap::new(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting command dispatcher");

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        DispatcherCommand::Send { transmitter_id, command, caller, respond_to } => {
                            let result = self.handle_send(transmitter_id, command, caller).await;
                            let _ = respond_to.send(result);
                        }

                        DispatcherCommand::EmergencyShutdown { transmitter_id, caller, reason, respond_to } => {
                            let result = self.handle_emergency(transmitter_id, caller, reason).await;
                            let _ = respond_to.send(result);
                        }

                        DispatcherCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                Some(done) = self.done_rx.recv() => {
                    self.handle_completion(done).await;
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("command dispatcher stopped");
    }

    /// Validate, record, and enqueue a command.
    #[instrument(skip(self, caller), fields(command = %command))]
    async fn handle_send(
        &mut self,
        transmitter_id: Uuid,
        command: RemoteCommandKind,
        caller: Caller,
    ) -> CoreResult<CommandTicket> {
        let transmitter = self.store.transmitter(transmitter_id).await?;
        ensure_write_access(&transmitter.access_roles, &caller)?;

        if !command.allowed_from(transmitter.status) {
            return Err(CoreError::InvalidTransition {
                from: transmitter.status,
                to: command.resulting_statuses()[0],
            });
        }

        let row = RemoteCommand {
            id: Uuid::new_v4(),
            transmitter_id,
            command,
            requested_by: caller.name,
            issued_at: Utc::now(),
            completed_at: None,
            status: CommandStatus::Pending,
            result: None,
        };
        let command_id = row.id;
        self.store.insert_command(row).await?;

        let (done_tx, done_rx) = oneshot::channel();
        self.waiters.insert(command_id, done_tx);

        if self.in_flight.contains_key(&transmitter_id) {
            debug!("transmitter busy, queueing command {command_id}");
            self.queues
                .entry(transmitter_id)
                .or_default()
                .push_back(QueuedCommand {
                    command_id,
                    kind: command,
                });
        } else {
            self.start_execution(transmitter_id, command_id, command);
        }

        Ok(CommandTicket {
            command_id,
            completion: done_rx,
        })
    }

    fn start_execution(&mut self, transmitter_id: Uuid, command_id: Uuid, kind: RemoteCommandKind) {
        self.in_flight.insert(transmitter_id, command_id);

        let store = self.store.clone();
        let executor = self.executor.clone();
        let done_tx = self.done_tx.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            if let Err(e) = store.mark_command_running(command_id).await {
                error!("failed to mark command running: {e}");
            }

            let outcome = match store.transmitter(transmitter_id).await {
                Ok(transmitter) => {
                    match tokio::time::timeout(timeout, executor.execute(&transmitter, kind)).await
                    {
                        Ok(Ok(())) => ExecutionOutcome::Success,
                        Ok(Err(e)) => ExecutionOutcome::Failed(e.to_string()),
                        Err(_) => ExecutionOutcome::TimedOut,
                    }
                }
                Err(e) => ExecutionOutcome::Failed(e.to_string()),
            };

            let _ = done_tx
                .send(Execution {
                    transmitter_id,
                    command_id,
                    outcome,
                })
                .await;
        });
    }

    /// Commit or record the terminal outcome, then start the next queued
    /// command for the transmitter.
    async fn handle_completion(&mut self, done: Execution) {
        let Execution {
            transmitter_id,
            command_id,
            outcome,
        } = done;

        self.in_flight.remove(&transmitter_id);

        let terminal = if self.cancelled.remove(&command_id) {
            self.store
                .fail_command(command_id, "cancelled by emergency shutdown")
                .await
        } else {
            match outcome {
                ExecutionOutcome::Success => self.store.complete_command(command_id).await,

                ExecutionOutcome::TimedOut => {
                    let failed = self.store.fail_command(command_id, "timed out").await;

                    if let Err(e) = self
                        .store
                        .raise_alert(
                            AlertKind::CommandTimeout,
                            Severity::Medium,
                            AlertSource::Transmitter(transmitter_id),
                            format!("remote command {command_id} timed out"),
                        )
                        .await
                    {
                        error!("failed to raise timeout alert: {e}");
                    }

                    failed
                }

                ExecutionOutcome::Failed(reason) => {
                    self.store.fail_command(command_id, reason).await
                }
            }
        };

        match terminal {
            Ok(row) => {
                if let Some(waiter) = self.waiters.remove(&command_id) {
                    let _ = waiter.send(row);
                }
            }
            Err(e) => {
                error!("failed to record command outcome: {e}");
                self.waiters.remove(&command_id);
            }
        }

        // FIFO: next command for this transmitter, if any
        let next = self
            .queues
            .get_mut(&transmitter_id)
            .and_then(|queue| queue.pop_front());
        if let Some(next) = next {
            self.start_execution(transmitter_id, next.command_id, next.kind);
        }
        if self
            .queues
            .get(&transmitter_id)
            .is_some_and(|queue| queue.is_empty())
        {
            self.queues.remove(&transmitter_id);
        }
    }

    /// Force the transmitter offline, bypassing the queue. Queued commands
    /// are cancelled and the in-flight one, if any, is marked so its result
    /// is discarded instead of committed.
    #[instrument(skip(self, caller))]
    async fn handle_emergency(
        &mut self,
        transmitter_id: Uuid,
        caller: Caller,
        reason: String,
    ) -> CoreResult<Transmitter> {
        let transmitter = self
            .store
            .emergency_shutdown(caller, transmitter_id, reason)
            .await?;

        if let Some(in_flight) = self.in_flight.get(&transmitter_id) {
            self.cancelled.insert(*in_flight);
        }

        if let Some(queue) = self.queues.remove(&transmitter_id) {
            for queued in queue {
                match self
                    .store
                    .fail_command(queued.command_id, "cancelled by emergency shutdown")
                    .await
                {
                    Ok(row) => {
                        if let Some(waiter) = self.waiters.remove(&queued.command_id) {
                            let _ = waiter.send(row);
                        }
                    }
                    Err(e) => error!("failed to cancel queued command: {e}"),
                }
            }
        }

        Ok(transmitter)
    }
}

/// Handle for the command dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// Spawn a new dispatcher
    pub fn spawn(
        store: StoreHandle,
        executor: Arc<dyn CommandExecutor>,
        config: &CommandConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = CommandDispatcherActor::new(store, executor, config, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Validate and enqueue a command; returns a ticket whose completion
    /// channel resolves with the terminal command row. Drop the ticket to
    /// fire-and-forget.
    pub async fn send(
        &self,
        transmitter_id: Uuid,
        command: RemoteCommandKind,
        caller: Caller,
    ) -> CoreResult<CommandTicket> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatcherCommand::Send {
                transmitter_id,
                command,
                caller,
                respond_to: tx,
            })
            .await
            .map_err(|_| CoreError::ChannelClosed)?;
        rx.await.map_err(|_| CoreError::ChannelClosed)?
    }

    /// Send a command and wait for its terminal outcome
    pub async fn send_and_wait(
        &self,
        transmitter_id: Uuid,
        command: RemoteCommandKind,
        caller: Caller,
    ) -> CoreResult<RemoteCommand> {
        let ticket = self.send(transmitter_id, command, caller).await?;
        ticket
            .completion
            .await
            .map_err(|_| CoreError::ChannelClosed)
    }

    /// Force a transmitter offline immediately, bypassing the queue
    pub async fn emergency_shutdown(
        &self,
        transmitter_id: Uuid,
        caller: Caller,
        reason: impl Into<String>,
    ) -> CoreResult<Transmitter> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatcherCommand::EmergencyShutdown {
                transmitter_id,
                caller,
                reason: reason.into(),
                respond_to: tx,
            })
            .await
            .map_err(|_| CoreError::ChannelClosed)?;
        rx.await.map_err(|_| CoreError::ChannelClosed)?
    }

    /// Shutdown the dispatcher
    pub async fn shutdown(&self) {
        let _ = self.sender.send(DispatcherCommand::Shutdown).await;
    }
}
