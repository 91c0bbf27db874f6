//! Actor-based transmission control core
//!
//! Each long-lived component runs as an independent async task
//! communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!        ┌───────────────┐       commands        ┌───────────────────┐
//!        │ TelemetryActor├──────────────────────▶│                   │
//!        └───────────────┘  (readings, alerts)   │                   │
//!                                                │  EntityStoreActor │
//!        ┌─────────────────────┐    commands     │  (single writer)  │
//!        │ CommandDispatcher   ├────────────────▶│                   │
//!        │ (per-tx FIFO queues)│                 └─────────┬─────────┘
//!        └─────────────────────┘                           │ broadcast
//!                                        ┌─────────────────┼────────────────┐
//!                                        │                 │                │
//!                                ┌───────▼───────┐ ┌───────▼───────┐  ┌─────▼─────┐
//!                                │ FailoverActor │ │ AlertEvent    │  │ HealthEvt │
//!                                │ (health feed) │ │ subscribers   │  │ (other)   │
//!                                └───────────────┘ └───────────────┘  └───────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **EntityStoreActor**: owns all entity state; one message at a time,
//!   which serializes per-entity mutation and makes the failover swap atomic
//! - **TelemetryActor**: ticks at a fixed interval, applies readings, and
//!   evaluates alert thresholds
//! - **CommandDispatcherActor**: validates, queues (FIFO per transmitter),
//!   and executes remote commands under a bounded timeout
//! - **BackupFailoverActor**: debounces health-floor breaches and swaps
//!   pairings automatically
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: The store publishes alert and health events to broadcast channels
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod dispatcher;
pub mod failover;
pub mod messages;
pub mod store;
pub mod telemetry;
