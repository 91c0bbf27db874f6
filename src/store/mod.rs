//! Entity store
//!
//! The authoritative state of transmitters, channels, antennas, pairings,
//! and their history. [`state::StoreState`] is the synchronous core; the
//! store actor in `actors::store` runs it as a single writer and hands out
//! [`crate::actors::store::StoreHandle`] to everything else.

pub mod state;

pub use state::{
    AntennaUpdate, ChannelUpdate, NewAntenna, NewBackupSystem, NewChannel, NewMaintenance,
    NewTransmitter, StoreState, TransmitterUpdate, compute_health_score,
};
