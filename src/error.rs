//! Error types for the transmission control core

use std::fmt;

use uuid::Uuid;

use crate::model::TransmitterStatus;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations
#[derive(Debug)]
pub enum CoreError {
    /// Illegal transmitter state change
    InvalidTransition {
        from: TransmitterStatus,
        to: TransmitterStatus,
    },

    /// Unknown entity id
    NotFound(String),

    /// Alert was already resolved
    AlreadyResolved(Uuid),

    /// Command or test exceeded its time bound
    Timeout(String),

    /// Caller's role is not in the entity's access set
    Forbidden(String),

    /// Malformed input (e.g. primary == backup in a pairing)
    Validation(String),

    /// The store actor has shut down and can no longer be reached
    ChannelClosed,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidTransition { from, to } => {
                write!(f, "invalid transmitter transition: {from} -> {to}")
            }
            CoreError::NotFound(what) => write!(f, "not found: {}", what),
            CoreError::AlreadyResolved(id) => write!(f, "alert {} is already resolved", id),
            CoreError::Timeout(what) => write!(f, "operation timed out: {}", what),
            CoreError::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            CoreError::Validation(msg) => write!(f, "validation failed: {}", msg),
            CoreError::ChannelClosed => write!(f, "entity store is no longer running"),
        }
    }
}

impl std::error::Error for CoreError {}
