//! Error types for VIVA
//!
//! Session-level failures (`OutOfOrderChunk`, `ProducerError`) end the session.
//! Component-level failures (`PlaybackDevice`, `MissingCapability`) are
//! absorbed where they happen and only logged.

use thiserror::Error;

use crate::SessionState;

/// Core VIVA errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VivaError {
    // Ordering errors
    #[error("Out of order chunk: expected {expected}, got {actual}")]
    OutOfOrderChunk { expected: u64, actual: u64 },

    #[error("Value already set: {current}, attempted {attempted}")]
    AlreadySet { current: u64, attempted: u64 },

    // Producer errors
    #[error("Producer error: {0}")]
    ProducerError(String),

    // Device errors
    #[error("Playback device error: {0}")]
    PlaybackDevice(String),

    // Rendering target errors
    #[error("Missing rendering capability: {0}")]
    MissingCapability(String),

    // Session errors
    #[error("A session is already active ({0})")]
    SessionActive(SessionState),

    #[error("No active session")]
    NoActiveSession,

    // Data errors
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl VivaError {
    /// Whether the error ends the session it happened in
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            VivaError::OutOfOrderChunk { .. } | VivaError::ProducerError(_)
        )
    }

    /// Whether the error is routine and should never reach the user
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            VivaError::MissingCapability(_) | VivaError::PlaybackDevice(_)
        )
    }
}

/// Result type for VIVA operations
pub type VivaResult<T> = Result<T, VivaError>;
