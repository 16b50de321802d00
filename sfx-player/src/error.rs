//! Error types for sfx-player
//!
//! Engine infrastructure failures are surfaced to the caller of `submit`.
//! Track playback failures (errored/stuck) never become errors; they are
//! state transitions inside the controller.

use sfx_common::ChannelId;
use thiserror::Error;

/// Failures reported by the playback engine for a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Engine is not connected to its audio node yet
    #[error("Playback engine is not ready")]
    NotReady,

    /// No player exists for the channel
    #[error("No player connected for channel {0}")]
    NotConnected(ChannelId),

    /// Queue insert position out of range
    #[error("Queue index {index} out of range (queue length {len})")]
    QueueIndex { index: usize, len: usize },

    /// Engine rejected a command
    #[error("Engine command failed: {0}")]
    Command(String),
}

/// Main error type for sfx-player
#[derive(Error, Debug)]
pub enum Error {
    /// Engine infrastructure errors (connect/enqueue/skip/seek failing)
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Clip could not be turned into a playable track
    #[error("Clip resolve error: {0}")]
    Resolve(String),

    /// Controller task for the channel has stopped
    #[error("Interrupt controller for channel {0} is not running")]
    ControllerClosed(ChannelId),

    /// Shared configuration/validation errors
    #[error(transparent)]
    Common(#[from] sfx_common::Error),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using sfx-player Error
pub type Result<T> = std::result::Result<T, Error>;
