//! Playback engine collaborator contract
//!
//! The streaming audio player is external to this crate. The controller only
//! needs the small surface below: connect to a channel, inspect and mutate the
//! player queue, and receive lifecycle events through a registered listener.
//!
//! **Module Structure:**
//! - `dispatch.rs`: listener registration and event fan-out
//! - `memory.rs`: in-process engine used by tests and the simulator binary

pub mod dispatch;
pub mod memory;

pub use crate::error::EngineError;
pub use dispatch::{EventHandler, ListenerId, ListenerRegistry};
pub use memory::{EngineCommand, EngineOp, MemoryEngine, MemoryPlayer};

use crate::track::{ClipSource, Track};
use async_trait::async_trait;
use sfx_common::ChannelId;
use std::sync::Arc;
use std::time::Duration;

/// Result of a single engine command
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Player bound to one voice channel
///
/// Queue index 0 is the entry that plays after the current track.
#[async_trait]
pub trait Player: Send + Sync {
    /// Channel this player streams to
    fn channel(&self) -> ChannelId;

    /// Track currently loaded (playing or paused), if any
    async fn current_track(&self) -> Option<Track>;

    /// Position within the current track
    async fn current_position(&self) -> Duration;

    /// Insert `track` at the front of the queue
    async fn enqueue_at_head(&self, track: Track) -> EngineResult<()> {
        self.enqueue_at(0, track).await
    }

    /// Insert `track` at queue position `index`
    async fn enqueue_at(&self, index: usize, track: Track) -> EngineResult<()>;

    /// Stop the current track and start the queue head
    async fn skip_to_head(&self) -> EngineResult<()>;

    /// Start playback from the queue when nothing is current
    async fn play(&self) -> EngineResult<()>;

    async fn pause(&self) -> EngineResult<()>;

    async fn resume(&self) -> EngineResult<()>;

    /// Move the current track to `position`
    async fn seek(&self, position: Duration) -> EngineResult<()>;
}

/// Engine owning one player per connected channel
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Connect (or reuse the connection) to a voice channel
    async fn connect(&self, channel: ChannelId) -> EngineResult<Arc<dyn Player>>;

    /// Register a lifecycle event handler
    ///
    /// The engine invokes every registered handler for every event of every
    /// channel; handlers must not block.
    fn register_listener(&self, handler: EventHandler) -> ListenerId;

    /// Remove a handler; returns false if it was not registered
    fn unregister_listener(&self, id: ListenerId) -> bool;
}

/// Turns a clip request into a playable track handle
#[async_trait]
pub trait ClipResolver: Send + Sync {
    async fn resolve(&self, source: &ClipSource) -> crate::Result<Track>;
}
