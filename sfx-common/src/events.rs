//! Event types for the SFX event system
//!
//! Provides the shared event definitions and the EventBus used by the
//! interruption controller to report what it did to a voice channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Voice channel identifier
///
/// Every interruption controller is bound to exactly one voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        ChannelId(id)
    }
}

/// Why an interruption stopped being the active one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClearReason {
    /// Clip played to the end and nothing was underneath it
    Finished,
    /// Engine reported a playback error for the clip
    Errored,
    /// Engine reported the clip as stuck
    Stuck,
    /// A newer clip replaced it before it finished
    Superseded,
    /// Clip ended and the underlying track was restored
    Restored,
}

impl std::fmt::Display for ClearReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClearReason::Finished => write!(f, "finished"),
            ClearReason::Errored => write!(f, "errored"),
            ClearReason::Stuck => write!(f, "stuck"),
            ClearReason::Superseded => write!(f, "superseded"),
            ClearReason::Restored => write!(f, "restored"),
        }
    }
}

/// SFX event types
///
/// Events are broadcast via EventBus and can be serialized for logging or
/// forwarding to other processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SfxEvent {
    /// A clip became the active interruption
    InterruptionStarted {
        /// Voice channel the clip plays in
        channel: ChannelId,
        /// Engine identifier of the clip track
        track_id: String,
        /// Whether the clip's backing file is deleted after use
        ephemeral: bool,
        /// Track that was playing underneath (None if the player was idle
        /// or another interruption was already active)
        over_track_id: Option<String>,
        /// When the interruption started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A newer clip replaced a still-active one
    InterruptionSuperseded {
        channel: ChannelId,
        old_track_id: String,
        new_track_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The active interruption was cleared
    InterruptionCleared {
        channel: ChannelId,
        track_id: String,
        reason: ClearReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The pre-interruption track was put back at its captured position
    PlaybackRestored {
        channel: ChannelId,
        track_id: String,
        /// Position the track was resumed at (milliseconds)
        position_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An ephemeral clip file was purged
    ClipDiscarded {
        channel: ChannelId,
        /// Locator of the deleted file
        uri: String,
        /// False if the deletion failed (the failure is logged, not fatal)
        deleted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SfxEvent {
    /// Channel the event belongs to
    pub fn channel(&self) -> ChannelId {
        match self {
            SfxEvent::InterruptionStarted { channel, .. }
            | SfxEvent::InterruptionSuperseded { channel, .. }
            | SfxEvent::InterruptionCleared { channel, .. }
            | SfxEvent::PlaybackRestored { channel, .. }
            | SfxEvent::ClipDiscarded { channel, .. } => *channel,
        }
    }

    /// Short event name for log lines
    pub fn name(&self) -> &'static str {
        match self {
            SfxEvent::InterruptionStarted { .. } => "InterruptionStarted",
            SfxEvent::InterruptionSuperseded { .. } => "InterruptionSuperseded",
            SfxEvent::InterruptionCleared { .. } => "InterruptionCleared",
            SfxEvent::PlaybackRestored { .. } => "PlaybackRestored",
            SfxEvent::ClipDiscarded { .. } => "ClipDiscarded",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use sfx_common::events::{ChannelId, ClearReason, EventBus, SfxEvent};
///
/// let event_bus = EventBus::new(16);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SfxEvent::InterruptionCleared {
///     channel: ChannelId(7),
///     track_id: "abc".to_string(),
///     reason: ClearReason::Finished,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SfxEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are
    /// dropped for lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SfxEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SfxEvent) -> Result<usize, broadcast::error::SendError<SfxEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SfxEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
