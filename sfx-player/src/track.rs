//! Track handles and engine lifecycle events
//!
//! A `Track` is the engine's handle to a playable source. The engine hands
//! out fresh `Track` values across the event boundary, so two handles refer
//! to the same track only when their identifiers match; `Track` deliberately
//! has no `PartialEq`.

use sfx_common::ChannelId;
use std::path::{Path, PathBuf};

/// Engine-assigned stable track identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackId(pub String);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        TrackId(s.to_string())
    }
}

/// Handle to a playable audio source as known to the engine
///
/// Position and duration live in the engine and are queried, not stored.
#[derive(Debug, Clone)]
pub struct Track {
    /// Identifier used for event correlation
    pub id: TrackId,
    /// Source locator (file path for clips)
    pub uri: String,
}

impl Track {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: TrackId(id.into()),
            uri: uri.into(),
        }
    }

    /// Identity check by engine identifier
    pub fn same_as(&self, other: &Track) -> bool {
        self.id == other.id
    }
}

/// Lifecycle signal kinds reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEventKind {
    TrackStarted,
    TrackEnded,
    TrackErrored,
    TrackStuck,
}

impl std::fmt::Display for PlayerEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerEventKind::TrackStarted => write!(f, "track-started"),
            PlayerEventKind::TrackEnded => write!(f, "track-ended"),
            PlayerEventKind::TrackErrored => write!(f, "track-errored"),
            PlayerEventKind::TrackStuck => write!(f, "track-stuck"),
        }
    }
}

/// Lifecycle event delivered by the engine to registered listeners
#[derive(Debug, Clone)]
pub struct PlayerEvent {
    /// Channel of the player that emitted the event
    pub channel: ChannelId,
    pub kind: PlayerEventKind,
    /// Track the event is about, when the engine reports one
    pub track: Option<Track>,
}

impl PlayerEvent {
    pub fn new(channel: ChannelId, kind: PlayerEventKind, track: Option<Track>) -> Self {
        Self {
            channel,
            kind,
            track,
        }
    }
}

/// Where a one-shot clip comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipSource {
    /// Persisted library sound, never deleted after playback
    Library(PathBuf),
    /// Synthesized speech file, purged once the clip is no longer needed
    Speech(PathBuf),
}

impl ClipSource {
    pub fn path(&self) -> &Path {
        match self {
            ClipSource::Library(path) | ClipSource::Speech(path) => path,
        }
    }

    /// Whether the backing file must be deleted after use
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, ClipSource::Speech(_))
    }
}
