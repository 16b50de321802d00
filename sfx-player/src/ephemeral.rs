//! Ephemeral clip lifecycle
//!
//! An `Interruption` owns its clip track. It is not `Clone`, and releasing it
//! consumes it, so the backing file of an ephemeral clip is deleted at most
//! once; the controller releases every interruption it drops, so the file is
//! deleted exactly once. Deletion failures are logged and reported on the
//! event bus but never stop the state transition that triggered them.

use crate::track::Track;
use sfx_common::events::{EventBus, SfxEvent};
use sfx_common::ChannelId;
use std::io::ErrorKind;
use tracing::{debug, warn};

/// The currently active one-shot clip
#[derive(Debug)]
pub struct Interruption {
    track: Track,
    ephemeral: bool,
}

impl Interruption {
    pub fn new(track: Track, ephemeral: bool) -> Self {
        Self { track, ephemeral }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Give up the interruption, deleting its file if it is ephemeral
    ///
    /// Returns the clip track for logging.
    pub async fn release(self, channel: ChannelId, bus: &EventBus) -> Track {
        if self.ephemeral {
            let deleted = delete_clip_file(&self.track.uri).await;
            bus.emit_lossy(SfxEvent::ClipDiscarded {
                channel,
                uri: self.track.uri.clone(),
                deleted,
                timestamp: chrono::Utc::now(),
            });
        }
        self.track
    }
}

/// Remove a clip file, logging instead of failing
///
/// Returns whether the file was removed.
pub async fn delete_clip_file(uri: &str) -> bool {
    match tokio::fs::remove_file(uri).await {
        Ok(()) => {
            debug!("Deleted clip file {}", uri);
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Clip file {} was already gone", uri);
            false
        }
        Err(e) => {
            warn!("Failed to delete clip file {}: {}", uri, e);
            false
        }
    }
}
