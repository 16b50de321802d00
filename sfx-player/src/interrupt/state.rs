//! Interruption state machine
//!
//! Owns "which clip is the active interruption" and "what was playing before
//! the first clip of the current chain", and decides what the player queue
//! should look like for every submission and every engine lifecycle event.
//!
//! Phases:
//! - `Idle`: nothing to track
//! - `InterruptOnly`: a clip is playing over an idle player
//! - `InterruptOverUnderlying`: a clip is playing over a captured track
//! - `RestorePending`: the clip is gone (errored) but the captured track
//!   has not come back on air yet
//!
//! This type is not synchronized. The actor in `actor.rs` is its only owner
//! and feeds it submissions and engine events one at a time.

use crate::engine::Player;
use crate::ephemeral::Interruption;
use crate::error::Result;
use crate::track::{PlayerEvent, PlayerEventKind, Track, TrackId};
use sfx_common::events::{ClearReason, EventBus, SfxEvent};
use sfx_common::ChannelId;
use std::time::Duration;
use tracing::{debug, warn};

/// Snapshot of the track that was playing when an interruption chain began
#[derive(Debug, Clone)]
pub struct SavedPlayback {
    pub track: Track,
    pub position: Duration,
}

/// Coarse controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    InterruptOnly,
    InterruptOverUnderlying,
    RestorePending,
}

impl std::fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerPhase::Idle => write!(f, "idle"),
            ControllerPhase::InterruptOnly => write!(f, "interrupt-only"),
            ControllerPhase::InterruptOverUnderlying => write!(f, "interrupt-over-underlying"),
            ControllerPhase::RestorePending => write!(f, "restore-pending"),
        }
    }
}

/// Read-only view of the active interruption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptionInfo {
    pub track_id: TrackId,
    pub uri: String,
    pub ephemeral: bool,
}

/// Point-in-time copy of the controller state
#[derive(Debug, Clone)]
pub struct InterruptSnapshot {
    pub phase: ControllerPhase,
    pub interruption: Option<InterruptionInfo>,
    pub saved: Option<SavedPlayback>,
}

/// Per-channel interruption/resume controller
pub struct InterruptController {
    channel: ChannelId,
    interruption: Option<Interruption>,
    saved: Option<SavedPlayback>,
    bus: EventBus,
}

impl InterruptController {
    pub fn new(channel: ChannelId, bus: EventBus) -> Self {
        Self {
            channel,
            interruption: None,
            saved: None,
            bus,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn phase(&self) -> ControllerPhase {
        match (&self.interruption, &self.saved) {
            (None, None) => ControllerPhase::Idle,
            (Some(_), None) => ControllerPhase::InterruptOnly,
            (Some(_), Some(_)) => ControllerPhase::InterruptOverUnderlying,
            (None, Some(_)) => ControllerPhase::RestorePending,
        }
    }

    pub fn interruption(&self) -> Option<&Interruption> {
        self.interruption.as_ref()
    }

    pub fn saved(&self) -> Option<&SavedPlayback> {
        self.saved.as_ref()
    }

    pub fn snapshot(&self) -> InterruptSnapshot {
        InterruptSnapshot {
            phase: self.phase(),
            interruption: self.interruption.as_ref().map(|i| InterruptionInfo {
                track_id: i.track().id.clone(),
                uri: i.track().uri.clone(),
                ephemeral: i.is_ephemeral(),
            }),
            saved: self.saved.clone(),
        }
    }

    // ========================================
    // Submissions
    // ========================================

    /// Make `track` the active interruption
    ///
    /// Engine command failures are returned unchanged; state is only updated
    /// once every command for the chosen case has been accepted.
    pub async fn submit(&mut self, player: &dyn Player, track: Track, ephemeral: bool) -> Result<()> {
        let Some(current) = player.current_track().await else {
            return self.start_on_idle(player, track, ephemeral).await;
        };

        if self.interruption.is_some() {
            return self.supersede(player, track, ephemeral).await;
        }

        self.interrupt_underlying(player, current, track, ephemeral).await
    }

    /// Nothing is on air: queue the clip and start it
    async fn start_on_idle(&mut self, player: &dyn Player, track: Track, ephemeral: bool) -> Result<()> {
        player.enqueue_at_head(track.clone()).await?;
        player.play().await?;

        // A clip we were never told about finishing is no longer playing
        if let Some(stale) = self.interruption.take() {
            debug!(channel = %self.channel, track = %stale.track().id, "Dropping stale interruption");
            self.release(stale, ClearReason::Superseded).await;
        }

        self.begin(track, ephemeral, None);
        Ok(())
    }

    /// A clip is already active: the new one replaces it
    async fn supersede(&mut self, player: &dyn Player, track: Track, ephemeral: bool) -> Result<()> {
        player.enqueue_at_head(track.clone()).await?;
        player.skip_to_head().await?;

        if let Some(previous) = self.interruption.take() {
            self.bus.emit_lossy(SfxEvent::InterruptionSuperseded {
                channel: self.channel,
                old_track_id: previous.track().id.to_string(),
                new_track_id: track.id.to_string(),
                timestamp: chrono::Utc::now(),
            });
            self.release(previous, ClearReason::Superseded).await;
        }

        self.begin(track, ephemeral, None);
        Ok(())
    }

    /// Regular track on air: capture it, play the clip, queue it back
    async fn interrupt_underlying(
        &mut self,
        player: &dyn Player,
        current: Track,
        track: Track,
        ephemeral: bool,
    ) -> Result<()> {
        let position = player.current_position().await;

        player.enqueue_at_head(track.clone()).await?;
        player.enqueue_at(1, current.clone()).await?;
        player.skip_to_head().await?;

        debug!(
            channel = %self.channel,
            underlying = %current.id,
            position_ms = position.as_millis() as u64,
            "Captured underlying track"
        );
        let over = current.id.to_string();
        self.saved = Some(SavedPlayback {
            track: current,
            position,
        });
        self.begin(track, ephemeral, Some(over));
        Ok(())
    }

    fn begin(&mut self, track: Track, ephemeral: bool, over_track_id: Option<String>) {
        debug!(channel = %self.channel, track = %track.id, ephemeral, "Interruption started");
        self.bus.emit_lossy(SfxEvent::InterruptionStarted {
            channel: self.channel,
            track_id: track.id.to_string(),
            ephemeral,
            over_track_id,
            timestamp: chrono::Utc::now(),
        });
        self.interruption = Some(Interruption::new(track, ephemeral));
    }

    // ========================================
    // Engine events
    // ========================================

    /// React to one engine lifecycle event
    ///
    /// Total over every event and state: anything that doesn't match a
    /// transition is ignored. Never fails; engine command errors issued from
    /// here are logged.
    pub async fn on_event(&mut self, player: &dyn Player, event: &PlayerEvent) {
        if self.interruption.is_none() && self.saved.is_none() {
            return;
        }

        match event.kind {
            PlayerEventKind::TrackStarted => {}
            PlayerEventKind::TrackErrored => {
                if let Some(interruption) = self.interruption.take() {
                    self.release(interruption, ClearReason::Errored).await;
                }
            }
            PlayerEventKind::TrackStuck => {
                if let Some(interruption) = self.interruption.take() {
                    self.release(interruption, ClearReason::Stuck).await;
                    if let Err(e) = player.skip_to_head().await {
                        warn!(channel = %self.channel, "Skip after stuck clip failed: {}", e);
                    }
                }
            }
            PlayerEventKind::TrackEnded => self.on_track_ended(player, event).await,
        }
    }

    async fn on_track_ended(&mut self, player: &dyn Player, event: &PlayerEvent) {
        let Some(current) = player.current_track().await else {
            if let Some(interruption) = self.interruption.take() {
                self.release(interruption, ClearReason::Finished).await;
            }
            return;
        };

        let underlying_is_back = self
            .saved
            .as_ref()
            .is_some_and(|saved| saved.track.same_as(&current));
        if underlying_is_back {
            self.restore(player).await;
            return;
        }

        // The clip itself ended but the player moved on to something we never
        // captured: drop the clip, keep waiting for the captured track.
        let clip_ended = match (&self.interruption, &event.track) {
            (Some(interruption), Some(ended)) => interruption.track().same_as(ended),
            _ => false,
        };
        if clip_ended {
            if let Some(interruption) = self.interruption.take() {
                self.release(interruption, ClearReason::Finished).await;
            }
        }
    }

    /// Put the captured track back at its captured position
    async fn restore(&mut self, player: &dyn Player) {
        if let Some(interruption) = self.interruption.take() {
            self.release(interruption, ClearReason::Restored).await;
        }
        let Some(saved) = self.saved.take() else {
            return;
        };

        if let Err(e) = player.pause().await {
            warn!(channel = %self.channel, "Pause before restore failed: {}", e);
        }
        if let Err(e) = player.seek(saved.position).await {
            warn!(channel = %self.channel, "Seek to {:?} failed: {}", saved.position, e);
        }
        if let Err(e) = player.resume().await {
            warn!(channel = %self.channel, "Resume after restore failed: {}", e);
        }

        debug!(
            channel = %self.channel,
            track = %saved.track.id,
            position_ms = saved.position.as_millis() as u64,
            "Restored underlying track"
        );
        self.bus.emit_lossy(SfxEvent::PlaybackRestored {
            channel: self.channel,
            track_id: saved.track.id.to_string(),
            position_ms: saved.position.as_millis() as u64,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Release an interruption that has already been taken out of `self`
    pub(super) async fn release(&self, interruption: Interruption, reason: ClearReason) {
        let track = interruption.release(self.channel, &self.bus).await;
        debug!(channel = %self.channel, track = %track.id, %reason, "Interruption cleared");
        self.bus.emit_lossy(SfxEvent::InterruptionCleared {
            channel: self.channel,
            track_id: track.id.to_string(),
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Take the active clip off air before the controller goes away
    ///
    /// A clip that is still the current track is skipped first, and the
    /// captured track is restored if the skip lands on it. The clip is only
    /// released after that, so its file is never deleted while it plays.
    pub(super) async fn teardown(&mut self, player: Option<&dyn Player>) {
        if let Some(player) = player {
            let clip_on_air = match &self.interruption {
                Some(interruption) => player
                    .current_track()
                    .await
                    .is_some_and(|current| interruption.track().same_as(&current)),
                None => false,
            };

            if clip_on_air {
                match player.skip_to_head().await {
                    Ok(()) => {
                        let underlying_is_back = match (player.current_track().await, &self.saved) {
                            (Some(current), Some(saved)) => saved.track.same_as(&current),
                            _ => false,
                        };
                        if underlying_is_back {
                            self.restore(player).await;
                        }
                    }
                    Err(e) => {
                        warn!(channel = %self.channel, "Skip during teardown failed: {}", e);
                    }
                }
            }
        }

        if let Some(interruption) = self.interruption.take() {
            self.release(interruption, ClearReason::Superseded).await;
        }
        if let Some(saved) = self.saved.take() {
            debug!(channel = %self.channel, track = %saved.track.id, "Dropping captured track");
        }
    }
}
