//! Voice channel sessions
//!
//! Keeps one interrupt controller per voice channel, created the first time a
//! clip is played there and torn down when the session ends. Channels never
//! share controller state.

use crate::engine::{ClipResolver, PlaybackEngine};
use crate::error::Result;
use crate::interrupt::{InterruptController, InterruptHandle, InterruptSnapshot};
use crate::track::{ClipSource, Track};
use sfx_common::events::EventBus;
use sfx_common::ChannelId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Per-channel controller registry
pub struct SfxSessions {
    engine: Arc<dyn PlaybackEngine>,
    resolver: Arc<dyn ClipResolver>,
    bus: EventBus,
    controllers: Mutex<HashMap<ChannelId, InterruptHandle>>,
}

impl SfxSessions {
    pub fn new(engine: Arc<dyn PlaybackEngine>, resolver: Arc<dyn ClipResolver>, bus: EventBus) -> Self {
        Self {
            engine,
            resolver,
            bus,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Controller for `channel`, spawning one if none is running
    pub async fn controller(&self, channel: ChannelId) -> InterruptHandle {
        let mut controllers = self.controllers.lock().await;
        if let Some(handle) = controllers.get(&channel) {
            if !handle.is_closed() {
                return handle.clone();
            }
            debug!("Controller for channel {} had stopped, respawning", channel);
        }

        let handle = InterruptController::spawn(self.engine.clone(), channel, self.bus.clone());
        controllers.insert(channel, handle.clone());
        handle
    }

    /// Resolve `source` and play it as an interruption in `channel`
    ///
    /// Returns the track handle the clip was resolved to.
    pub async fn play(&self, channel: ChannelId, source: ClipSource) -> Result<Track> {
        let track = self.resolver.resolve(&source).await?;
        debug!(
            "Playing {} clip {} in channel {}",
            if source.is_ephemeral() { "speech" } else { "library" },
            source.path().display(),
            channel
        );

        let controller = self.controller(channel).await;
        controller.submit(track.clone(), source.is_ephemeral()).await?;
        Ok(track)
    }

    /// State of the channel's controller, if one is running
    pub async fn snapshot(&self, channel: ChannelId) -> Option<InterruptSnapshot> {
        let handle = self.controllers.lock().await.get(&channel).cloned()?;
        handle.snapshot().await.ok()
    }

    /// Tear down the controller for `channel`
    ///
    /// Returns false if there was no session.
    pub async fn end_session(&self, channel: ChannelId) -> bool {
        let Some(handle) = self.controllers.lock().await.remove(&channel) else {
            return false;
        };
        if let Err(e) = handle.shutdown().await {
            warn!("Session for channel {} ended uncleanly: {}", channel, e);
        }
        info!("Session ended for channel {}", channel);
        true
    }

    /// Tear down every session
    pub async fn shutdown_all(&self) {
        let handles: Vec<InterruptHandle> = self
            .controllers
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        for handle in handles {
            let channel = handle.channel();
            if let Err(e) = handle.shutdown().await {
                warn!("Session for channel {} ended uncleanly: {}", channel, e);
            }
        }
    }

    /// Channels with a live session, sorted
    pub async fn active_channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self
            .controllers
            .lock()
            .await
            .iter()
            .filter(|(_, handle)| !handle.is_closed())
            .map(|(channel, _)| *channel)
            .collect();
        channels.sort();
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[tokio::test]
    async fn test_controller_is_reused_per_channel() {
        let engine = Arc::new(MemoryEngine::new());
        let sessions = SfxSessions::new(engine.clone(), engine.clone(), EventBus::new(8));

        sessions.controller(ChannelId(1)).await;
        sessions.controller(ChannelId(1)).await;
        assert_eq!(engine.listener_count(), 1);
        assert_eq!(sessions.active_channels().await, vec![ChannelId(1)]);
    }

    #[tokio::test]
    async fn test_stopped_controller_is_respawned() {
        let engine = Arc::new(MemoryEngine::new());
        let sessions = SfxSessions::new(engine.clone(), engine.clone(), EventBus::new(8));

        let first = sessions.controller(ChannelId(3)).await;
        first.shutdown().await.unwrap();
        assert!(first.is_closed());

        let second = sessions.controller(ChannelId(3)).await;
        assert!(!second.is_closed());
        assert!(second.snapshot().await.is_ok());
        assert_eq!(engine.listener_count(), 1);
    }
}
