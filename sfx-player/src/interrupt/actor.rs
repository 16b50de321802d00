//! Per-channel controller task
//!
//! Submissions from callers and lifecycle events from the engine both become
//! messages in one unbounded inbox, consumed by a single task that owns the
//! `InterruptController`. The engine listener only holds a weak sender, so
//! the task stops once every `InterruptHandle` is dropped.

use super::state::{InterruptController, InterruptSnapshot};
use crate::engine::{ListenerId, PlaybackEngine, Player};
use crate::error::{Error, Result};
use crate::track::{PlayerEvent, Track};
use sfx_common::events::EventBus;
use sfx_common::ChannelId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

enum Message {
    Submit {
        track: Track,
        ephemeral: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Engine(PlayerEvent),
    Snapshot {
        reply: oneshot::Sender<InterruptSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Caller-side handle to a running controller
#[derive(Clone)]
pub struct InterruptHandle {
    channel: ChannelId,
    tx: mpsc::UnboundedSender<Message>,
}

impl InterruptHandle {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Play `track` as a one-shot interruption
    ///
    /// Resolves once the engine has accepted every queue command (or one of
    /// them failed).
    pub async fn submit(&self, track: Track, ephemeral: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Submit {
            track,
            ephemeral,
            reply,
        })?;
        rx.await.map_err(|_| Error::ControllerClosed(self.channel))?
    }

    /// Current controller state
    pub async fn snapshot(&self) -> Result<InterruptSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Snapshot { reply })?;
        rx.await.map_err(|_| Error::ControllerClosed(self.channel))
    }

    /// Stop the controller and wait for its listener to be deregistered
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Shutdown { reply })?;
        rx.await.map_err(|_| Error::ControllerClosed(self.channel))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::ControllerClosed(self.channel))
    }
}

impl InterruptController {
    /// Start a controller task for `channel`
    ///
    /// Registers the engine listener before returning, so no event emitted in
    /// response to the first submission can be missed.
    pub fn spawn(engine: Arc<dyn PlaybackEngine>, channel: ChannelId, bus: EventBus) -> InterruptHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let inbox = tx.downgrade();
        let listener = engine.register_listener(Arc::new(move |event: PlayerEvent| {
            if event.channel != channel {
                return;
            }
            if let Some(tx) = inbox.upgrade() {
                let _ = tx.send(Message::Engine(event));
            }
        }));

        let controller = InterruptController::new(channel, bus);
        tokio::spawn(controller.run(engine, listener, rx));
        info!("Interrupt controller started for channel {}", channel);

        InterruptHandle { channel, tx }
    }

    async fn run(
        mut self,
        engine: Arc<dyn PlaybackEngine>,
        listener: ListenerId,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        let channel = self.channel();
        let mut player: Option<Arc<dyn Player>> = None;
        let mut shutdown_reply = None;

        while let Some(message) = rx.recv().await {
            match message {
                Message::Submit {
                    track,
                    ephemeral,
                    reply,
                } => {
                    let result = match engine.connect(channel).await {
                        Ok(connected) => {
                            let outcome = self.submit(connected.as_ref(), track, ephemeral).await;
                            player = Some(connected);
                            outcome
                        }
                        Err(e) => Err(e.into()),
                    };
                    if let Err(e) = &result {
                        warn!("Submit on channel {} failed: {}", channel, e);
                    }
                    let _ = reply.send(result);
                }
                Message::Engine(event) => match &player {
                    Some(player) => self.on_event(player.as_ref(), &event).await,
                    None => debug!("Ignoring {} before first submission", event.kind),
                },
                Message::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Message::Shutdown { reply } => {
                    shutdown_reply = Some(reply);
                    break;
                }
            }
        }

        // Handles observe the closed inbox before the shutdown reply lands
        drop(rx);
        engine.unregister_listener(listener);

        // Clip files must not outlive the session that created them
        self.teardown(player.as_deref()).await;

        info!("Interrupt controller stopped for channel {}", channel);
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_registers_and_shutdown_deregisters() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = InterruptController::spawn(engine.clone(), ChannelId(5), EventBus::new(8));
        assert_eq!(engine.listener_count(), 1);

        handle.shutdown().await.unwrap();
        assert_eq!(engine.listener_count(), 0);
        assert!(matches!(
            handle.submit(Track::new("x", "/x.mp3"), false).await,
            Err(Error::ControllerClosed(ChannelId(5)))
        ));
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_task() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = InterruptController::spawn(engine.clone(), ChannelId(5), EventBus::new(8));
        drop(handle);

        for _ in 0..50 {
            if engine.listener_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("listener was never deregistered");
    }

    #[tokio::test]
    async fn test_submit_surfaces_engine_not_ready() {
        let engine = Arc::new(MemoryEngine::new());
        engine.set_ready(false);
        let handle = InterruptController::spawn(engine.clone(), ChannelId(2), EventBus::new(8));

        let err = handle
            .submit(Track::new("x", "/x.mp3"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Engine(crate::engine::EngineError::NotReady)));

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.interruption.is_none());
        handle.shutdown().await.unwrap();
    }
}
