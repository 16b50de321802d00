//! In-process playback engine
//!
//! `MemoryEngine` keeps a current track, a queue and a position per channel,
//! and emits lifecycle events the way a streaming engine does: a skip or a
//! natural track end advances to the queue head first, then reports the old
//! track as ended. Nothing is decoded; time only moves when a driver calls
//! [`MemoryPlayer::set_position`] or one of the `*_current` methods.
//!
//! Every command the controller issues is recorded so tests and the
//! simulator can inspect exactly what happened.

use super::dispatch::{EventHandler, ListenerId, ListenerRegistry};
use super::{ClipResolver, EngineError, EngineResult, PlaybackEngine, Player};
use crate::error::{Error, Result};
use crate::track::{ClipSource, PlayerEvent, PlayerEventKind, Track, TrackId};
use async_trait::async_trait;
use sfx_common::ChannelId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Command recorded by a `MemoryPlayer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Connect,
    EnqueueAt { index: usize, track_id: TrackId },
    SkipToHead,
    Play,
    Pause,
    Resume,
    Seek(Duration),
}

/// Player operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Enqueue,
    Skip,
    Play,
    Pause,
    Resume,
    Seek,
}

#[derive(Default)]
struct PlayerState {
    current: Option<Track>,
    position: Duration,
    paused: bool,
    queue: VecDeque<Track>,
    commands: Vec<EngineCommand>,
    failing: HashSet<EngineOp>,
}

impl PlayerState {
    fn check(&self, op: EngineOp) -> EngineResult<()> {
        if self.failing.contains(&op) {
            return Err(EngineError::Command(format!("{:?} rejected", op)));
        }
        Ok(())
    }

    /// Replace the current track with the queue head
    ///
    /// Returns the track that stopped and the one that started.
    fn advance(&mut self) -> (Option<Track>, Option<Track>) {
        let old = self.current.take();
        self.current = self.queue.pop_front();
        self.position = Duration::ZERO;
        self.paused = false;
        (old, self.current.clone())
    }
}

/// Player for one channel of a `MemoryEngine`
pub struct MemoryPlayer {
    channel: ChannelId,
    state: Mutex<PlayerState>,
    listeners: Arc<ListenerRegistry>,
}

impl MemoryPlayer {
    fn new(channel: ChannelId, listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            channel,
            state: Mutex::new(PlayerState::default()),
            listeners,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: Vec<(PlayerEventKind, Track)>) {
        for (kind, track) in events {
            debug!(channel = %self.channel, track = %track.id, "{}", kind);
            self.listeners
                .dispatch(PlayerEvent::new(self.channel, kind, Some(track)));
        }
    }

    fn transition_events(
        old: Option<Track>,
        new: Option<Track>,
    ) -> Vec<(PlayerEventKind, Track)> {
        let mut events = Vec::new();
        if let Some(old) = old {
            events.push((PlayerEventKind::TrackEnded, old));
        }
        if let Some(new) = new {
            events.push((PlayerEventKind::TrackStarted, new));
        }
        events
    }

    // ========================================
    // Drivers (stand-ins for real playback)
    // ========================================

    /// Put `track` on air directly, as another part of the bot would
    pub fn start_playing(&self, track: Track, position: Duration) {
        {
            let mut state = self.lock();
            state.current = Some(track.clone());
            state.position = position;
            state.paused = false;
        }
        self.emit(vec![(PlayerEventKind::TrackStarted, track)]);
    }

    /// Append to the end of the queue without recording a command
    pub fn push_back(&self, track: Track) {
        self.lock().queue.push_back(track);
    }

    /// Move the playhead of the current track
    pub fn set_position(&self, position: Duration) {
        self.lock().position = position;
    }

    /// Current track plays to its natural end
    pub fn finish_current(&self) {
        let (old, new) = self.lock().advance();
        self.emit(Self::transition_events(old, new));
    }

    /// Current track fails to play: errored, then ended
    pub fn fail_current(&self) {
        let (old, new) = {
            let mut state = self.lock();
            if state.current.is_none() {
                return;
            }
            state.advance()
        };
        let mut events = Vec::new();
        if let Some(old) = &old {
            events.push((PlayerEventKind::TrackErrored, old.clone()));
        }
        events.extend(Self::transition_events(old, new));
        self.emit(events);
    }

    /// Current track stops producing audio; the engine only reports it
    pub fn stall_current(&self) {
        let current = self.lock().current.clone();
        if let Some(track) = current {
            self.emit(vec![(PlayerEventKind::TrackStuck, track)]);
        }
    }

    /// Make a player operation fail until [`MemoryPlayer::clear_failures`]
    pub fn fail_on(&self, op: EngineOp) {
        self.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    // ========================================
    // Inspection
    // ========================================

    pub fn current_id(&self) -> Option<TrackId> {
        self.lock().current.as_ref().map(|t| t.id.clone())
    }

    pub fn queue_ids(&self) -> Vec<TrackId> {
        self.lock().queue.iter().map(|t| t.id.clone()).collect()
    }

    pub fn position(&self) -> Duration {
        self.lock().position
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Commands issued so far, oldest first
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }
}

#[async_trait]
impl Player for MemoryPlayer {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn current_track(&self) -> Option<Track> {
        self.lock().current.clone()
    }

    async fn current_position(&self) -> Duration {
        self.lock().position
    }

    async fn enqueue_at(&self, index: usize, track: Track) -> EngineResult<()> {
        let mut state = self.lock();
        state.check(EngineOp::Enqueue)?;
        if index > state.queue.len() {
            return Err(EngineError::QueueIndex {
                index,
                len: state.queue.len(),
            });
        }
        state.commands.push(EngineCommand::EnqueueAt {
            index,
            track_id: track.id.clone(),
        });
        state.queue.insert(index, track);
        Ok(())
    }

    async fn skip_to_head(&self) -> EngineResult<()> {
        let (old, new) = {
            let mut state = self.lock();
            state.check(EngineOp::Skip)?;
            state.commands.push(EngineCommand::SkipToHead);
            state.advance()
        };
        self.emit(Self::transition_events(old, new));
        Ok(())
    }

    async fn play(&self) -> EngineResult<()> {
        let started = {
            let mut state = self.lock();
            state.check(EngineOp::Play)?;
            state.commands.push(EngineCommand::Play);
            if state.current.is_some() {
                state.paused = false;
                None
            } else {
                state.advance().1
            }
        };
        self.emit(Self::transition_events(None, started));
        Ok(())
    }

    async fn pause(&self) -> EngineResult<()> {
        let mut state = self.lock();
        state.check(EngineOp::Pause)?;
        state.commands.push(EngineCommand::Pause);
        state.paused = true;
        Ok(())
    }

    async fn resume(&self) -> EngineResult<()> {
        let mut state = self.lock();
        state.check(EngineOp::Resume)?;
        state.commands.push(EngineCommand::Resume);
        state.paused = false;
        Ok(())
    }

    async fn seek(&self, position: Duration) -> EngineResult<()> {
        let mut state = self.lock();
        state.check(EngineOp::Seek)?;
        if state.current.is_none() {
            return Err(EngineError::Command("seek with nothing playing".to_string()));
        }
        state.commands.push(EngineCommand::Seek(position));
        state.position = position;
        Ok(())
    }
}

/// In-process engine with one `MemoryPlayer` per channel
pub struct MemoryEngine {
    players: Mutex<HashMap<ChannelId, Arc<MemoryPlayer>>>,
    listeners: Arc<ListenerRegistry>,
    ready: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            players: Mutex::new(HashMap::new()),
            listeners: Arc::new(ListenerRegistry::new()),
            ready: AtomicBool::new(true),
        }
    }

    /// Simulate the engine losing (or regaining) its audio node
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Player for `channel`, creating it if needed (no Connect recorded)
    pub fn player(&self, channel: ChannelId) -> Arc<MemoryPlayer> {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel)
            .or_insert_with(|| Arc::new(MemoryPlayer::new(channel, self.listeners.clone())))
            .clone()
    }

    /// Number of registered event listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Mint a track handle for `uri`
    pub fn load_track(&self, uri: &str) -> Track {
        Track::new(Uuid::new_v4().to_string(), uri)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackEngine for MemoryEngine {
    async fn connect(&self, channel: ChannelId) -> EngineResult<Arc<dyn Player>> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(EngineError::NotReady);
        }
        let player = self.player(channel);
        player.lock().commands.push(EngineCommand::Connect);
        let player: Arc<dyn Player> = player;
        Ok(player)
    }

    fn register_listener(&self, handler: EventHandler) -> ListenerId {
        self.listeners.register(handler)
    }

    fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }
}

#[async_trait]
impl ClipResolver for MemoryEngine {
    async fn resolve(&self, source: &ClipSource) -> Result<Track> {
        let path = source.path();
        if path.as_os_str().is_empty() {
            return Err(Error::Resolve("empty clip path".to_string()));
        }
        Ok(self.load_track(&path.to_string_lossy()))
    }
}
