//! End-to-end interruption scenarios
//!
//! Drives `SfxSessions` against the in-process engine. Controller tasks
//! react to engine events asynchronously, so assertions wait on controller
//! snapshots instead of reading state immediately.

use sfx_common::events::{ClearReason, EventBus, SfxEvent};
use sfx_common::ChannelId;
use sfx_player::engine::{EngineCommand, EngineError, MemoryEngine, MemoryPlayer};
use sfx_player::interrupt::{ControllerPhase, InterruptSnapshot};
use sfx_player::{ClipSource, Error, SfxSessions, Track};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

const CHANNEL: ChannelId = ChannelId(100);

struct Harness {
    engine: Arc<MemoryEngine>,
    sessions: SfxSessions,
    events: broadcast::Receiver<SfxEvent>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let engine = Arc::new(MemoryEngine::new());
        let bus = EventBus::new(256);
        let events = bus.subscribe();
        let sessions = SfxSessions::new(engine.clone(), engine.clone(), bus);
        Self {
            engine,
            sessions,
            events,
            dir: TempDir::new().unwrap(),
        }
    }

    fn player(&self, channel: ChannelId) -> Arc<MemoryPlayer> {
        self.engine.player(channel)
    }

    /// Write a clip file into the scratch dir
    fn clip_file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"clip").unwrap();
        path
    }

    /// Put a regular track on air
    fn start_underlying(&self, channel: ChannelId, uri: &str, position: Duration) -> Track {
        let track = self.engine.load_track(uri);
        self.player(channel).start_playing(track.clone(), position);
        track
    }

    /// Wait until the controller snapshot satisfies `pred`
    async fn wait_for(
        &self,
        channel: ChannelId,
        pred: impl Fn(&InterruptSnapshot) -> bool,
    ) -> InterruptSnapshot {
        for _ in 0..200 {
            if let Some(snapshot) = self.sessions.snapshot(channel).await {
                if pred(&snapshot) {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("controller for {} never reached the expected state", channel);
    }

    async fn wait_idle(&self, channel: ChannelId) -> InterruptSnapshot {
        self.wait_for(channel, |s| s.phase == ControllerPhase::Idle)
            .await
    }

    fn drain_events(&mut self) -> Vec<SfxEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

#[tokio::test]
async fn test_speech_on_idle_channel_is_deleted_when_it_ends() {
    let mut h = Harness::new();
    let path = h.clip_file("0A1B2C3D4E5F678.mp3");

    let clip = h
        .sessions
        .play(CHANNEL, ClipSource::Speech(path.clone()))
        .await
        .unwrap();

    let snapshot = h.sessions.snapshot(CHANNEL).await.unwrap();
    assert_eq!(snapshot.phase, ControllerPhase::InterruptOnly);
    assert!(snapshot.saved.is_none());
    assert_eq!(h.player(CHANNEL).current_id(), Some(clip.id.clone()));

    h.player(CHANNEL).finish_current();
    h.wait_idle(CHANNEL).await;

    assert!(!path.exists());
    assert!(!h
        .player(CHANNEL)
        .commands()
        .iter()
        .any(|c| matches!(c, EngineCommand::Seek(_))));

    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        SfxEvent::ClipDiscarded { deleted: true, .. }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SfxEvent::InterruptionCleared { reason: ClearReason::Finished, .. }
    )));
}

#[tokio::test]
async fn test_underlying_track_resumes_at_captured_position() {
    let mut h = Harness::new();
    let music = h.start_underlying(CHANNEL, "/music/m.flac", Duration::from_secs(42));
    let path = h.clip_file("ABCDEF012345678.mp3");

    let clip = h
        .sessions
        .play(CHANNEL, ClipSource::Speech(path.clone()))
        .await
        .unwrap();

    let snapshot = h.sessions.snapshot(CHANNEL).await.unwrap();
    assert_eq!(snapshot.phase, ControllerPhase::InterruptOverUnderlying);
    let saved = snapshot.saved.unwrap();
    assert_eq!(saved.track.id, music.id);
    assert_eq!(saved.position, Duration::from_secs(42));

    let player = h.player(CHANNEL);
    assert_eq!(player.current_id(), Some(clip.id));
    assert_eq!(player.queue_ids(), vec![music.id.clone()]);

    player.clear_commands();
    player.finish_current();
    let snapshot = h.wait_idle(CHANNEL).await;

    assert!(snapshot.interruption.is_none());
    assert!(snapshot.saved.is_none());
    assert!(!path.exists());
    assert_eq!(player.current_id(), Some(music.id.clone()));
    assert_eq!(player.position(), Duration::from_secs(42));
    assert!(!player.is_paused());
    assert_eq!(
        player.commands(),
        vec![
            EngineCommand::Pause,
            EngineCommand::Seek(Duration::from_secs(42)),
            EngineCommand::Resume,
        ]
    );

    let restored = h.drain_events().into_iter().find_map(|e| match e {
        SfxEvent::PlaybackRestored {
            track_id,
            position_ms,
            ..
        } => Some((track_id, position_ms)),
        _ => None,
    });
    assert_eq!(restored, Some((music.id.to_string(), 42_000)));
}

#[tokio::test]
async fn test_second_clip_supersedes_first_and_keeps_saved_state() {
    let mut h = Harness::new();
    let music = h.start_underlying(CHANNEL, "/music/m.flac", Duration::from_secs(42));
    let path_a = h.clip_file("AAAAAAAAAAAAAAA.mp3");
    let path_b = h.clip_file("BBBBBBBBBBBBBBB.mp3");

    let clip_a = h
        .sessions
        .play(CHANNEL, ClipSource::Speech(path_a.clone()))
        .await
        .unwrap();
    let clip_b = h
        .sessions
        .play(CHANNEL, ClipSource::Speech(path_b.clone()))
        .await
        .unwrap();

    // A is released as soon as B takes over
    assert!(!path_a.exists());
    assert!(path_b.exists());

    let snapshot = h.sessions.snapshot(CHANNEL).await.unwrap();
    assert_eq!(snapshot.phase, ControllerPhase::InterruptOverUnderlying);
    assert_eq!(snapshot.interruption.unwrap().track_id, clip_b.id);
    let saved = snapshot.saved.unwrap();
    assert_eq!(saved.track.id, music.id);
    assert_eq!(saved.position, Duration::from_secs(42));

    let superseded = h.drain_events().into_iter().any(|e| match e {
        SfxEvent::InterruptionSuperseded {
            old_track_id,
            new_track_id,
            ..
        } => old_track_id == clip_a.id.to_string() && new_track_id == clip_b.id.to_string(),
        _ => false,
    });
    assert!(superseded);

    let player = h.player(CHANNEL);
    player.finish_current();
    h.wait_idle(CHANNEL).await;

    assert!(!path_b.exists());
    assert_eq!(player.current_id(), Some(music.id));
    assert_eq!(player.position(), Duration::from_secs(42));
}

#[tokio::test]
async fn test_library_clip_is_never_deleted() {
    let h = Harness::new();
    h.start_underlying(CHANNEL, "/music/m.flac", Duration::from_secs(10));
    let horn = h.clip_file("airhorn.wav");

    h.sessions
        .play(CHANNEL, ClipSource::Library(horn.clone()))
        .await
        .unwrap();
    h.player(CHANNEL).finish_current();
    h.wait_idle(CHANNEL).await;

    assert!(horn.exists());
}

#[tokio::test]
async fn test_stuck_clip_skips_back_to_underlying() {
    let h = Harness::new();
    let music = h.start_underlying(CHANNEL, "/music/m.flac", Duration::from_secs(7));
    let path = h.clip_file("CCCCCCCCCCCCCCC.mp3");

    h.sessions
        .play(CHANNEL, ClipSource::Speech(path.clone()))
        .await
        .unwrap();
    h.player(CHANNEL).stall_current();
    h.wait_idle(CHANNEL).await;

    let player = h.player(CHANNEL);
    assert!(!path.exists());
    assert_eq!(player.current_id(), Some(music.id));
    assert_eq!(player.position(), Duration::from_secs(7));
}

#[tokio::test]
async fn test_channels_are_independent() {
    let h = Harness::new();
    let other = ChannelId(200);
    h.start_underlying(CHANNEL, "/music/m.flac", Duration::from_secs(3));

    h.sessions
        .play(CHANNEL, ClipSource::Library(h.clip_file("one.wav")))
        .await
        .unwrap();
    h.sessions
        .play(other, ClipSource::Library(h.clip_file("two.wav")))
        .await
        .unwrap();

    let first = h.sessions.snapshot(CHANNEL).await.unwrap();
    let second = h.sessions.snapshot(other).await.unwrap();
    assert_eq!(first.phase, ControllerPhase::InterruptOverUnderlying);
    assert_eq!(second.phase, ControllerPhase::InterruptOnly);

    h.player(other).finish_current();
    h.wait_idle(other).await;
    let first = h.sessions.snapshot(CHANNEL).await.unwrap();
    assert_eq!(first.phase, ControllerPhase::InterruptOverUnderlying);

    assert_eq!(h.sessions.active_channels().await, vec![CHANNEL, other]);
    assert!(h.sessions.end_session(CHANNEL).await);
    assert!(!h.sessions.end_session(CHANNEL).await);
    assert_eq!(h.sessions.active_channels().await, vec![other]);
    assert!(h.sessions.snapshot(CHANNEL).await.is_none());
}

#[tokio::test]
async fn test_ending_session_restores_underlying_before_deleting_clip() {
    let h = Harness::new();
    let music = h.start_underlying(CHANNEL, "/music/m.flac", Duration::from_secs(42));
    let path = h.clip_file("DDDDDDDDDDDDDDD.mp3");

    h.sessions
        .play(CHANNEL, ClipSource::Speech(path.clone()))
        .await
        .unwrap();
    assert!(path.exists());

    let player = h.player(CHANNEL);
    player.clear_commands();
    assert!(h.sessions.end_session(CHANNEL).await);

    assert!(!path.exists());
    assert_eq!(player.current_id(), Some(music.id));
    assert!(player.queue_ids().is_empty());
    assert_eq!(player.position(), Duration::from_secs(42));
    assert_eq!(
        player.commands(),
        vec![
            EngineCommand::SkipToHead,
            EngineCommand::Pause,
            EngineCommand::Seek(Duration::from_secs(42)),
            EngineCommand::Resume,
        ]
    );
    assert_eq!(h.engine.listener_count(), 0);
}

#[tokio::test]
async fn test_ending_session_on_idle_channel_stops_clip_before_deleting() {
    let h = Harness::new();
    let path = h.clip_file("EEEEEEEEEEEEEEE.mp3");

    h.sessions
        .play(CHANNEL, ClipSource::Speech(path.clone()))
        .await
        .unwrap();
    assert!(h.sessions.end_session(CHANNEL).await);

    assert!(!path.exists());
    assert_eq!(h.player(CHANNEL).current_id(), None);
}

#[tokio::test]
async fn test_shutdown_all_stops_every_controller() {
    let h = Harness::new();
    for id in 1..=3 {
        h.sessions
            .play(ChannelId(id), ClipSource::Library(h.clip_file(&format!("{}.wav", id))))
            .await
            .unwrap();
    }
    assert_eq!(h.engine.listener_count(), 3);

    h.sessions.shutdown_all().await;
    assert!(h.sessions.active_channels().await.is_empty());
    assert_eq!(h.engine.listener_count(), 0);
}

#[tokio::test]
async fn test_engine_not_ready_is_reported_to_caller() {
    let h = Harness::new();
    h.engine.set_ready(false);

    let err = h
        .sessions
        .play(CHANNEL, ClipSource::Library(h.clip_file("horn.wav")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Engine(EngineError::NotReady)));

    let snapshot = h.sessions.snapshot(CHANNEL).await.unwrap();
    assert_eq!(snapshot.phase, ControllerPhase::Idle);

    // Recovers once the engine is back
    h.engine.set_ready(true);
    h.sessions
        .play(CHANNEL, ClipSource::Library(h.clip_file("horn2.wav")))
        .await
        .unwrap();
    let snapshot = h.sessions.snapshot(CHANNEL).await.unwrap();
    assert_eq!(snapshot.phase, ControllerPhase::InterruptOnly);
}

#[tokio::test]
async fn test_unresolvable_clip_never_reaches_controller() {
    let h = Harness::new();

    let err = h
        .sessions
        .play(CHANNEL, ClipSource::Library(PathBuf::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Resolve(_)));
    assert!(h.sessions.active_channels().await.is_empty());
}

/// Outcomes of every `ClipDiscarded` event for `path`
fn discards_for(events: &[SfxEvent], path: &std::path::Path) -> Vec<bool> {
    let uri = path.to_string_lossy();
    events
        .iter()
        .filter_map(|e| match e {
            SfxEvent::ClipDiscarded { uri: u, deleted, .. } if *u == uri => Some(*deleted),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_errored_clip_on_idle_channel_is_discarded_once() {
    let mut h = Harness::new();
    let path = h.clip_file("FFFFFFFFFFFFFFF.mp3");

    h.sessions
        .play(CHANNEL, ClipSource::Speech(path.clone()))
        .await
        .unwrap();
    h.player(CHANNEL).fail_current();
    let snapshot = h.wait_idle(CHANNEL).await;

    assert!(snapshot.saved.is_none());
    assert!(!path.exists());
    assert_eq!(h.player(CHANNEL).current_id(), None);

    let events = h.drain_events();
    assert_eq!(discards_for(&events, &path), vec![true]);
    assert!(events.iter().any(|e| matches!(
        e,
        SfxEvent::InterruptionCleared { reason: ClearReason::Errored, .. }
    )));
}

#[tokio::test]
async fn test_every_ephemeral_clip_is_deleted_exactly_once() {
    let mut h = Harness::new();
    let errored_over = ChannelId(1);
    let stuck = ChannelId(2);
    let idle_end = ChannelId(3);
    let restored = ChannelId(4);
    let superseded = ChannelId(5);
    let errored_idle = ChannelId(6);

    for channel in [errored_over, stuck, restored, superseded] {
        h.start_underlying(channel, "/music/m.flac", Duration::from_secs(42));
    }

    let errored_over_clip = h.clip_file("100000000000000.mp3");
    let stuck_clip = h.clip_file("200000000000000.mp3");
    let idle_end_clip = h.clip_file("300000000000000.mp3");
    let restored_clip = h.clip_file("400000000000000.mp3");
    let superseded_a = h.clip_file("5A0000000000000.mp3");
    let superseded_b = h.clip_file("5B0000000000000.mp3");
    let errored_idle_clip = h.clip_file("600000000000000.mp3");

    for (channel, path) in [
        (errored_over, &errored_over_clip),
        (stuck, &stuck_clip),
        (idle_end, &idle_end_clip),
        (restored, &restored_clip),
        (superseded, &superseded_a),
        (superseded, &superseded_b),
        (errored_idle, &errored_idle_clip),
    ] {
        h.sessions
            .play(channel, ClipSource::Speech(path.clone()))
            .await
            .unwrap();
    }

    h.player(errored_over).fail_current();
    h.player(stuck).stall_current();
    h.player(idle_end).finish_current();
    h.player(restored).finish_current();
    h.player(superseded).finish_current();
    h.player(errored_idle).fail_current();

    for channel in [errored_over, stuck, idle_end, restored, superseded, errored_idle] {
        h.wait_idle(channel).await;
    }
    h.sessions.shutdown_all().await;

    let events = h.drain_events();
    for path in [
        &errored_over_clip,
        &stuck_clip,
        &idle_end_clip,
        &restored_clip,
        &superseded_a,
        &superseded_b,
        &errored_idle_clip,
    ] {
        assert_eq!(
            discards_for(&events, path),
            vec![true],
            "{} should be discarded exactly once",
            path.display()
        );
        assert!(!path.exists());
    }
}
