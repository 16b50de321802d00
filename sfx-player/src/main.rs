//! SFX Player (sfx-player) - Main entry point
//!
//! Runs clips through the interruption controller on the in-process engine
//! and logs what the controller did: queue commands, clip deletions and
//! restores. Useful for checking interruption behavior without a voice
//! connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sfx_common::config::TomlConfig;
use sfx_common::events::EventBus;
use sfx_common::speech::{ensure_scratch_dir, scratch_file_path, SpeechRequest, DEFAULT_USER_SPEED};
use sfx_common::ChannelId;
use sfx_player::engine::{MemoryEngine, MemoryPlayer};
use sfx_player::{ClipSource, SfxSessions};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the controller to react to a track ending
const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Command-line arguments for sfx-player
#[derive(Parser, Debug)]
#[command(name = "sfx-player")]
#[command(about = "Simulate one-shot clip interruptions over a playing track")]
#[command(version)]
struct Args {
    /// Bootstrap TOML config file
    #[arg(short, long, env = "SFX_CONFIG")]
    config: Option<PathBuf>,

    /// Directory speech clips are copied into before playback
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Voice channel id to simulate
    #[arg(long, default_value_t = 1)]
    channel: u64,

    /// Track playing before the first clip (omit for an idle channel)
    #[arg(long)]
    underlying: Option<String>,

    /// Playhead of the underlying track when the first clip arrives
    #[arg(long, default_value_t = 0.0)]
    position_secs: f64,

    /// Clip file to play (repeatable)
    #[arg(long = "clip", required_unless_present = "say")]
    clips: Vec<PathBuf>,

    /// Message to speak as an ephemeral clip, after any --clip (repeatable)
    #[arg(long = "say")]
    say: Vec<String>,

    /// Voice for --say messages
    #[arg(long)]
    voice: Option<String>,

    /// Speed for --say messages (0-10, 5 is normal)
    #[arg(long, default_value_t = DEFAULT_USER_SPEED)]
    speed: u8,

    /// Treat clips as synthesized speech (ephemeral copies are deleted)
    #[arg(long)]
    speech: bool,

    /// Submit every clip before any of them finishes
    #[arg(long)]
    overlap: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sfx_player={level},sfx_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let position = parse_position(args.position_secs)?;

    let dirs = ClipDirs {
        scratch: config.resolve_scratch_dir(args.scratch_dir.as_deref()),
        sounds: config.resolve_sound_dir(),
    };
    info!("Scratch directory: {}", dirs.scratch.display());
    info!("Sound directory: {}", dirs.sounds.display());

    let bus = EventBus::new(config.event_capacity);
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!(channel = %event.channel(), "{}", json),
                Err(e) => warn!("Failed to serialize {}: {}", event.name(), e),
            }
        }
    });

    let engine = Arc::new(MemoryEngine::new());
    let sessions = SfxSessions::new(engine.clone(), engine.clone(), bus);
    let channel = ChannelId(args.channel);

    tokio::select! {
        result = run_scenario(&args, &config, position, &engine, &sessions, channel, &dirs) => {
            if let Err(e) = &result {
                error!("Scenario failed: {:#}", e);
            }
            sessions.shutdown_all().await;
            result?;
        }
        _ = shutdown_signal() => {
            sessions.shutdown_all().await;
        }
    }

    info!("Engine command log:");
    for command in engine.player(channel).commands() {
        info!("  {:?}", command);
    }
    Ok(())
}

async fn run_scenario(
    args: &Args,
    config: &TomlConfig,
    position: Duration,
    engine: &MemoryEngine,
    sessions: &SfxSessions,
    channel: ChannelId,
    dirs: &ClipDirs,
) -> Result<()> {
    let player = engine.player(channel);

    if let Some(uri) = &args.underlying {
        info!("Underlying track {} at {:?}", uri, position);
        player.start_playing(engine.load_track(uri), position);
    }

    if args.speech {
        ensure_scratch_dir(&dirs.scratch)
            .await
            .context("Failed to create scratch directory")?;
    }

    let mut sources = Vec::with_capacity(args.clips.len());
    for clip in &args.clips {
        sources.push(clip_source(clip, args.speech, dirs).await?);
    }
    for message in &args.say {
        let request = SpeechRequest::new(
            message,
            args.voice.as_deref(),
            args.speed,
            config.speech.padding_ms,
        )
        .with_context(|| format!("Cannot speak {:?}", message))?;
        let path = request
            .write_clip(&dirs.scratch)
            .await
            .context("Failed to write speech clip")?;
        debug!(
            voice = request.voice.name,
            speed = request.speed,
            padding_ms = request.padding_ms,
            "Speech clip {}",
            path.display()
        );
        sources.push(ClipSource::Speech(path));
    }

    if args.overlap {
        for source in sources {
            sessions.play(channel, source).await?;
        }
        finish_and_settle(&player, sessions, channel).await;
    } else {
        for source in sources {
            sessions.play(channel, source).await?;
            finish_and_settle(&player, sessions, channel).await;
        }
    }

    if let Some(snapshot) = sessions.snapshot(channel).await {
        info!("Final controller phase: {}", snapshot.phase);
    }
    info!(
        "On air: {:?} at {:?}",
        player.current_id().map(|id| id.to_string()),
        player.position()
    );
    Ok(())
}

struct ClipDirs {
    scratch: PathBuf,
    sounds: PathBuf,
}

/// Library clips play in place; speech clips are copied to scratch first
///
/// Relative clip paths that don't exist are looked up in the sound directory.
async fn clip_source(path: &Path, speech: bool, dirs: &ClipDirs) -> Result<ClipSource> {
    let path = if path.is_relative() && !path.exists() {
        dirs.sounds.join(path)
    } else {
        path.to_path_buf()
    };

    if !speech {
        return Ok(ClipSource::Library(path));
    }

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("mp3");
    let copy = scratch_file_path(&dirs.scratch, extension);
    tokio::fs::copy(&path, &copy)
        .await
        .with_context(|| format!("Failed to copy {} to scratch", path.display()))?;
    Ok(ClipSource::Speech(copy))
}

/// Let the active clip end and wait for the controller to catch up
async fn finish_and_settle(player: &MemoryPlayer, sessions: &SfxSessions, channel: ChannelId) {
    player.finish_current();

    let settled = tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            match sessions.snapshot(channel).await {
                Some(snapshot) if snapshot.interruption.is_some() => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                _ => break,
            }
        }
    })
    .await;

    if settled.is_err() {
        warn!("Controller did not settle within {:?}", SETTLE_TIMEOUT);
    }
}

/// Underlying playhead from `--position-secs`
fn parse_position(secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(position) => Ok(position),
        Err(e) => bail!("Invalid --position-secs {}: {}", secs, e),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position(42.0).unwrap(), Duration::from_secs(42));
        assert_eq!(parse_position(0.0).unwrap(), Duration::ZERO);
        assert!(parse_position(-1.0).is_err());
        assert!(parse_position(f64::NAN).is_err());
        assert!(parse_position(f64::INFINITY).is_err());
        assert!(parse_position(1e20).is_err());
    }

    #[test]
    fn test_say_replaces_clip_requirement() {
        let args = Args::try_parse_from(["sfx-player", "--say", "hello", "--speed", "7"]).unwrap();
        assert!(args.clips.is_empty());
        assert_eq!(args.say, vec!["hello".to_string()]);
        assert_eq!(args.speed, 7);

        assert!(Args::try_parse_from(["sfx-player"]).is_err());
    }

    #[tokio::test]
    async fn test_say_messages_become_speech_clips() {
        let temp = tempfile::TempDir::new().unwrap();
        let args = Args::try_parse_from(["sfx-player", "--say", "hi there", "--voice", "matt"]).unwrap();
        let dirs = ClipDirs {
            scratch: temp.path().join("tts"),
            sounds: temp.path().join("sounds"),
        };
        let engine = Arc::new(MemoryEngine::new());
        let sessions = SfxSessions::new(engine.clone(), engine.clone(), EventBus::new(16));
        let channel = ChannelId(9);

        run_scenario(&args, &TomlConfig::default(), Duration::ZERO, &engine, &sessions, channel, &dirs)
            .await
            .unwrap();
        sessions.shutdown_all().await;

        // The clip was played, finished and deleted
        let leftover = std::fs::read_dir(&dirs.scratch).unwrap().count();
        assert_eq!(leftover, 0);
        assert!(engine
            .player(channel)
            .commands()
            .contains(&sfx_player::engine::EngineCommand::Play));
    }
}
