//! Speech clip helpers
//!
//! Callers synthesize speech clips into a scratch directory before handing
//! them to the interruption controller as ephemeral tracks. This module holds
//! the pieces of that flow that don't touch the network: the voice catalog,
//! the user-facing speed scale, text sanitising and scratch file naming.

use crate::{Error, Result};
use rand::Rng;
use std::path::{Path, PathBuf};

/// Longest message (in characters, after sanitising) that will be spoken
pub const MAX_SPEECH_CHARS: usize = 1000;

/// Voice used when a user never picked one
pub const DEFAULT_VOICE: &str = "clara";

/// Length of the random part of a scratch file name
const SCRATCH_NAME_LEN: usize = 15;

/// Speech voice available from the synthesis service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub name: &'static str,
    pub language: &'static str,
    pub gender: Gender,
    /// Per-request character limit advertised for this voice
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Female => write!(f, "female"),
            Gender::Male => write!(f, "male"),
        }
    }
}

const fn voice(name: &'static str, language: &'static str, gender: Gender, limit: usize) -> Voice {
    Voice {
        name,
        language,
        gender,
        limit,
    }
}

/// All voices, in listing order
pub const VOICES: &[Voice] = &[
    voice("clara", "english", Gender::Female, 600),
    voice("matt", "english", Gender::Male, 500),
    voice("carmen", "spanish", Gender::Female, 500),
    voice("jose", "spanish", Gender::Male, 500),
    voice("shinji", "japanese", Gender::Male, 200),
    voice("kyuri", "korean", Gender::Female, 250),
    voice("jinho", "korean", Gender::Male, 250),
    voice("meimei", "chinese (simplified)", Gender::Female, 200),
    voice("liangliang", "chinese", Gender::Male, 150),
    voice("chiahua", "chinese (traditional)", Gender::Female, 150),
];

/// Look up a voice by name (case-insensitive)
pub fn find_voice(name: &str) -> Option<&'static Voice> {
    let name = name.trim().to_lowercase();
    VOICES.iter().find(|v| v.name == name)
}

/// Map the user-facing speed (0-10, 5 is normal, higher is faster) to the
/// synthesis service's scale (5 slowest .. -5 fastest)
pub fn engine_speed(user_speed: u8) -> Result<i8> {
    if user_speed > 10 {
        return Err(Error::InvalidInput(format!(
            "speed {} is outside 0-10",
            user_speed
        )));
    }
    Ok(5 - user_speed as i8)
}

/// Strip characters the synthesis service can't speak
///
/// Non-ASCII characters are dropped. An empty result or one longer than
/// [`MAX_SPEECH_CHARS`] is rejected.
pub fn sanitize_text(text: &str) -> Result<String> {
    let cleaned: String = text.chars().filter(char::is_ascii).collect();

    if cleaned.trim().is_empty() {
        return Err(Error::InvalidInput("message has no speakable text".to_string()));
    }
    if cleaned.len() > MAX_SPEECH_CHARS {
        return Err(Error::InvalidInput(format!(
            "message is {} characters, the limit is {}",
            cleaned.len(),
            MAX_SPEECH_CHARS
        )));
    }
    Ok(cleaned)
}

/// Fresh scratch file path `<dir>/<15 uppercase hex chars>.<extension>`
pub fn scratch_file_path(dir: &Path, extension: &str) -> PathBuf {
    const HEX: &[u8] = b"0123456789ABCDEF";
    let mut rng = rand::thread_rng();
    let name: String = (0..SCRATCH_NAME_LEN)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect();
    dir.join(format!("{}.{}", name, extension.trim_start_matches('.')))
}

/// Create the scratch directory if it does not exist yet
pub async fn ensure_scratch_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

/// User speed used when none is given (normal)
pub const DEFAULT_USER_SPEED: u8 = 5;

/// A validated request to speak one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    /// Sanitized message text
    pub text: String,
    pub voice: &'static Voice,
    /// Speed on the synthesis service's scale
    pub speed: i8,
    /// Leading silence prepended to the clip
    pub padding_ms: u64,
}

impl SpeechRequest {
    /// Validate a message for speaking
    ///
    /// `voice` defaults to [`DEFAULT_VOICE`]; an unknown voice is `NotFound`.
    pub fn new(text: &str, voice: Option<&str>, user_speed: u8, padding_ms: u64) -> Result<Self> {
        let text = sanitize_text(text)?;
        let name = voice.unwrap_or(DEFAULT_VOICE);
        let voice = find_voice(name).ok_or_else(|| Error::NotFound(format!("voice '{}'", name)))?;
        let speed = engine_speed(user_speed)?;

        Ok(Self {
            text,
            voice,
            speed,
            padding_ms,
        })
    }

    /// Write the request to a fresh scratch file and return its path
    ///
    /// No audio is produced here. The file stands in for the synthesized
    /// clip so the playback side has something to own and delete.
    pub async fn write_clip(&self, dir: &Path) -> Result<PathBuf> {
        ensure_scratch_dir(dir).await?;
        let path = scratch_file_path(dir, "mp3");
        let body = format!(
            "voice={} ({}, {}) speed={} padding_ms={}\n{}\n",
            self.voice.name, self.voice.language, self.voice.gender, self.speed, self.padding_ms, self.text
        );
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
