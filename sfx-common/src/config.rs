//! Bootstrap configuration loading and folder resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default
//!
//! A missing config file never stops startup: a warning is logged and the
//! compiled defaults are used. A config file that exists but cannot be parsed
//! is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SFX_CONFIG";

/// Environment variable overriding the speech scratch directory
pub const SCRATCH_DIR_ENV_VAR: &str = "SFX_SCRATCH_DIR";

/// Default EventBus capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default leading silence added to speech clips (milliseconds)
pub const DEFAULT_SPEECH_PADDING_MS: u64 = 750;

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional in the file; absent fields take the compiled
/// defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory synthesized speech clips are written to
    pub scratch_dir: Option<PathBuf>,

    /// Directory holding persisted library sounds
    pub sound_dir: Option<PathBuf>,

    /// EventBus capacity
    pub event_capacity: usize,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Speech clip configuration
    pub speech: SpeechConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            sound_dir: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            logging: LoggingConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Speech clip configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Leading silence callers prepend to synthesized clips
    pub padding_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            padding_ms: DEFAULT_SPEECH_PADDING_MS,
        }
    }
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub scratch_dir: PathBuf,
    pub sound_dir: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        let sound_dir = dirs::data_local_dir()
            .map(|d| d.join("sfx").join("sounds"))
            .unwrap_or_else(|| PathBuf::from("./sfx_data/sounds"));

        Self {
            scratch_dir: std::env::temp_dir().join("tts"),
            sound_dir,
            log_level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file that is known to exist
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve and load the bootstrap configuration
    ///
    /// `cli_path` wins over `SFX_CONFIG`, which wins over the platform
    /// config directory (`<config dir>/sfx/config.toml`).
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let candidate = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .or_else(default_config_path);

        match candidate {
            Some(path) if path.exists() => {
                debug!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No config file location available, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(Error::Config("logging.level must not be empty".to_string()));
        }
        Ok(())
    }

    /// Scratch directory for speech clips
    ///
    /// Priority: `cli_arg` → `SFX_SCRATCH_DIR` → TOML → compiled default.
    pub fn resolve_scratch_dir(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }
        if let Some(path) = std::env::var_os(SCRATCH_DIR_ENV_VAR) {
            return PathBuf::from(path);
        }
        if let Some(path) = &self.scratch_dir {
            return path.clone();
        }
        CompiledDefaults::for_current_platform().scratch_dir
    }

    /// Directory for persisted library sounds
    pub fn resolve_sound_dir(&self) -> PathBuf {
        self.sound_dir
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().sound_dir)
    }
}

/// Platform config file location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sfx").join("config.toml"))
}
