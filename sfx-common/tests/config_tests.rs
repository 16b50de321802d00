//! Unit tests for bootstrap configuration and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate SFX_CONFIG or SFX_SCRATCH_DIR are marked with #[serial]
//! to ensure they run sequentially, not in parallel.

use serial_test::serial;
use sfx_common::config::{
    CompiledDefaults, TomlConfig, CONFIG_ENV_VAR, DEFAULT_EVENT_CAPACITY,
    DEFAULT_SPEECH_PADDING_MS, SCRATCH_DIR_ENV_VAR,
};
use sfx_common::Error;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(defaults.scratch_dir.ends_with("tts"));
    assert!(defaults.scratch_dir.starts_with(env::temp_dir()));
    assert!(!defaults.sound_dir.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
}

#[test]
fn test_empty_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "").unwrap();

    let config = TomlConfig::from_file(&path).unwrap();
    assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.speech.padding_ms, DEFAULT_SPEECH_PADDING_MS);
    assert!(config.scratch_dir.is_none());
}

#[test]
fn test_full_file_parses() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        r#"
scratch_dir = "/var/tmp/sfx-tts"
sound_dir = "/srv/sounds"
event_capacity = 32

[logging]
level = "debug"

[speech]
padding_ms = 500
"#,
    )
    .unwrap();

    let config = TomlConfig::from_file(&path).unwrap();
    assert_eq!(config.scratch_dir, Some(PathBuf::from("/var/tmp/sfx-tts")));
    assert_eq!(config.resolve_sound_dir(), PathBuf::from("/srv/sounds"));
    assert_eq!(config.event_capacity, 32);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.speech.padding_ms, 500);
}

#[test]
fn test_malformed_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "event_capacity = \"lots\"").unwrap();

    assert!(matches!(
        TomlConfig::from_file(&path),
        Err(Error::TomlParse(_))
    ));
}

#[test]
fn test_zero_event_capacity_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "event_capacity = 0").unwrap();

    assert!(matches!(TomlConfig::from_file(&path), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_missing_cli_file_degrades_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope.toml");

    let config = TomlConfig::load(Some(&missing)).unwrap();
    assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
}

#[test]
#[serial]
fn test_env_var_config_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("env.toml");
    fs::write(&path, "event_capacity = 7").unwrap();
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = TomlConfig::load(None).unwrap();
    assert_eq!(config.event_capacity, 7);

    // CLI path takes precedence over the environment
    let cli = temp.path().join("cli.toml");
    fs::write(&cli, "event_capacity = 9").unwrap();
    let config = TomlConfig::load(Some(&cli)).unwrap();
    assert_eq!(config.event_capacity, 9);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_scratch_dir_priority() {
    env::remove_var(SCRATCH_DIR_ENV_VAR);
    let config = TomlConfig {
        scratch_dir: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    // TOML beats the compiled default
    assert_eq!(config.resolve_scratch_dir(None), PathBuf::from("/from/toml"));

    // Environment beats TOML
    env::set_var(SCRATCH_DIR_ENV_VAR, "/from/env");
    assert_eq!(config.resolve_scratch_dir(None), PathBuf::from("/from/env"));

    // CLI beats everything
    assert_eq!(
        config.resolve_scratch_dir(Some(Path::new("/from/cli"))),
        PathBuf::from("/from/cli")
    );

    env::remove_var(SCRATCH_DIR_ENV_VAR);
    assert_eq!(
        TomlConfig::default().resolve_scratch_dir(None),
        CompiledDefaults::for_current_platform().scratch_dir
    );
}
