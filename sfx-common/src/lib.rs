//! # SFX Common Library
//!
//! Shared code for the SFX interruption service including:
//! - Error types
//! - Bootstrap configuration loading
//! - Event types (SfxEvent enum) and the EventBus
//! - Speech clip helpers (voice catalog, speed table, scratch files)

pub mod config;
pub mod error;
pub mod events;
pub mod speech;

pub use error::{Error, Result};
pub use events::{ChannelId, EventBus, SfxEvent};
