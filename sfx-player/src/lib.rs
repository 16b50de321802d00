//! # SFX Interruption Player Library (sfx-player)
//!
//! Lets a one-shot clip (a library sound effect or a synthesized speech
//! clip) interrupt whatever a voice channel is playing, then puts the
//! interrupted track back at the exact position it was cut off.
//!
//! **Architecture:** one `InterruptController` task per voice channel. Caller
//! submissions and playback engine lifecycle events are delivered to that
//! task through a single ordered inbox, so every state change is serialized.
//! The playback engine itself is an external collaborator behind the
//! [`engine::PlaybackEngine`] and [`engine::Player`] traits.

pub mod engine;
pub mod ephemeral;
pub mod error;
pub mod interrupt;
pub mod session;
pub mod track;

pub use error::{Error, Result};
pub use interrupt::{InterruptController, InterruptHandle};
pub use session::SfxSessions;
pub use track::{ClipSource, PlayerEvent, PlayerEventKind, Track, TrackId};
