//! Interruption/resume controller
//!
//! - `state.rs`: the state machine deciding queue mutations and restores
//! - `actor.rs`: the per-channel task that serializes submissions and engine
//!   events against that state machine

mod actor;
mod state;

pub use actor::InterruptHandle;
pub use state::{
    ControllerPhase, InterruptController, InterruptSnapshot, InterruptionInfo, SavedPlayback,
};
