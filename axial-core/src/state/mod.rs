//! Bring-up state machine
//!
//! The orchestrator moves through these states exactly once per boot.

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::{Phase, State};
