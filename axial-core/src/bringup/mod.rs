//! Driver bring-up
//!
//! [`SlotTable`] holds the driver attached to each axis slot and
//! [`Orchestrator`] walks it through the transport, primary and secondary
//! phases.

pub mod orchestrator;
pub mod slots;

pub use orchestrator::{AxisFailure, BringUpReport, Orchestrator};
pub use slots::{AxisSlot, SlotTable};
