//! Board-agnostic core of the Axial stepper driver bring-up
//!
//! This crate contains everything that does not depend on a specific chip
//! or board:
//!
//! - Configuration types (axis slots, bindings, policy, kinematics)
//! - Error types
//! - The driver adapter contract and diagnostic sink
//! - The bring-up state machine and orchestrator

#![no_std]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod bringup;
pub mod config;
pub mod error;
pub mod state;
pub mod traits;

pub use bringup::{AxisFailure, BringUpReport, Orchestrator, SlotTable};
pub use error::{BringUpError, Combination, ConfigurationError, TransportError};
pub use state::{Phase, State};
