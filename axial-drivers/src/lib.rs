//! Stepper driver chip adapters
//!
//! This crate implements the bring-up contract from `axial-core` for each
//! supported chip family and wires them to the buses from `axial-hal`:
//!
//! - Transport arena and serial links ([`transport`])
//! - TMC26X, TMC2130, TMC2208 and L6470 adapters ([`stepper`])
//! - Derived register values ([`stepper::derived`])
//! - The [`bring_up_all_drivers`] entry point

#![no_std]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod stepper;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use stepper::{bring_up_all_drivers, build_slots, DriverInstance};
pub use transport::{BoardResources, BusSet, SerialLink, SpiLink};
