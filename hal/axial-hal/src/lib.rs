//! Axial Hardware Abstraction Layer
//!
//! This crate defines the bus and pin traits the driver bring-up code is
//! written against. Chip-specific HALs (RP2040 today) implement them, and
//! host tests implement them with in-memory mocks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  axial-drivers (chip adapters)          │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  axial-hal (this crate - traits)        │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ axial-hal-    │       │  test mocks   │
//! │    rp2040     │       │               │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::ChipSelect`] - Digital outputs for chip selects
//! - [`uart::UartTx`], [`uart::UartRx`], [`uart::SerialPort`] - Serial communication
//! - [`spi::SpiBus`] - SPI bus operations

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod spi;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use gpio::{ChipSelect, OutputPin};
pub use spi::SpiBus;
pub use uart::{SerialPort, UartRx, UartTx};
