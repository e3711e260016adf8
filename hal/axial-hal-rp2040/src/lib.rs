//! RP2040 implementations of the Axial HAL traits
//!
//! - GPIO outputs for SPI chip selects
//! - Pin pool for config-driven pin assignment
//! - Blocking SPI0 master for the SPI driver families
//! - Hardware UART1 and bit-banged serial lines for UART drivers

#![no_std]

pub mod gpio;
pub mod pins;
pub mod soft_serial;
pub mod spi;
pub mod uart;

pub use gpio::GpioOutput;
pub use pins::{split, BusPeripherals, PinError, PinPool};
pub use soft_serial::SoftSerial;
pub use spi::Spi0;
pub use uart::HardwareSerial;
