//! Dynamic pin allocation for config-driven hardware setup
//!
//! Chip-select and emulated serial pins come from `machine.toml`, so they
//! are handed out by number at runtime. The SPI0 and UART1 pins are fixed
//! by the board and never enter the pool.

use embassy_rp::gpio::AnyPin;
use embassy_rp::peripherals::{PIN_16, PIN_18, PIN_19, PIN_8, PIN_9, SPI0, UART1};
use embassy_rp::{Peri, Peripherals};

/// Number of GPIO pins on RP2040
pub const GPIO_COUNT: usize = 30;

/// SPI0 SCK, MOSI, MISO
pub const SPI0_PINS: [u8; 3] = [18, 19, 16];

/// UART1 TX, RX
pub const UART1_PINS: [u8; 2] = [8, 9];

/// Error when requesting a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    /// Pin number out of range (0-29 valid)
    InvalidPin,
    /// Pin already taken
    AlreadyTaken,
    /// Pin belongs to a fixed bus
    Reserved,
}

/// Whether a pin is wired to one of the fixed buses
pub fn is_reserved(pin: u8) -> bool {
    SPI0_PINS.contains(&pin) || UART1_PINS.contains(&pin)
}

/// GPIO pins available for config-driven assignment
pub struct PinPool {
    pins: [Option<Peri<'static, AnyPin>>; GPIO_COUNT],
}

impl PinPool {
    /// Take a pin by number
    pub fn take(&mut self, pin_num: u8) -> Result<Peri<'static, AnyPin>, PinError> {
        if pin_num as usize >= GPIO_COUNT {
            return Err(PinError::InvalidPin);
        }
        if is_reserved(pin_num) {
            return Err(PinError::Reserved);
        }
        self.pins[pin_num as usize]
            .take()
            .ok_or(PinError::AlreadyTaken)
    }

    /// Check if a pin is available
    pub fn is_available(&self, pin_num: u8) -> bool {
        self.pins
            .get(pin_num as usize)
            .is_some_and(|pin| pin.is_some())
    }
}

/// Peripherals of the fixed buses
pub struct BusPeripherals {
    pub spi0: Peri<'static, SPI0>,
    pub spi0_sck: Peri<'static, PIN_18>,
    pub spi0_mosi: Peri<'static, PIN_19>,
    pub spi0_miso: Peri<'static, PIN_16>,
    pub uart1: Peri<'static, UART1>,
    pub uart1_tx: Peri<'static, PIN_8>,
    pub uart1_rx: Peri<'static, PIN_9>,
}

/// Split the peripherals into the pin pool and the fixed buses
pub fn split(p: Peripherals) -> (PinPool, BusPeripherals) {
    let pool = PinPool {
        pins: [
            Some(p.PIN_0.into()),
            Some(p.PIN_1.into()),
            Some(p.PIN_2.into()),
            Some(p.PIN_3.into()),
            Some(p.PIN_4.into()),
            Some(p.PIN_5.into()),
            Some(p.PIN_6.into()),
            Some(p.PIN_7.into()),
            None,
            None,
            Some(p.PIN_10.into()),
            Some(p.PIN_11.into()),
            Some(p.PIN_12.into()),
            Some(p.PIN_13.into()),
            Some(p.PIN_14.into()),
            Some(p.PIN_15.into()),
            None,
            Some(p.PIN_17.into()),
            None,
            None,
            Some(p.PIN_20.into()),
            Some(p.PIN_21.into()),
            Some(p.PIN_22.into()),
            Some(p.PIN_23.into()),
            Some(p.PIN_24.into()),
            Some(p.PIN_25.into()),
            Some(p.PIN_26.into()),
            Some(p.PIN_27.into()),
            Some(p.PIN_28.into()),
            Some(p.PIN_29.into()),
        ],
    };
    let buses = BusPeripherals {
        spi0: p.SPI0,
        spi0_sck: p.PIN_18,
        spi0_mosi: p.PIN_19,
        spi0_miso: p.PIN_16,
        uart1: p.UART1,
        uart1_tx: p.PIN_8,
        uart1_rx: p.PIN_9,
    };
    (pool, buses)
}
